use chrono::{DateTime, Utc};

/// Marks the last sync that walked every window without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWatermark {
    pub user_id: i64,
    pub last_sync_at: DateTime<Utc>,
}

impl SyncWatermark {
    pub fn new(user_id: i64, last_sync_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            last_sync_at,
        }
    }

    /// Whole seconds elapsed since the watermark, as of `now`.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_sync_at).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_age() {
        let now = Utc::now();
        let mark = SyncWatermark::new(1, now - Duration::seconds(90));
        assert_eq!(mark.age_secs(now), 90);
        // A watermark from a clock ahead of ours never reports negative age.
        let ahead = SyncWatermark::new(1, now + Duration::seconds(5));
        assert_eq!(ahead.age_secs(now), 0);
    }
}
