//! Reverse-chronological fetch windows over message sequence numbers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One contiguous page of the walk, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: u32,
    pub end: u32,
}

impl FetchWindow {
    /// IMAP sequence set, e.g. `71:120`.
    pub fn sequence_set(&self) -> String {
        format!("{}:{}", self.start, self.end)
    }

    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// How far a walk extends past the newest window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowCoverage {
    /// Newest window first, then advance to `end + 1` until the running end
    /// reaches the total. Since the first window already ends at the total,
    /// only the newest window is ever fetched.
    #[default]
    Latest,
    /// Newest window first, then step toward sequence 1 until the whole
    /// mailbox is covered without gap or overlap.
    Full,
}

/// Iterator over the windows of one walk.
#[derive(Debug, Clone)]
pub struct WindowWalk {
    total: u32,
    size: u32,
    coverage: WindowCoverage,
    next: Option<FetchWindow>,
}

impl WindowWalk {
    pub fn new(total: u32, size: u32, coverage: WindowCoverage) -> Self {
        let size = size.max(1);
        let next = (total > 0).then(|| FetchWindow {
            start: total.saturating_sub(size - 1).max(1),
            end: total,
        });

        Self {
            total,
            size,
            coverage,
            next,
        }
    }

    fn after(&self, window: FetchWindow) -> Option<FetchWindow> {
        match self.coverage {
            WindowCoverage::Latest => {
                let start = window.end + 1;
                (start <= self.total).then(|| FetchWindow {
                    start,
                    end: (start + self.size - 1).min(self.total),
                })
            }
            WindowCoverage::Full => (window.start > 1).then(|| FetchWindow {
                start: window.start.saturating_sub(self.size).max(1),
                end: window.start - 1,
            }),
        }
    }
}

impl Iterator for WindowWalk {
    type Item = FetchWindow;

    fn next(&mut self) -> Option<FetchWindow> {
        let current = self.next.take()?;
        self.next = self.after(current);
        Some(current)
    }
}
