use chrono::{DateTime, Utc};
use mail_parser::{Address, Message, MessageParser, MimeHeaders, PartType};

use super::types::{FetchAttributes, MessageRecord};
use crate::constants::{NO_SUBJECT, SNIPPET_LENGTH};
use crate::error::MailError;

/// Normalize one fetched message into a `MessageRecord`.
///
/// `raw_body` is the full message source; when it is empty the header
/// section alone is parsed. The provider message id takes precedence over
/// the `Message-ID` header as the record's identity.
pub fn parse_message(
    user_id: i64,
    attributes: &FetchAttributes,
    raw_header: &[u8],
    raw_body: &[u8],
) -> Result<MessageRecord, MailError> {
    let source = if raw_body.is_empty() { raw_header } else { raw_body };
    if source.is_empty() {
        return Err(MailError::ParseFailure(format!(
            "message {} has no content",
            attributes.sequence
        )));
    }

    let message = MessageParser::default().parse(source).ok_or_else(|| {
        MailError::ParseFailure(format!(
            "message {} is not a valid RFC 5322 message",
            attributes.sequence
        ))
    })?;

    let message_id = attributes
        .provider_message_id
        .clone()
        .or_else(|| message.message_id().map(|s| s.to_string()))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            MailError::ParseFailure(format!(
                "message {} has neither a provider id nor a Message-ID",
                attributes.sequence
            ))
        })?;

    let thread_id = attributes
        .thread_id
        .clone()
        .unwrap_or_else(|| message_id.clone());

    let parsed_subject = message.subject().unwrap_or_default().to_string();
    let subject = if parsed_subject.is_empty() {
        NO_SUBJECT.to_string()
    } else {
        parsed_subject.clone()
    };

    let body_text = extract_text_body(&message).unwrap_or_default();
    let body_html = extract_html_body(&message).unwrap_or_default();

    let date = message
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .or(attributes.internal_date)
        .unwrap_or_else(Utc::now);

    let snippet = if body_text.is_empty() {
        parsed_subject
    } else {
        body_text.chars().take(SNIPPET_LENGTH).collect()
    };

    Ok(MessageRecord {
        user_id,
        message_id,
        thread_id,
        subject,
        from: format_address(message.from()),
        to: format_address(message.to()),
        cc: format_address(message.cc()),
        bcc: format_address(message.bcc()),
        body_text,
        body_html,
        date,
        is_read: attributes.is_seen(),
        has_attachments: message.attachment_count() > 0,
        labels: attributes.labels.clone(),
        snippet,
    })
}

/// Render an address header as `Name <addr>` entries joined by ", ".
pub fn format_address(address: Option<&Address>) -> String {
    let Some(address) = address else {
        return String::new();
    };

    format_address_list(address.iter().map(|addr| (addr.name(), addr.address())))
}

/// Format `(display name, address)` pairs. A pair without a name renders as
/// the bare address; empty strings count as absent.
pub fn format_address_list<'a>(
    entries: impl IntoIterator<Item = (Option<&'a str>, Option<&'a str>)>,
) -> String {
    entries
        .into_iter()
        .map(|(name, address)| {
            let name = name.map(str::trim).filter(|s| !s.is_empty());
            let address = address.map(str::trim).filter(|s| !s.is_empty());
            match (name, address) {
                (Some(name), Some(address)) => format!("{} <{}>", name, address),
                (None, Some(address)) => address.to_string(),
                (Some(name), None) => name.to_string(),
                (None, None) => String::new(),
            }
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn extract_text_body(message: &Message) -> Option<String> {
    for part in message.text_bodies() {
        if let PartType::Text(text) = &part.body {
            return Some(text.to_string());
        }
    }

    // Fallback: any text/plain part
    for part in message.parts.iter() {
        if let PartType::Text(text) = &part.body {
            let content_type = part.content_type();
            if content_type
                .map(|ct| ct.subtype() == Some("plain"))
                .unwrap_or(true)
            {
                return Some(text.to_string());
            }
        }
    }

    // HTML-only messages get a text rendering of the HTML part
    if message.html_body_count() > 0 {
        return message.body_text(0).map(|text| text.into_owned());
    }

    None
}

fn extract_html_body(message: &Message) -> Option<String> {
    for part in message.html_bodies() {
        if let PartType::Html(html) = &part.body {
            return Some(html.to_string());
        }
    }

    None
}
