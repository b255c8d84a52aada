//! Gmail API response normalization
//!
//! Converts Gmail API responses to [`MessageSnapshot`].

use base64::prelude::*;
use chrono::{DateTime, Utc};

use super::api::{GmailMessage, MessagePart, MessagePayload};
use crate::error::TriageError;
use crate::models::{MessageSnapshot, ProviderMessageId};

/// Normalize a Gmail API message to a snapshot
///
/// A message without a payload or with an unparseable `internalDate` is
/// rejected as malformed; missing headers fall back to empty strings.
pub fn normalize_message(gmail_msg: GmailMessage) -> Result<MessageSnapshot, TriageError> {
    let id = ProviderMessageId::new(&gmail_msg.id);

    let payload = gmail_msg.payload.as_ref().ok_or_else(|| {
        TriageError::MalformedResponse(format!("message {} has no payload", gmail_msg.id))
    })?;

    let internal_date = match gmail_msg.internal_date.as_deref() {
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            TriageError::MalformedResponse(format!(
                "message {} has invalid internalDate {:?}",
                gmail_msg.id, raw
            ))
        })?,
        None => {
            return Err(TriageError::MalformedResponse(format!(
                "message {} has no internalDate",
                gmail_msg.id
            )));
        }
    };
    let received_at = DateTime::<Utc>::from_timestamp_millis(internal_date).ok_or_else(|| {
        TriageError::MalformedResponse(format!(
            "message {} internalDate {} out of range",
            gmail_msg.id, internal_date
        ))
    })?;

    let sender = extract_header(payload, "From").unwrap_or_default();
    let recipient = extract_header(payload, "To").unwrap_or_default();
    let subject = extract_header(payload, "Subject").unwrap_or_default();

    // Prefer plain text; HTML only when there is nothing else
    let content_body = extract_plain_text_body(payload).or_else(|| extract_html_body(payload));

    let snippet = if !gmail_msg.snippet.is_empty() {
        decode_html_entities(&gmail_msg.snippet)
    } else {
        content_body
            .as_deref()
            .map(|b| b.chars().take(200).collect())
            .unwrap_or_default()
    };

    let mut builder = MessageSnapshot::builder(id)
        .subject(subject)
        .sender(sender)
        .recipient(recipient)
        .snippet(snippet)
        .content_body(content_body)
        .received_at(received_at)
        .internal_date(internal_date)
        .labels(gmail_msg.label_ids.unwrap_or_default());
    if let Some(thread_id) = gmail_msg.thread_id {
        builder = builder.thread_id(thread_id);
    }

    Ok(builder.build())
}

/// Extract a header value by name
fn extract_header(payload: &MessagePayload, name: &str) -> Option<String> {
    payload.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

/// Extract plain text body from message payload
fn extract_plain_text_body(payload: &MessagePayload) -> Option<String> {
    // Check if this is a simple message with body data
    if let Some(body) = &payload.body
        && let Some(data) = &body.data
        && payload
            .mime_type
            .as_ref()
            .is_some_and(|m| m.starts_with("text/plain"))
    {
        return decode_base64_body(data);
    }

    // Check parts for text/plain
    if let Some(parts) = &payload.parts
        && let Some(text) = find_plain_text_in_parts(parts)
    {
        return Some(text);
    }

    // Fall back to any text content
    if let Some(body) = &payload.body
        && let Some(data) = &body.data
    {
        return decode_base64_body(data);
    }

    None
}

/// Recursively search message parts for text/plain content
fn find_plain_text_in_parts(parts: &[MessagePart]) -> Option<String> {
    for part in parts {
        // Check if this part is text/plain
        if part
            .mime_type
            .as_ref()
            .is_some_and(|m| m.starts_with("text/plain"))
            && let Some(body) = &part.body
            && let Some(data) = &body.data
            && let Some(text) = decode_base64_body(data)
        {
            return Some(text);
        }

        // Recursively check nested parts
        if let Some(nested) = &part.parts
            && let Some(text) = find_plain_text_in_parts(nested)
        {
            return Some(text);
        }
    }

    None
}

/// Extract HTML body from message payload
fn extract_html_body(payload: &MessagePayload) -> Option<String> {
    // Check if this is a simple message with HTML body
    if let Some(body) = &payload.body
        && let Some(data) = &body.data
        && payload
            .mime_type
            .as_ref()
            .is_some_and(|m| m.starts_with("text/html"))
    {
        return decode_base64_body(data);
    }

    // Check parts for text/html
    if let Some(parts) = &payload.parts
        && let Some(html) = find_html_in_parts(parts)
    {
        return Some(html);
    }

    None
}

/// Recursively search message parts for text/html content
fn find_html_in_parts(parts: &[MessagePart]) -> Option<String> {
    for part in parts {
        // Check if this part is text/html
        if part
            .mime_type
            .as_ref()
            .is_some_and(|m| m.starts_with("text/html"))
            && let Some(body) = &part.body
            && let Some(data) = &body.data
            && let Some(html) = decode_base64_body(data)
        {
            return Some(html);
        }

        // Recursively check nested parts
        if let Some(nested) = &part.parts
            && let Some(html) = find_html_in_parts(nested)
        {
            return Some(html);
        }
    }

    None
}

/// Decode base64-encoded body data
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple decoders.
fn decode_base64_body(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    for decoder in decoders {
        if let Ok(decoded) = decoder.decode(data)
            && let Ok(s) = String::from_utf8(decoded)
        {
            return Some(s);
        }
    }

    None
}

/// Decode HTML entities in snippet text
fn decode_html_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}
