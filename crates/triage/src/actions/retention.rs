//! Content retention cleanup
//!
//! Old rows in low-value categories keep their metadata and classification
//! but lose the stored body.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::info;
use serde::Serialize;

use crate::models::AccountId;
use crate::storage::{EmailPatch, EmailStore, Selector};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionResult {
    pub cleaned: usize,
    pub cutoff: DateTime<Utc>,
}

/// Strip content from low-value emails received more than `days` ago
pub fn cleanup_content(
    store: &dyn EmailStore,
    account_id: &AccountId,
    days: u32,
    now: DateTime<Utc>,
) -> Result<RetentionResult> {
    let cutoff = now - Duration::days(i64::from(days));
    let selector = Selector {
        received_before: Some(cutoff),
        ..Selector::all().include_deleted()
    };

    let mut cleaned = 0;
    for email in store.select(account_id, &selector)? {
        let Some(category) = email.category.as_ref().filter(|c| c.is_low_value()) else {
            continue;
        };
        let placeholder = format!("[Archived - {}]", category);
        if email.content_body.is_none() && email.snippet == placeholder {
            continue;
        }
        let patch = EmailPatch {
            snippet: Some(placeholder),
            clear_content: true,
            ..EmailPatch::default()
        };
        if store.update_email(email.id, &patch)? {
            cleaned += 1;
        }
    }

    info!(
        "[RETENTION] Cleaned {} emails older than {} for {}",
        cleaned,
        cutoff.to_rfc3339(),
        account_id
    );
    Ok(RetentionResult { cleaned, cutoff })
}
