//! Sync cursor tracking for incremental sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{AccountId, ProviderMessageId};

/// Tracks sync progress for one account
///
/// Persisted separately from emails to enable incremental sync. Only one
/// cursor per account; the watermark never moves backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub account_id: AccountId,
    /// When the last full pass over the listing completed
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Highest provider timestamp (ms) committed so far
    pub last_seen_provider_timestamp: Option<i64>,
    /// Messages that failed to fetch and must be retried on the next run
    ///
    /// The watermark may have passed these, so they are fetched by ID.
    #[serde(default)]
    pub failed_message_ids: BTreeSet<ProviderMessageId>,
}

impl SyncCursor {
    /// Create an empty cursor for an account that has never synced
    pub fn new(account_id: impl Into<AccountId>) -> Self {
        Self {
            account_id: account_id.into(),
            last_synced_at: None,
            last_seen_provider_timestamp: None,
            failed_message_ids: BTreeSet::new(),
        }
    }

    /// Move the watermark forward to `timestamp` if it is newer
    ///
    /// Returns whether the watermark moved.
    pub fn advance(&mut self, timestamp: i64) -> bool {
        match self.last_seen_provider_timestamp {
            Some(current) if current >= timestamp => false,
            _ => {
                self.last_seen_provider_timestamp = Some(timestamp);
                true
            }
        }
    }

    /// Record the end of a successful pass
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.last_synced_at = Some(self.last_synced_at.map_or(at, |prev| prev.max(at)));
    }

    /// Remember a message whose fetch failed
    pub fn record_failure(&mut self, id: ProviderMessageId) {
        self.failed_message_ids.insert(id);
    }

    /// Forget a message once it has been committed (or is gone upstream)
    pub fn clear_failure(&mut self, id: &ProviderMessageId) -> bool {
        self.failed_message_ids.remove(id)
    }

    /// Watermark as whole seconds, for "after:" style provider queries
    pub fn watermark_secs(&self) -> Option<i64> {
        self.last_seen_provider_timestamp.map(|ms| ms.div_euclid(1000))
    }
}
