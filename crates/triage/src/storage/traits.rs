//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::models::{
    AccountId, Category, Email, EmailId, MessageSnapshot, ProviderMessageId, SyncCursor, Verdict,
};

/// What an upsert did to one row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First sighting; a new row was created
    Inserted(EmailId),
    /// Existing row whose provider fields changed
    Updated(EmailId),
    /// Existing row seen again with identical provider fields
    Unchanged(EmailId),
}

impl UpsertOutcome {
    pub fn id(&self) -> EmailId {
        match *self {
            UpsertOutcome::Inserted(id)
            | UpsertOutcome::Updated(id)
            | UpsertOutcome::Unchanged(id) => id,
        }
    }
}

/// Predicate over one account's emails
///
/// The default selects every row that is not soft-deleted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    /// Restrict to these ids
    pub ids: Option<Vec<EmailId>>,
    pub unprocessed_only: bool,
    pub include_deleted: bool,
    pub category: Option<Category>,
    pub is_spam: Option<bool>,
    /// Case-insensitive substring of the `From` header
    pub sender: Option<String>,
    /// Rows below this confidence (or unclassified) are excluded
    pub min_confidence: Option<f64>,
    /// Only rows received strictly before this instant
    pub received_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl Selector {
    /// Default classification selector: unprocessed, not deleted
    pub fn unprocessed() -> Self {
        Self {
            unprocessed_only: true,
            ..Self::default()
        }
    }

    /// Every non-deleted row
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_ids(ids: Vec<EmailId>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn spam(mut self, is_spam: bool) -> Self {
        self.is_spam = Some(is_spam);
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn min_confidence(mut self, threshold: f64) -> Self {
        self.min_confidence = Some(threshold);
        self
    }

    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluate every predicate except `limit` against one row
    pub fn matches(&self, email: &Email) -> bool {
        if email.is_deleted && !self.include_deleted {
            return false;
        }
        if self.unprocessed_only && email.is_processed {
            return false;
        }
        if let Some(ids) = &self.ids
            && !ids.contains(&email.id)
        {
            return false;
        }
        if let Some(category) = &self.category
            && email.category.as_ref() != Some(category)
        {
            return false;
        }
        if let Some(is_spam) = self.is_spam
            && email.is_spam != is_spam
        {
            return false;
        }
        if let Some(sender) = &self.sender
            && !email
                .sender
                .to_lowercase()
                .contains(&sender.to_lowercase())
        {
            return false;
        }
        if let Some(threshold) = self.min_confidence
            && !email.is_confident(threshold)
        {
            return false;
        }
        if let Some(before) = self.received_before
            && email.received_at >= before
        {
            return false;
        }
        true
    }
}

/// Partial update of the locally owned state of one row
///
/// Applied by bulk operations, sender flags and retention cleanup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailPatch {
    pub labels: Option<BTreeSet<String>>,
    pub is_deleted: Option<bool>,
    pub is_archived: Option<bool>,
    pub is_spam: Option<bool>,
    pub spam_reason: Option<Option<String>>,
    pub snippet: Option<String>,
    /// Drop the stored body
    pub clear_content: bool,
}

impl EmailPatch {
    pub fn apply(&self, email: &mut Email) {
        if let Some(labels) = &self.labels {
            email.labels = labels.clone();
        }
        if let Some(is_deleted) = self.is_deleted {
            email.is_deleted = is_deleted;
        }
        if let Some(is_archived) = self.is_archived {
            email.is_archived = is_archived;
        }
        if let Some(is_spam) = self.is_spam {
            email.is_spam = is_spam;
        }
        if let Some(reason) = &self.spam_reason {
            email.spam_reason = reason.clone();
        }
        if let Some(snippet) = &self.snippet {
            email.snippet = snippet.clone();
        }
        if self.clear_content {
            email.content_body = None;
        }
    }
}

/// Storage for emails and sync cursors
///
/// This trait abstracts over the in-memory and SQLite backends. Every
/// multi-row write is atomic: either all rows commit or none do.
pub trait EmailStore: Send + Sync {
    /// Upsert a batch of snapshots for one account
    ///
    /// Rows are keyed by `(account_id, provider_message_id)`. Existing rows
    /// get their provider fields refreshed and `last_seen_at` bumped;
    /// classification state is preserved. When `cursor` is given it is saved
    /// in the same transaction. Outcomes are returned in input order.
    fn upsert_batch(
        &self,
        account_id: &AccountId,
        snapshots: &[MessageSnapshot],
        cursor: Option<&SyncCursor>,
        now: DateTime<Utc>,
    ) -> Result<Vec<UpsertOutcome>>;

    /// Get an email by internal ID
    fn get_email(&self, id: EmailId) -> Result<Option<Email>>;

    /// Look up an email by its provider key
    fn find_by_provider_id(
        &self,
        account_id: &AccountId,
        provider_message_id: &ProviderMessageId,
    ) -> Result<Option<Email>>;

    /// Rows of one account matching `selector`, oldest first
    fn select(&self, account_id: &AccountId, selector: &Selector) -> Result<Vec<Email>>;

    /// Total rows for an account, including soft-deleted ones
    fn count_emails(&self, account_id: &AccountId) -> Result<usize>;

    /// Write classification verdicts in one transaction
    ///
    /// Unknown ids are ignored. Returns the number of rows written.
    fn apply_verdicts(&self, verdicts: &[(EmailId, Verdict)]) -> Result<usize>;

    /// Apply a local state patch to one row
    ///
    /// Returns false when the row does not exist.
    fn update_email(&self, id: EmailId, patch: &EmailPatch) -> Result<bool>;

    /// Get the sync cursor for an account
    fn get_cursor(&self, account_id: &AccountId) -> Result<Option<SyncCursor>>;

    /// Save a sync cursor
    ///
    /// The stored watermark never moves backwards, whatever is passed in.
    fn save_cursor(&self, cursor: &SyncCursor) -> Result<()>;
}

/// Merge an incoming cursor with the stored one, keeping the watermark monotonic
pub(crate) fn merge_cursor(existing: Option<&SyncCursor>, incoming: &SyncCursor) -> SyncCursor {
    let mut merged = incoming.clone();
    if let Some(existing) = existing {
        if let Some(ts) = existing.last_seen_provider_timestamp {
            merged.advance(ts);
        }
        if let Some(at) = existing.last_synced_at {
            merged.mark_synced(at);
        }
    }
    merged
}
