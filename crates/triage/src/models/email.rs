//! Email model: one row per provider message, scoped to one account

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::{AccountId, Category, EmailAddress, labels};

/// Internal email identifier, assigned by the store at first insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmailId(pub i64);

impl EmailId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for EmailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider (Gmail) message ID, the deduplication key within an account
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderMessageId(pub String);

impl ProviderMessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ProviderMessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProviderMessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ProviderMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider-side state of a message, as produced by normalization
///
/// This is everything the sync engine is allowed to write. Classification
/// state lives only on [`Email`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    pub provider_message_id: ProviderMessageId,
    pub thread_id: Option<String>,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub snippet: String,
    pub content_body: Option<String>,
    pub received_at: DateTime<Utc>,
    /// Provider's internal timestamp (milliseconds since epoch)
    pub internal_date: i64,
    pub labels: BTreeSet<String>,
}

impl MessageSnapshot {
    pub fn builder(id: impl Into<ProviderMessageId>) -> SnapshotBuilder {
        SnapshotBuilder::new(id.into())
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

/// Builder for creating MessageSnapshot instances
pub struct SnapshotBuilder {
    provider_message_id: ProviderMessageId,
    thread_id: Option<String>,
    subject: String,
    sender: String,
    recipient: String,
    snippet: String,
    content_body: Option<String>,
    received_at: Option<DateTime<Utc>>,
    internal_date: Option<i64>,
    labels: BTreeSet<String>,
}

impl SnapshotBuilder {
    fn new(provider_message_id: ProviderMessageId) -> Self {
        Self {
            provider_message_id,
            thread_id: None,
            subject: String::new(),
            sender: String::new(),
            recipient: String::new(),
            snippet: String::new(),
            content_body: None,
            received_at: None,
            internal_date: None,
            labels: BTreeSet::new(),
        }
    }

    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = recipient.into();
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn content_body(mut self, body: Option<String>) -> Self {
        self.content_body = body;
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    pub fn internal_date(mut self, internal_date: i64) -> Self {
        self.internal_date = Some(internal_date);
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Build the snapshot
    ///
    /// `received_at` and `internal_date` default to each other when only one
    /// is given, and to "now" when neither is.
    pub fn build(self) -> MessageSnapshot {
        let received_at = self
            .received_at
            .or_else(|| {
                self.internal_date
                    .and_then(DateTime::<Utc>::from_timestamp_millis)
            })
            .unwrap_or_else(Utc::now);
        let internal_date = self
            .internal_date
            .unwrap_or_else(|| received_at.timestamp_millis());

        MessageSnapshot {
            provider_message_id: self.provider_message_id,
            thread_id: self.thread_id,
            subject: self.subject,
            sender: self.sender,
            recipient: self.recipient,
            snippet: self.snippet,
            content_body: self.content_body,
            received_at,
            internal_date,
            labels: self.labels,
        }
    }
}

/// Classification written back onto an email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub category: Category,
    pub confidence_score: f64,
    pub is_spam: bool,
    pub spam_score: Option<f64>,
    pub spam_reason: Option<String>,
}

/// A stored email with its classification and lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: EmailId,
    pub account_id: AccountId,
    pub provider_message_id: ProviderMessageId,
    pub thread_id: Option<String>,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub snippet: String,
    pub content_body: Option<String>,
    pub received_at: DateTime<Utc>,
    pub internal_date: i64,
    pub labels: BTreeSet<String>,
    pub category: Option<Category>,
    pub confidence_score: Option<f64>,
    pub is_spam: bool,
    pub spam_score: Option<f64>,
    pub spam_reason: Option<String>,
    pub is_processed: bool,
    pub is_deleted: bool,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    /// Updated every time a sync sees this message
    pub last_seen_at: DateTime<Utc>,
}

impl Email {
    /// Create a freshly synced, unclassified email
    pub fn from_snapshot(
        id: EmailId,
        account_id: AccountId,
        snapshot: MessageSnapshot,
        now: DateTime<Utc>,
    ) -> Self {
        let is_deleted = snapshot.has_label(labels::TRASH);
        Self {
            id,
            account_id,
            provider_message_id: snapshot.provider_message_id,
            thread_id: snapshot.thread_id,
            subject: snapshot.subject,
            sender: snapshot.sender,
            recipient: snapshot.recipient,
            snippet: snapshot.snippet,
            content_body: snapshot.content_body,
            received_at: snapshot.received_at,
            internal_date: snapshot.internal_date,
            labels: snapshot.labels,
            category: None,
            confidence_score: None,
            is_spam: false,
            spam_score: None,
            spam_reason: None,
            is_processed: false,
            is_deleted,
            is_archived: false,
            created_at: now,
            last_seen_at: now,
        }
    }

    /// Whether the snapshot differs from the provider fields stored here
    pub fn differs_from(&self, snapshot: &MessageSnapshot) -> bool {
        self.thread_id != snapshot.thread_id
            || self.subject != snapshot.subject
            || self.sender != snapshot.sender
            || self.recipient != snapshot.recipient
            || self.snippet != snapshot.snippet
            || self.content_body != snapshot.content_body
            || self.received_at != snapshot.received_at
            || self.internal_date != snapshot.internal_date
            || self.labels != snapshot.labels
    }

    /// Refresh provider-owned fields from a re-synced snapshot
    ///
    /// Classification state is never touched. Deletion mirrors the TRASH
    /// label; a row leaves the archived state once INBOX reappears.
    /// Returns whether any provider field changed.
    pub fn refresh(&mut self, snapshot: MessageSnapshot, now: DateTime<Utc>) -> bool {
        let changed = self.differs_from(&snapshot);
        self.last_seen_at = now;
        if !changed {
            return false;
        }

        self.is_deleted = snapshot.has_label(labels::TRASH);
        self.is_archived = self.is_archived && !snapshot.has_label(labels::INBOX);

        self.thread_id = snapshot.thread_id;
        self.subject = snapshot.subject;
        self.sender = snapshot.sender;
        self.recipient = snapshot.recipient;
        self.snippet = snapshot.snippet;
        self.content_body = snapshot.content_body;
        self.received_at = snapshot.received_at;
        self.internal_date = snapshot.internal_date;
        self.labels = snapshot.labels;
        true
    }

    /// Write a classification verdict; last write wins
    pub fn apply_verdict(&mut self, verdict: &Verdict) {
        self.category = Some(verdict.category.clone());
        self.confidence_score = Some(verdict.confidence_score.clamp(0.0, 1.0));
        self.is_spam = verdict.is_spam;
        self.spam_score = verdict.spam_score;
        self.spam_reason = verdict.spam_reason.clone();
        self.is_processed = true;
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Parsed `From` header
    pub fn sender_address(&self) -> EmailAddress {
        EmailAddress::parse(&self.sender)
    }

    /// Whether the classification is at or above a caller-chosen threshold
    ///
    /// Unclassified rows are never confident.
    pub fn is_confident(&self, threshold: f64) -> bool {
        self.category.is_some() && self.confidence_score.is_some_and(|c| c >= threshold)
    }

    /// Check the classification-state invariants
    pub fn classification_consistent(&self) -> bool {
        let unprocessed_ok = self.is_processed || self.category.is_none();
        let confidence_ok = self.confidence_score.is_none() || self.category.is_some();
        unprocessed_ok && confidence_ok
    }
}
