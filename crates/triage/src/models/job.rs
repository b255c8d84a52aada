//! Batch job status and per-item outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::EmailId;

/// Lifecycle status of a classification job or bulk operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    PartiallyFailed,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Final status from item counts
    ///
    /// An empty job counts as succeeded.
    pub fn from_counts(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (_, 0) => JobStatus::Succeeded,
            (0, _) => JobStatus::Failed,
            _ => JobStatus::PartiallyFailed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

/// Outcome for a single targeted email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Succeeded,
    /// Nothing to do (already in the requested state)
    Skipped,
    Failed { reason: String },
}

impl ItemOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        ItemOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, ItemOutcome::Failed { .. })
    }
}

/// Bulk operation types
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "label", rename_all = "snake_case")]
pub enum BulkOperation {
    /// Move to provider trash and soft-delete locally
    Delete,
    /// Remove from INBOX
    Archive,
    /// Add a provider label
    ApplyLabel(String),
    /// Undo of `Delete`: untrash and clear the soft-delete flag
    Restore,
    /// Undo of `Archive`: add INBOX back
    Unarchive,
}

impl BulkOperation {
    pub fn name(&self) -> &'static str {
        match self {
            BulkOperation::Delete => "delete",
            BulkOperation::Archive => "archive",
            BulkOperation::ApplyLabel(_) => "apply_label",
            BulkOperation::Restore => "restore",
            BulkOperation::Unarchive => "unarchive",
        }
    }

    /// Past-tense verb for user-facing summaries
    pub fn past_tense(&self) -> &'static str {
        match self {
            BulkOperation::Delete => "deleted",
            BulkOperation::Archive => "archived",
            BulkOperation::ApplyLabel(_) => "labeled",
            BulkOperation::Restore => "restored",
            BulkOperation::Unarchive => "moved to inbox",
        }
    }
}

impl fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkOperation::ApplyLabel(label) => write!(f, "apply_label({})", label),
            other => f.write_str(other.name()),
        }
    }
}

/// One audit entry per bulk target, for later reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub operation: BulkOperation,
    pub email_id: EmailId,
    pub outcome: ItemOutcome,
    pub timestamp: DateTime<Utc>,
}
