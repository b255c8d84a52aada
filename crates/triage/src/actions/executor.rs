//! Bulk operations over stored emails
//!
//! Every target is handled independently: the provider is updated first and
//! the local row second, so the provider stays the source of truth. A failed
//! target is recorded and the loop moves on.

use anyhow::Result;
use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use super::audit::AuditSink;
use crate::error::TriageError;
use crate::mailbox::MailboxProvider;
use crate::models::{
    AccountContext, AuditRecord, BulkOperation, Email, EmailId, ItemOutcome, JobStatus, labels,
};
use crate::retry::RetryPolicy;
use crate::storage::{EmailPatch, EmailStore};
use crate::tasks::CancellationToken;

/// Knobs for one bulk run
#[derive(Debug, Clone, Default)]
pub struct BulkOptions {
    /// Allow targeting soft-deleted rows with operations other than restore
    pub include_deleted: bool,
    /// Delete and archive skip rows classified below this confidence
    pub min_confidence: Option<f64>,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure {
    pub id: EmailId,
    pub reason: String,
}

/// Outcome of a bulk run
///
/// `succeeded` includes targets that were already in the requested state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkResult {
    pub operation: BulkOperation,
    pub succeeded: Vec<EmailId>,
    /// How many of `succeeded` needed no change
    pub skipped: usize,
    pub failed: Vec<BulkFailure>,
    pub status: JobStatus,
}

impl BulkResult {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// One-line human summary, e.g. `12 of 15 emails deleted; 3 failed: [4, 9, 11] (...)`
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} of {} emails {}",
            self.succeeded.len(),
            self.total(),
            self.operation.past_tense()
        );
        if let Some(first) = self.failed.first() {
            let ids: Vec<String> = self.failed.iter().map(|f| f.id.to_string()).collect();
            line.push_str(&format!(
                "; {} failed: [{}] ({})",
                self.failed.len(),
                ids.join(", "),
                first.reason
            ));
        }
        line
    }
}

/// Runs bulk operations against the provider and the local store
pub struct BulkExecutor {
    provider: Arc<dyn MailboxProvider>,
    store: Arc<dyn EmailStore>,
    audit: Arc<dyn AuditSink>,
}

impl BulkExecutor {
    pub fn new(
        provider: Arc<dyn MailboxProvider>,
        store: Arc<dyn EmailStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            provider,
            store,
            audit,
        }
    }

    /// Apply `op` to every id in `ids`
    ///
    /// Duplicate ids are handled once. Only storage lookups that cannot be
    /// read return `Err`; everything else ends up in the result.
    pub fn execute(
        &self,
        ctx: &AccountContext,
        op: &BulkOperation,
        ids: &[EmailId],
        options: &BulkOptions,
        cancel: &CancellationToken,
    ) -> Result<BulkResult> {
        let mut seen = HashSet::new();
        let targets: Vec<EmailId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        info!(
            "[BULK] {} on {} emails for {}",
            op,
            targets.len(),
            ctx.account_id
        );

        let mut succeeded = Vec::new();
        let mut skipped = 0;
        let mut failed = Vec::new();
        let mut abort_reason: Option<String> = None;

        for id in targets {
            let outcome = if let Some(reason) = &abort_reason {
                ItemOutcome::failed(reason.clone())
            } else if cancel.is_cancelled() {
                ItemOutcome::failed(TriageError::Cancelled.to_string())
            } else {
                match self.apply_one(ctx, op, id, options) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        if e.is_auth_failure() {
                            error!("[BULK] Credentials rejected, aborting {}: {}", op, e);
                            abort_reason = Some(format!("aborted after auth failure: {}", e));
                        }
                        ItemOutcome::failed(e.to_string())
                    }
                }
            };

            match &outcome {
                ItemOutcome::Succeeded => succeeded.push(id),
                ItemOutcome::Skipped => {
                    succeeded.push(id);
                    skipped += 1;
                }
                ItemOutcome::Failed { reason } => {
                    warn!("[BULK] {} failed for email {}: {}", op, id, reason);
                    failed.push(BulkFailure {
                        id,
                        reason: reason.clone(),
                    });
                }
            }

            self.audit.record(&AuditRecord {
                operation: op.clone(),
                email_id: id,
                outcome,
                timestamp: Utc::now(),
            });
        }

        let result = BulkResult {
            operation: op.clone(),
            status: JobStatus::from_counts(succeeded.len(), failed.len()),
            succeeded,
            skipped,
            failed,
        };
        info!("[BULK] {}", result.summary());
        Ok(result)
    }

    fn apply_one(
        &self,
        ctx: &AccountContext,
        op: &BulkOperation,
        id: EmailId,
        options: &BulkOptions,
    ) -> Result<ItemOutcome, TriageError> {
        let email = self
            .store
            .get_email(id)
            .map_err(|e| TriageError::PreconditionFailed(format!("lookup failed: {:#}", e)))?
            .filter(|e| e.account_id == ctx.account_id)
            .ok_or_else(|| TriageError::PreconditionFailed("email not found".to_string()))?;

        // A row already in the target state is a no-op even when it would
        // fail the gates below (deleting a deleted row, archiving an
        // archived one).
        if already_applied(op, &email) {
            return Ok(ItemOutcome::Skipped);
        }
        check_preconditions(op, &email, options)?;

        let provider_id = &email.provider_message_id;
        options.retry.run(&format!("{} {}", op, provider_id), || match op {
            BulkOperation::Delete => self.provider.trash(ctx, provider_id),
            BulkOperation::Restore => self.provider.untrash(ctx, provider_id),
            BulkOperation::Archive => {
                self.provider
                    .modify_labels(ctx, provider_id, &[], &[labels::INBOX])
            }
            BulkOperation::Unarchive => {
                self.provider
                    .modify_labels(ctx, provider_id, &[labels::INBOX], &[])
            }
            BulkOperation::ApplyLabel(label) => {
                self.provider
                    .modify_labels(ctx, provider_id, &[label.as_str()], &[])
            }
        })?;

        // The provider already changed; a local failure leaves drift that the
        // next sync repairs for labels but not for local flags.
        match self.store.update_email(id, &local_patch(op, &email)) {
            Ok(true) => Ok(ItemOutcome::Succeeded),
            Ok(false) => Err(TriageError::PreconditionFailed(
                "email disappeared before local update".to_string(),
            )),
            Err(e) => {
                error!("[BULK] Provider updated but local write failed for {}: {:#}", id, e);
                Err(TriageError::PreconditionFailed(format!(
                    "local update failed: {:#}",
                    e
                )))
            }
        }
    }
}

fn check_preconditions(
    op: &BulkOperation,
    email: &Email,
    options: &BulkOptions,
) -> Result<(), TriageError> {
    if email.is_deleted && !options.include_deleted && *op != BulkOperation::Restore {
        return Err(TriageError::PreconditionFailed(
            "email is deleted".to_string(),
        ));
    }
    if let Some(threshold) = options.min_confidence
        && matches!(op, BulkOperation::Delete | BulkOperation::Archive)
        && !email.is_confident(threshold)
    {
        return Err(TriageError::PreconditionFailed(format!(
            "classification confidence below {:.2}",
            threshold
        )));
    }
    Ok(())
}

/// Whether the row is already in the state `op` would produce
fn already_applied(op: &BulkOperation, email: &Email) -> bool {
    match op {
        BulkOperation::Delete => email.is_deleted,
        BulkOperation::Restore => !email.is_deleted,
        BulkOperation::Archive => email.is_archived && !email.has_label(labels::INBOX),
        BulkOperation::Unarchive => !email.is_archived && email.has_label(labels::INBOX),
        BulkOperation::ApplyLabel(label) => email.has_label(label),
    }
}

fn local_patch(op: &BulkOperation, email: &Email) -> EmailPatch {
    let mut labels = email.labels.clone();
    let mut patch = EmailPatch::default();
    match op {
        BulkOperation::Delete => {
            labels.remove(labels::INBOX);
            labels.insert(labels::TRASH.to_string());
            patch.is_deleted = Some(true);
        }
        BulkOperation::Restore => {
            labels.remove(labels::TRASH);
            patch.is_deleted = Some(false);
        }
        BulkOperation::Archive => {
            labels.remove(labels::INBOX);
            patch.is_archived = Some(true);
        }
        BulkOperation::Unarchive => {
            labels.insert(labels::INBOX.to_string());
            patch.is_archived = Some(false);
        }
        BulkOperation::ApplyLabel(label) => {
            labels.insert(label.clone());
        }
    }
    patch.labels = Some(labels);
    patch
}
