//! Caller-facing entry points
//!
//! [`TriageService`] wires a provider, a classifier and a store together and
//! exposes the three pipeline triggers plus the read-side queries. Every
//! trigger runs synchronously; the `spawn_*` variants hand the same work to
//! a [`TaskRunner`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use std::sync::Arc;

use crate::actions::{
    AuditSink, BulkExecutor, BulkOptions, BulkResult, LogAuditSink, RetentionResult, SenderFlag,
};
use crate::classify::{
    ClassificationResult, Classifier, ClassifyOptions, LlmClassifier, classify_account,
};
use crate::config::TriageConfig;
use crate::gmail::GmailClient;
use crate::intent::Intent;
use crate::mailbox::MailboxProvider;
use crate::models::{AccountContext, AccountId, BulkOperation, EmailId};
use crate::query::{CategoryCount, SenderReport, SpamEntry};
use crate::storage::{EmailStore, Selector, SqliteEmailStore};
use crate::sync::{SyncMode, SyncResult, cooldown_elapsed, sync_account};
use crate::tasks::{CancellationToken, TaskHandle, TaskRunner};

/// What executing an [`Intent`] produced
#[derive(Debug, Clone, PartialEq)]
pub enum IntentOutcome {
    Synced(SyncResult),
    Classified(ClassificationResult),
    Bulk(BulkResult),
    Spam(Vec<SpamEntry>),
    Summary(Vec<CategoryCount>),
    /// Nothing matched; the caller decides how to answer
    Unrecognized,
}

pub struct TriageService {
    provider: Arc<dyn MailboxProvider>,
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn EmailStore>,
    bulk: BulkExecutor,
    config: TriageConfig,
    tasks: TaskRunner,
}

impl TriageService {
    pub fn new(
        provider: Arc<dyn MailboxProvider>,
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn EmailStore>,
        audit: Arc<dyn AuditSink>,
        config: TriageConfig,
    ) -> Self {
        let bulk = BulkExecutor::new(Arc::clone(&provider), Arc::clone(&store), audit);
        Self {
            provider,
            classifier,
            store,
            bulk,
            config,
            tasks: TaskRunner::new(),
        }
    }

    /// Production wiring: Gmail, the configured LLM endpoint and SQLite
    pub fn open(config: TriageConfig) -> Result<Self> {
        let db_path = config.database_path()?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }
        info!("[SERVICE] Opening database at {}", db_path.display());
        let store = SqliteEmailStore::new(&db_path)?;
        let provider = GmailClient::new(config.request_timeout(), config.sync.fetch_concurrency)?;
        let classifier =
            LlmClassifier::new(config.classifier.llm.clone(), config.request_timeout());

        Ok(Self::new(
            Arc::new(provider),
            Arc::new(classifier),
            Arc::new(store),
            Arc::new(LogAuditSink),
            config,
        ))
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn EmailStore> {
        &self.store
    }

    /// Whether the account's sync cooldown has passed
    pub fn sync_due(&self, account_id: &AccountId, now: DateTime<Utc>) -> Result<bool> {
        let last = self
            .store
            .get_cursor(account_id)?
            .and_then(|c| c.last_synced_at);
        Ok(cooldown_elapsed(last, self.config.sync.cooldown_secs, now))
    }

    pub fn trigger_sync(
        &self,
        ctx: &AccountContext,
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> Result<SyncResult> {
        let options = self.config.sync_options(mode);
        sync_account(ctx, self.provider.as_ref(), self.store.as_ref(), &options, cancel)
    }

    pub fn trigger_classification(
        &self,
        account_id: &AccountId,
        selector: Selector,
        cancel: &CancellationToken,
    ) -> Result<ClassificationResult> {
        let options = ClassifyOptions {
            selector,
            ..self.config.classify_options()
        };
        classify_account(
            account_id,
            self.classifier.as_ref(),
            self.store.as_ref(),
            &options,
            cancel,
        )
    }

    pub fn trigger_bulk_op(
        &self,
        ctx: &AccountContext,
        op: &BulkOperation,
        ids: &[EmailId],
        cancel: &CancellationToken,
    ) -> Result<BulkResult> {
        let options = BulkOptions {
            include_deleted: false,
            min_confidence: self.config.bulk_min_confidence,
            retry: self.config.retry.clone(),
        };
        self.bulk.execute(ctx, op, ids, &options, cancel)
    }

    pub fn cleanup_content(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<RetentionResult> {
        crate::actions::cleanup_content(
            self.store.as_ref(),
            account_id,
            self.config.retention_days,
            now,
        )
    }

    pub fn flag_sender(
        &self,
        account_id: &AccountId,
        sender: &str,
        flag: SenderFlag,
    ) -> Result<usize> {
        crate::actions::flag_sender(self.store.as_ref(), account_id, sender, flag)
    }

    pub fn category_summary(&self, account_id: &AccountId) -> Result<Vec<CategoryCount>> {
        crate::query::category_summary(self.store.as_ref(), account_id)
    }

    pub fn list_spam(&self, account_id: &AccountId) -> Result<Vec<SpamEntry>> {
        crate::query::list_spam(self.store.as_ref(), account_id)
    }

    pub fn analyze_senders(&self, account_id: &AccountId) -> Result<Vec<SenderReport>> {
        crate::query::analyze_senders(self.store.as_ref(), account_id)
    }

    /// Execute a parsed chat intent
    pub fn handle_intent(
        &self,
        ctx: &AccountContext,
        intent: &Intent,
        cancel: &CancellationToken,
    ) -> Result<IntentOutcome> {
        let account_id = &ctx.account_id;
        match intent {
            Intent::SyncRequested { full } => {
                let mode = if *full { SyncMode::Full } else { SyncMode::Incremental };
                self.trigger_sync(ctx, mode, cancel).map(IntentOutcome::Synced)
            }
            Intent::ClassifyRequested => self
                .trigger_classification(account_id, Selector::unprocessed(), cancel)
                .map(IntentOutcome::Classified),
            Intent::BulkRequested { op, filter } => {
                let ids: Vec<EmailId> = self
                    .store
                    .select(account_id, filter)?
                    .iter()
                    .map(|e| e.id)
                    .collect();
                self.trigger_bulk_op(ctx, op, &ids, cancel)
                    .map(IntentOutcome::Bulk)
            }
            Intent::SpamListRequested => self.list_spam(account_id).map(IntentOutcome::Spam),
            Intent::SummaryRequested => self
                .category_summary(account_id)
                .map(IntentOutcome::Summary),
            Intent::Unknown => Ok(IntentOutcome::Unrecognized),
        }
    }

    pub fn spawn_sync(
        self: &Arc<Self>,
        ctx: AccountContext,
        mode: SyncMode,
    ) -> Result<TaskHandle<SyncResult>> {
        let service = Arc::clone(self);
        self.tasks.submit(format!("sync-{}", ctx.account_id), move |cancel| {
            service.trigger_sync(&ctx, mode, &cancel)
        })
    }

    pub fn spawn_classification(
        self: &Arc<Self>,
        account_id: AccountId,
        selector: Selector,
    ) -> Result<TaskHandle<ClassificationResult>> {
        let service = Arc::clone(self);
        self.tasks.submit(format!("classify-{}", account_id), move |cancel| {
            service.trigger_classification(&account_id, selector, &cancel)
        })
    }

    pub fn spawn_bulk_op(
        self: &Arc<Self>,
        ctx: AccountContext,
        op: BulkOperation,
        ids: Vec<EmailId>,
    ) -> Result<TaskHandle<BulkResult>> {
        let service = Arc::clone(self);
        self.tasks.submit(format!("{}-{}", op.name(), ctx.account_id), move |cancel| {
            service.trigger_bulk_op(&ctx, &op, &ids, &cancel)
        })
    }
}
