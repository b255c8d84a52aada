//! Triage crate - mailbox sync, classification and bulk operations
//!
//! This crate provides:
//! - Domain models (Email, SyncCursor, job outcomes)
//! - The mailbox provider seam and its Gmail implementation
//! - Storage trait abstractions with in-memory and SQLite backends
//! - Idempotent, resumable sync engine
//! - Batched, budgeted classification runner with an LLM client
//! - Bulk operations with per-item outcomes and an audit trail
//! - Read-side queries and a chat intent parser
//!
//! Every call takes the account it operates on explicitly; there is no
//! process-wide client or session.

pub mod actions;
pub mod classify;
pub mod config;
pub mod error;
pub mod gmail;
pub mod intent;
pub mod mailbox;
pub mod models;
pub mod query;
pub mod retry;
pub mod service;
pub mod storage;
pub mod sync;
pub mod tasks;

pub use actions::{
    AuditSink, BulkExecutor, BulkFailure, BulkOptions, BulkResult, LogAuditSink, MemoryAuditSink,
    RetentionResult, SenderFlag, cleanup_content, flag_sender,
};
pub use classify::{
    ClassificationResult, Classifier, ClassifyItem, ClassifyOptions, ClassifyStatus, LlmClassifier,
    LlmConfig, RawVerdict, classify_account,
};
pub use config::{TriageConfig, load_accounts};
pub use error::TriageError;
pub use gmail::GmailClient;
pub use intent::Intent;
pub use mailbox::{FetchResult, ListQuery, MailboxProvider, MessagePage};
pub use models::{
    AccountContext, AccountId, AuditRecord, BulkOperation, Category, Email, EmailAddress, EmailId,
    ItemOutcome, JobStatus, MessageSnapshot, ProviderMessageId, SyncCursor, Verdict,
};
pub use query::{CategoryCount, RiskLevel, SenderReport, SpamEntry};
pub use retry::RetryPolicy;
pub use service::{IntentOutcome, TriageService};
pub use storage::{
    EmailPatch, EmailStore, InMemoryEmailStore, Selector, SqliteEmailStore, UpsertOutcome,
};
pub use sync::{SyncMode, SyncOptions, SyncResult, SyncStatus, cooldown_elapsed, sync_account};
pub use tasks::{CancellationToken, TaskHandle, TaskRunner, TaskStatus};
