//! Domain models for the triage pipeline

mod account;
mod address;
mod category;
mod email;
pub mod job;
pub mod labels;
mod sync_state;

pub use account::{AccountContext, AccountId};
pub use address::EmailAddress;
pub use category::Category;
pub use email::{Email, EmailId, MessageSnapshot, ProviderMessageId, SnapshotBuilder, Verdict};
pub use job::{AuditRecord, BulkOperation, ItemOutcome, JobStatus};
pub use sync_state::SyncCursor;
