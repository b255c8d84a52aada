//! Mutations of stored emails
//!
//! Bulk operations go to the provider first and the local store second.
//! Retention cleanup and sender flags only touch local state.

mod audit;
mod executor;
mod flags;
mod retention;

pub use audit::{AuditSink, LogAuditSink, MemoryAuditSink};
pub use executor::{BulkExecutor, BulkFailure, BulkOptions, BulkResult};
pub use flags::{SenderFlag, flag_sender};
pub use retention::{RetentionResult, cleanup_content};
