//! Sync engine for pulling provider messages into the store
//!
//! Sync is idempotent: re-running it over the same messages never creates
//! duplicate rows and never touches classification state.

mod engine;
mod timing;

pub use engine::{SyncMode, SyncOptions, SyncResult, SyncStatus, build_query, sync_account};
pub use timing::{cooldown_elapsed, next_sync_at};
