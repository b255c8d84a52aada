//! Storage traits and implementations
//!
//! This module defines the storage abstraction for emails and sync cursors.
//! The trait-based design allows swapping between in-memory and SQLite
//! storage.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryEmailStore;
pub use sqlite::SqliteEmailStore;
pub use traits::{EmailPatch, EmailStore, Selector, UpsertOutcome};
