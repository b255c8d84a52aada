//! Read-only views over stored emails

mod senders;
mod summary;

pub use senders::{RiskLevel, SenderReport, analyze_senders};
pub use summary::{CategoryCount, SpamEntry, category_summary, list_spam};
