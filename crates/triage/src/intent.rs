//! Chat message to pipeline request
//!
//! [`parse`] is a pure keyword matcher. It never touches storage or the
//! network; [`crate::service::TriageService::handle_intent`] executes the
//! result.

use crate::models::{BulkOperation, Category};
use crate::storage::Selector;

/// What a chat message asks the pipeline to do
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    SyncRequested { full: bool },
    ClassifyRequested,
    /// Apply `op` to every row matching `filter`
    BulkRequested { op: BulkOperation, filter: Selector },
    SpamListRequested,
    SummaryRequested,
    Unknown,
}

const SPAM_CLEANUP: &[&str] = &[
    "delete spam",
    "clean spam",
    "remove spam",
    "clear spam",
    "delete my spam",
    "trash spam",
];
const SPAM_LIST: &[&str] = &["show spam", "list spam", "spam emails", "show me spam"];
const CLASSIFY: &[&str] = &["classify", "process emails", "analyze emails", "categorize"];
const SUMMARY: &[&str] = &["stats", "summary", "overview", "dashboard", "report"];
const SYNC: &[&str] = &["sync", "refresh", "update emails", "get new emails"];

fn contains_any(message: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| message.contains(p))
}

/// Category named in a message, singular or plural
fn mentioned_category(message: &str) -> Option<Category> {
    let table = [
        ("newsletter", Category::Newsletter),
        ("promotion", Category::Promotional),
        ("promotional", Category::Promotional),
        ("social", Category::Social),
        ("shopping", Category::Shopping),
    ];
    message
        .split(|c: char| !c.is_alphanumeric())
        .find_map(|word| {
            let singular = word.strip_suffix('s').unwrap_or(word);
            table
                .iter()
                .find(|(name, _)| *name == word || *name == singular)
                .map(|(_, category)| category.clone())
        })
}

/// Address following "from", if it looks like one
fn mentioned_sender(message: &str) -> Option<String> {
    let mut words = message.split_whitespace();
    words.find(|w| *w == "from")?;
    words
        .next()
        .map(|w| w.trim_matches(|c: char| matches!(c, ',' | '.' | '!' | '?' | '"' | '\'')))
        .filter(|w| w.contains('@'))
        .map(str::to_string)
}

fn bulk_op(message: &str) -> Option<BulkOperation> {
    let has_verb = |verbs: &[&str]| message.split_whitespace().any(|w| verbs.contains(&w));
    if has_verb(&["delete", "trash", "remove"]) {
        Some(BulkOperation::Delete)
    } else if has_verb(&["archive"]) {
        Some(BulkOperation::Archive)
    } else {
        None
    }
}

/// Map a free-form message to an [`Intent`]
pub fn parse(message: &str) -> Intent {
    let message = message.trim().to_lowercase();
    if message.is_empty() {
        return Intent::Unknown;
    }

    if contains_any(&message, SPAM_CLEANUP) {
        return Intent::BulkRequested {
            op: BulkOperation::Delete,
            filter: Selector::all().spam(true),
        };
    }
    if contains_any(&message, SPAM_LIST) {
        return Intent::SpamListRequested;
    }
    if let Some(op) = bulk_op(&message) {
        if let Some(category) = mentioned_category(&message) {
            return Intent::BulkRequested {
                op,
                filter: Selector::all().category(category),
            };
        }
        if let Some(sender) = mentioned_sender(&message) {
            return Intent::BulkRequested {
                op,
                filter: Selector::all().sender(sender),
            };
        }
    }
    if contains_any(&message, CLASSIFY) {
        return Intent::ClassifyRequested;
    }
    if contains_any(&message, SUMMARY) {
        return Intent::SummaryRequested;
    }
    if contains_any(&message, SYNC) {
        let full = message.contains("full") || message.contains("everything");
        return Intent::SyncRequested { full };
    }
    Intent::Unknown
}
