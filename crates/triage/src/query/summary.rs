//! Category counts and spam listing

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{AccountId, Category, EmailId};
use crate::storage::{EmailStore, Selector};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: Category,
    pub count: usize,
}

/// Number of classified, non-deleted emails per category, largest first
pub fn category_summary(
    store: &dyn EmailStore,
    account_id: &AccountId,
) -> Result<Vec<CategoryCount>> {
    let mut counts: BTreeMap<String, (Category, usize)> = BTreeMap::new();
    for email in store.select(account_id, &Selector::all())? {
        if let Some(category) = email.category {
            counts
                .entry(category.as_str().to_string())
                .or_insert_with(|| (category, 0))
                .1 += 1;
        }
    }

    let mut summary: Vec<CategoryCount> = counts
        .into_values()
        .map(|(category, count)| CategoryCount { category, count })
        .collect();
    summary.sort_by(|a, b| b.count.cmp(&a.count));
    Ok(summary)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpamEntry {
    pub id: EmailId,
    pub subject: String,
    pub sender: String,
    pub confidence_score: Option<f64>,
    pub spam_reason: Option<String>,
}

/// Non-deleted emails currently marked as spam, oldest first
pub fn list_spam(store: &dyn EmailStore, account_id: &AccountId) -> Result<Vec<SpamEntry>> {
    Ok(store
        .select(account_id, &Selector::all().spam(true))?
        .into_iter()
        .map(|email| SpamEntry {
            id: email.id,
            subject: email.subject,
            sender: email.sender,
            confidence_score: email.confidence_score,
            spam_reason: email.spam_reason,
        })
        .collect())
}
