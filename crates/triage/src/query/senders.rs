//! Per-sender spam risk

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::models::AccountId;
use crate::storage::{EmailStore, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_ratio(spam_ratio: f64) -> Self {
        if spam_ratio > 0.8 {
            RiskLevel::High
        } else if spam_ratio > 0.4 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SenderReport {
    /// Normalized address
    pub sender: String,
    pub email_count: usize,
    pub spam_count: usize,
    pub spam_ratio: f64,
    pub risk: RiskLevel,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Group stored emails by sender address and rate each sender
///
/// Soft-deleted rows count too: deleting spam should not clear a sender's
/// record. Sorted by risk then spam ratio, highest first.
pub fn analyze_senders(
    store: &dyn EmailStore,
    account_id: &AccountId,
) -> Result<Vec<SenderReport>> {
    let mut by_sender: HashMap<String, SenderReport> = HashMap::new();

    for email in store.select(account_id, &Selector::all().include_deleted())? {
        let sender = email.sender_address().normalized();
        if sender.is_empty() {
            continue;
        }
        let report = by_sender
            .entry(sender.clone())
            .or_insert_with(|| SenderReport {
                sender,
                email_count: 0,
                spam_count: 0,
                spam_ratio: 0.0,
                risk: RiskLevel::Low,
                first_seen: email.received_at,
                last_seen: email.received_at,
            });
        report.email_count += 1;
        if email.is_spam {
            report.spam_count += 1;
        }
        report.first_seen = report.first_seen.min(email.received_at);
        report.last_seen = report.last_seen.max(email.received_at);
    }

    let mut reports: Vec<SenderReport> = by_sender
        .into_values()
        .map(|mut report| {
            report.spam_ratio = report.spam_count as f64 / report.email_count as f64;
            report.risk = RiskLevel::from_ratio(report.spam_ratio);
            report
        })
        .collect();
    reports.sort_by(|a, b| {
        b.risk
            .cmp(&a.risk)
            .then(b.spam_ratio.total_cmp(&a.spam_ratio))
            .then_with(|| a.sender.cmp(&b.sender))
    });
    Ok(reports)
}
