//! Classification runner
//!
//! Pulls rows selected by a [`Selector`], sends them to a [`Classifier`] in
//! batches and writes validated verdicts back. Batches are dispatched in
//! waves of `max_concurrency`; each batch's verdicts are committed in one
//! store transaction. A batch that fails as a whole leaves all of its rows
//! unprocessed so a later run picks them up again.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::spam::{SPAM_SCORE_THRESHOLD, rule_reason, spam_score};
use super::{ClassifyItem, Classifier, RawVerdict};
use crate::error::TriageError;
use crate::models::{AccountId, Category, Email, EmailId, ItemOutcome, JobStatus, Verdict};
use crate::retry::RetryPolicy;
use crate::storage::{EmailStore, Selector};
use crate::tasks::CancellationToken;

/// Options for one classification run
#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    pub selector: Selector,
    /// Emails per classifier call
    pub batch_size: usize,
    /// Classifier calls in flight at once
    pub max_concurrency: usize,
    /// Cap on classifier calls (including retries) for this run
    pub max_api_calls: Option<usize>,
    /// Per-field truncation of subject, snippet and sender
    pub max_input_chars: usize,
    pub retry: RetryPolicy,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            selector: Selector::unprocessed(),
            batch_size: 20,
            max_concurrency: 2,
            max_api_calls: None,
            max_input_chars: 500,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClassifyOptions {
    /// Re-classify specific rows, processed or not
    pub fn reclassify(ids: Vec<EmailId>) -> Self {
        Self {
            selector: Selector::with_ids(ids),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyStatus {
    Completed,
    /// The per-run call cap was hit; remaining rows stay unprocessed
    BudgetExceeded,
    Cancelled,
    /// Classifier rejected the credentials
    AuthFailed,
}

/// Outcome of one classification run
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    /// Rows sent to the classifier
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub api_calls: usize,
    pub status: ClassifyStatus,
    pub outcomes: BTreeMap<EmailId, ItemOutcome>,
    pub last_error: Option<TriageError>,
}

impl ClassificationResult {
    fn new() -> Self {
        Self {
            processed: 0,
            succeeded: 0,
            failed: 0,
            api_calls: 0,
            status: ClassifyStatus::Completed,
            outcomes: BTreeMap::new(),
            last_error: None,
        }
    }

    pub fn job_status(&self) -> JobStatus {
        JobStatus::from_counts(self.succeeded, self.failed)
    }

    fn record(&mut self, id: EmailId, outcome: ItemOutcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.insert(id, outcome);
    }
}

/// Truncate to at most `max` chars without splitting a code point
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn to_item(email: &Email, max_chars: usize) -> ClassifyItem {
    ClassifyItem {
        id: email.id,
        subject: truncate_chars(&email.subject, max_chars),
        snippet: truncate_chars(&email.snippet, max_chars),
        sender: truncate_chars(&email.sender, max_chars),
    }
}

/// Check one raw entry and combine it with the rule-based spam score
fn validate(raw: &RawVerdict, email: &Email) -> Result<Verdict, String> {
    let category = raw
        .category
        .as_deref()
        .and_then(Category::parse)
        .ok_or_else(|| "missing or empty category".to_string())?;

    let confidence = raw
        .confidence_score
        .ok_or_else(|| "missing confidence score".to_string())?;
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(format!("confidence {} outside [0, 1]", confidence));
    }

    let score = spam_score(&email.subject, &email.sender, &email.snippet);
    let classifier_spam = raw.is_spam.unwrap_or(false) || category == Category::Spam;
    let rule_spam = score > SPAM_SCORE_THRESHOLD;

    let classifier_reason = raw.spam_reason.clone().filter(|r| !r.trim().is_empty());
    let spam_reason = match (classifier_spam, rule_spam) {
        (true, _) if classifier_reason.is_some() => classifier_reason,
        (_, true) => Some(rule_reason(score)),
        _ => None,
    };

    Ok(Verdict {
        category,
        confidence_score: confidence,
        is_spam: classifier_spam || rule_spam,
        spam_score: Some(score),
        spam_reason,
    })
}

/// Split a batch response into verdicts to write and per-item failures
fn settle_batch(
    batch: &[Email],
    raws: Vec<RawVerdict>,
) -> (Vec<(EmailId, Verdict)>, Vec<(EmailId, ItemOutcome)>) {
    let by_id: HashMap<EmailId, &Email> = batch.iter().map(|e| (e.id, e)).collect();
    let mut answers: HashMap<EmailId, Result<Verdict, String>> = HashMap::new();

    for raw in &raws {
        let Some(id) = raw.id.as_email_id() else {
            debug!("[CLASSIFY] Dropping verdict with unparseable id {:?}", raw.id);
            continue;
        };
        let Some(email) = by_id.get(&id) else {
            debug!("[CLASSIFY] Dropping verdict for unrequested email {}", id);
            continue;
        };
        // First answer per id wins
        answers.entry(id).or_insert_with(|| validate(raw, email));
    }

    let mut verdicts = Vec::new();
    let mut outcomes = Vec::with_capacity(batch.len());
    for email in batch {
        match answers.remove(&email.id) {
            Some(Ok(verdict)) => {
                verdicts.push((email.id, verdict));
                outcomes.push((email.id, ItemOutcome::Succeeded));
            }
            Some(Err(reason)) => outcomes.push((
                email.id,
                ItemOutcome::failed(format!("malformed verdict: {}", reason)),
            )),
            None => outcomes.push((
                email.id,
                ItemOutcome::failed("missing from classifier response"),
            )),
        }
    }
    (verdicts, outcomes)
}

/// Classify the selected rows of one account
///
/// Only storage failures are returned as `Err`; classifier failures are
/// reflected in per-item outcomes and the run status.
pub fn classify_account(
    account_id: &AccountId,
    classifier: &dyn Classifier,
    store: &dyn EmailStore,
    options: &ClassifyOptions,
    cancel: &CancellationToken,
) -> Result<ClassificationResult> {
    let mut result = ClassificationResult::new();
    let rows = store.select(account_id, &options.selector)?;
    if rows.is_empty() {
        debug!("[CLASSIFY] Nothing to classify for {}", account_id);
        return Ok(result);
    }

    let batch_size = options.batch_size.max(1);
    let concurrency = options.max_concurrency.max(1);
    let batches: Vec<&[Email]> = rows.chunks(batch_size).collect();
    info!(
        "[CLASSIFY] Classifying {} emails for {} in {} batches",
        rows.len(),
        account_id,
        batches.len()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .thread_name(|i| format!("classify-{}", i))
        .build()
        .context("Failed to build classification pool")?;
    let calls = AtomicUsize::new(0);

    let call = |batch: &[Email]| -> Result<Vec<RawVerdict>, TriageError> {
        let items: Vec<ClassifyItem> = batch
            .iter()
            .map(|e| to_item(e, options.max_input_chars))
            .collect();
        options.retry.run("classify batch", || {
            let made = calls.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = options.max_api_calls
                && made >= limit
            {
                calls.fetch_sub(1, Ordering::SeqCst);
                return Err(TriageError::BudgetExceeded { limit });
            }
            classifier.classify_batch(&items)
        })
    };

    for wave in batches.chunks(concurrency) {
        if cancel.is_cancelled() {
            info!("[CLASSIFY] Cancelled for {}", account_id);
            result.status = ClassifyStatus::Cancelled;
            break;
        }

        let responses: Vec<Result<Vec<RawVerdict>, TriageError>> =
            pool.install(|| wave.par_iter().map(|batch| call(*batch)).collect());

        let mut stop: Option<(ClassifyStatus, TriageError)> = None;
        for (batch, response) in wave.iter().copied().zip(responses) {
            match response {
                Ok(raws) => {
                    let (verdicts, outcomes) = settle_batch(batch, raws);
                    store.apply_verdicts(&verdicts)?;
                    result.processed += batch.len();
                    for (id, outcome) in outcomes {
                        result.record(id, outcome);
                    }
                }
                Err(e @ TriageError::BudgetExceeded { .. }) => {
                    // Never sent; rows stay eligible without counting as failed
                    stop.get_or_insert((ClassifyStatus::BudgetExceeded, e));
                }
                Err(e) => {
                    warn!(
                        "[CLASSIFY] Batch of {} failed for {}: {}",
                        batch.len(),
                        account_id,
                        e
                    );
                    result.processed += batch.len();
                    for email in batch.iter() {
                        result.record(email.id, ItemOutcome::failed(e.to_string()));
                    }
                    if e.is_auth_failure() {
                        stop.get_or_insert((ClassifyStatus::AuthFailed, e.clone()));
                    }
                    result.last_error = Some(e);
                }
            }
        }

        if let Some((status, e)) = stop {
            warn!("[CLASSIFY] Stopping run for {}: {}", account_id, e);
            result.status = status;
            result.last_error = Some(e);
            break;
        }
    }

    result.api_calls = calls.load(Ordering::SeqCst);
    info!(
        "[CLASSIFY] {} finished with {:?}: {} processed, {} succeeded, {} failed, {} API calls",
        account_id,
        result.status,
        result.processed,
        result.succeeded,
        result.failed,
        result.api_calls
    );
    Ok(result)
}
