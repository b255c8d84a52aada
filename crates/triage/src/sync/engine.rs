//! Incremental and full mailbox sync
//!
//! The engine lists every matching message ID first, then fetches and commits
//! in batches from oldest to newest. Each batch is upserted together with the
//! advanced cursor in one store transaction, so a crash loses at most the
//! in-flight batch and the watermark never runs ahead of committed rows.

use anyhow::Result;
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::error::TriageError;
use crate::mailbox::{FetchResult, ListQuery, MailboxProvider};
use crate::models::{AccountContext, MessageSnapshot, ProviderMessageId, SyncCursor};
use crate::retry::RetryPolicy;
use crate::storage::{EmailStore, UpsertOutcome};
use crate::tasks::CancellationToken;

/// Gmail's listing page size cap
const LIST_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Only messages newer than the stored watermark
    #[default]
    Incremental,
    /// Every message in every folder, including spam and trash
    Full,
}

/// Options for one sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mode: SyncMode,
    /// Messages fetched and committed per transaction
    pub batch_size: usize,
    /// Restrict to messages carrying any of these labels; empty means all
    pub target_labels: Vec<String>,
    /// Cap on listed messages; `None` lists everything
    pub max_results: Option<usize>,
    pub retry: RetryPolicy,
    /// Seconds subtracted from the watermark when building `after:`
    ///
    /// Gmail's `after:` has one-second granularity; the overlap re-lists a
    /// few already-synced messages, which the upsert absorbs.
    pub overlap_secs: i64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: SyncMode::Incremental,
            batch_size: 100,
            target_labels: Vec::new(),
            max_results: None,
            retry: RetryPolicy::default(),
            overlap_secs: 60,
        }
    }
}

impl SyncOptions {
    pub fn full() -> Self {
        Self {
            mode: SyncMode::Full,
            ..Self::default()
        }
    }
}

/// How a sync run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Listing exhausted and every batch processed
    Completed,
    /// Provider kept rate limiting after all retries
    RateLimited,
    /// Listing kept failing with transient errors
    ProviderUnavailable,
    /// Credentials rejected; re-auth required
    AuthFailed,
    /// Provider rejected the request for another reason
    Failed,
    /// Stopped at a batch boundary on request
    Cancelled,
}

/// Outcome of one sync run
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResult {
    pub new_count: usize,
    /// Existing rows whose provider fields changed
    pub updated_count: usize,
    /// Existing rows seen again unchanged (only `last_seen_at` moved)
    pub unchanged_count: usize,
    pub error_count: usize,
    pub batches_processed: usize,
    pub status: SyncStatus,
    /// Cursor as committed at the end of the run
    pub cursor: SyncCursor,
    /// Error that ended the run early, if any
    pub last_error: Option<TriageError>,
    pub duration_ms: u64,
}

impl SyncResult {
    fn new(cursor: SyncCursor) -> Self {
        Self {
            new_count: 0,
            updated_count: 0,
            unchanged_count: 0,
            error_count: 0,
            batches_processed: 0,
            status: SyncStatus::Completed,
            cursor,
            last_error: None,
            duration_ms: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == SyncStatus::Completed
    }

    fn stop(&mut self, error: TriageError) {
        self.status = status_for(&error);
        self.last_error = Some(error);
    }
}

/// Run-level status for an error that stops the run
fn status_for(error: &TriageError) -> SyncStatus {
    if error.is_rate_limited() {
        SyncStatus::RateLimited
    } else if error.is_retryable() {
        SyncStatus::ProviderUnavailable
    } else if error.is_auth_failure() {
        SyncStatus::AuthFailed
    } else if matches!(error, TriageError::Cancelled) {
        SyncStatus::Cancelled
    } else {
        SyncStatus::Failed
    }
}

/// Build the listing query for a run
pub fn build_query(cursor: &SyncCursor, options: &SyncOptions) -> ListQuery {
    let mut terms = Vec::new();

    if options.mode == SyncMode::Incremental
        && let Some(secs) = cursor.watermark_secs()
    {
        terms.push(format!("after:{}", (secs - options.overlap_secs).max(0)));
    }

    if !options.target_labels.is_empty() {
        let labels: Vec<String> = options
            .target_labels
            .iter()
            .map(|l| format!("label:{}", l.trim().replace(' ', "-")))
            .collect();
        // Braces make Gmail OR the terms
        terms.push(format!("{{{}}}", labels.join(" ")));
    }

    ListQuery {
        q: (!terms.is_empty()).then(|| terms.join(" ")),
        label_ids: Vec::new(),
        include_spam_trash: options.mode == SyncMode::Full,
        page_size: LIST_PAGE_SIZE,
    }
}

/// Follow page tokens until exhausted (or `max_results` reached)
///
/// Returns unique IDs in listing order (newest first for Gmail).
fn list_all_ids(
    ctx: &AccountContext,
    provider: &dyn MailboxProvider,
    query: &ListQuery,
    options: &SyncOptions,
    cancel: &CancellationToken,
) -> Result<Vec<ProviderMessageId>, TriageError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(TriageError::Cancelled);
        }

        let page = options.retry.run("list messages", || {
            provider.list_message_ids(ctx, query, page_token.as_deref())
        })?;
        pages += 1;

        for id in page.ids {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }

        if let Some(max) = options.max_results
            && ids.len() >= max
        {
            ids.truncate(max);
            break;
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    debug!(
        "[SYNC] Listed {} unique ids over {} pages for {}",
        ids.len(),
        pages,
        ctx.account_id
    );
    Ok(ids)
}

/// Fetch a batch, re-requesting only the items that failed transiently
///
/// Results come back in `ids` order.
fn fetch_with_retry(
    ctx: &AccountContext,
    provider: &dyn MailboxProvider,
    ids: &[ProviderMessageId],
    retry: &RetryPolicy,
) -> Vec<FetchResult> {
    let attempts = retry.max_attempts.max(1);
    let mut settled: HashMap<ProviderMessageId, Result<MessageSnapshot, TriageError>> =
        HashMap::with_capacity(ids.len());
    let mut pending: Vec<ProviderMessageId> = ids.to_vec();

    for attempt in 0..attempts {
        let mut again = Vec::new();
        for (id, result) in provider.fetch_messages(ctx, &pending) {
            match result {
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    settled.insert(id.clone(), Err(e));
                    again.push(id);
                }
                other => {
                    settled.insert(id, other);
                }
            }
        }

        if again.is_empty() {
            break;
        }

        let delay = retry.delay(attempt);
        warn!(
            "[SYNC] {} messages failed transiently (attempt {}/{}); retrying in {:?}",
            again.len(),
            attempt + 1,
            attempts,
            delay
        );
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        pending = again;
    }

    ids.iter()
        .map(|id| {
            let result = settled
                .remove(id)
                .unwrap_or_else(|| {
                    Err(TriageError::transient(format!(
                        "provider returned no result for {}",
                        id
                    )))
                });
            (id.clone(), result)
        })
        .collect()
}

/// Synchronize one account's mailbox into the store
///
/// Per-message failures are counted. Transient ones are remembered on the
/// cursor for the next run; permanent ones are logged and dropped. Rate
/// limiting, auth failures and cancellation stop the run at a batch
/// boundary with everything already committed kept. Only storage failures
/// are returned as `Err`.
pub fn sync_account(
    ctx: &AccountContext,
    provider: &dyn MailboxProvider,
    store: &dyn EmailStore,
    options: &SyncOptions,
    cancel: &CancellationToken,
) -> Result<SyncResult> {
    let start = Instant::now();
    let account_id = &ctx.account_id;
    let mut cursor = store
        .get_cursor(account_id)?
        .unwrap_or_else(|| SyncCursor::new(account_id.clone()));
    let mut result = SyncResult::new(cursor.clone());

    let query = build_query(&cursor, options);
    info!(
        "[SYNC] Starting {:?} sync for {} (query: {:?})",
        options.mode, account_id, query.q
    );

    let listed = match list_all_ids(ctx, provider, &query, options, cancel) {
        Ok(ids) => ids,
        Err(e) => {
            warn!("[SYNC] Listing failed for {}: {}", account_id, e);
            result.stop(e);
            result.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(result);
        }
    };

    // Earlier failures first, then the listing oldest-first
    let listed_set: HashSet<&ProviderMessageId> = listed.iter().collect();
    let mut ids: Vec<ProviderMessageId> = cursor
        .failed_message_ids
        .iter()
        .filter(|id| !listed_set.contains(id))
        .cloned()
        .collect();
    ids.extend(listed.iter().rev().cloned());

    let batch_size = options.batch_size.max(1);
    for chunk in ids.chunks(batch_size) {
        if cancel.is_cancelled() {
            info!("[SYNC] Cancelled for {} before next batch", account_id);
            result.stop(TriageError::Cancelled);
            break;
        }

        let mut next_cursor = cursor.clone();
        let mut snapshots = Vec::with_capacity(chunk.len());
        let mut stop: Option<TriageError> = None;

        for (id, fetched) in fetch_with_retry(ctx, provider, chunk, &options.retry) {
            match fetched {
                Ok(snapshot) => {
                    next_cursor.advance(snapshot.internal_date);
                    next_cursor.clear_failure(&id);
                    snapshots.push(snapshot);
                }
                Err(e) if e.is_not_found() => {
                    debug!("[SYNC] Message {} no longer exists", id);
                    result.error_count += 1;
                    next_cursor.clear_failure(&id);
                }
                Err(e) if e.is_retryable() || e.is_auth_failure() => {
                    warn!("[SYNC] Failed to fetch message {}: {}; will retry", id, e);
                    result.error_count += 1;
                    next_cursor.record_failure(id);
                    if (e.is_rate_limited() || e.is_auth_failure()) && stop.is_none() {
                        stop = Some(e);
                    }
                }
                Err(e) => {
                    // Malformed payloads and other 4xx do not heal on refetch
                    warn!("[SYNC] Dropping message {}: {}", id, e);
                    result.error_count += 1;
                    next_cursor.clear_failure(&id);
                }
            }
        }

        let outcomes = store.upsert_batch(account_id, &snapshots, Some(&next_cursor), Utc::now())?;
        for outcome in &outcomes {
            match outcome {
                UpsertOutcome::Inserted(_) => result.new_count += 1,
                UpsertOutcome::Updated(_) => result.updated_count += 1,
                UpsertOutcome::Unchanged(_) => result.unchanged_count += 1,
            }
        }
        cursor = next_cursor;
        result.batches_processed += 1;

        debug!(
            "[SYNC] Batch {} committed {} rows for {} (watermark {:?})",
            result.batches_processed,
            outcomes.len(),
            account_id,
            cursor.last_seen_provider_timestamp
        );

        if let Some(e) = stop {
            warn!("[SYNC] Stopping sync for {}: {}", account_id, e);
            result.stop(e);
            break;
        }
    }

    if result.is_complete() {
        cursor.mark_synced(Utc::now());
        store.save_cursor(&cursor)?;
    }
    result.cursor = cursor;
    result.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "[SYNC] {} finished with {:?}: {} new, {} updated, {} unchanged, {} errors in {} batches ({}ms)",
        account_id,
        result.status,
        result.new_count,
        result.updated_count,
        result.unchanged_count,
        result.error_count,
        result.batches_processed,
        result.duration_ms
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_query_uses_watermark_with_overlap() {
        let mut cursor = SyncCursor::new("me@example.com");
        cursor.advance(1_700_000_000_999);
        let query = build_query(&cursor, &SyncOptions::default());
        assert_eq!(query.q.as_deref(), Some("after:1699999940"));
        assert!(!query.include_spam_trash);
    }

    #[test]
    fn test_first_incremental_sync_has_no_after() {
        let cursor = SyncCursor::new("me@example.com");
        let query = build_query(&cursor, &SyncOptions::default());
        assert!(query.q.is_none());
    }

    #[test]
    fn test_full_query_ignores_cursor() {
        let mut cursor = SyncCursor::new("me@example.com");
        cursor.advance(1_700_000_000_000);
        let options = SyncOptions {
            target_labels: vec!["INBOX".to_string(), "Receipts 2024".to_string()],
            ..SyncOptions::full()
        };
        let query = build_query(&cursor, &options);
        assert_eq!(query.q.as_deref(), Some("{label:INBOX label:Receipts-2024}"));
        assert!(query.include_spam_trash);
    }

    #[test]
    fn test_status_for_errors() {
        assert_eq!(
            status_for(&TriageError::rate_limited("429")),
            SyncStatus::RateLimited
        );
        assert_eq!(
            status_for(&TriageError::transient("503")),
            SyncStatus::ProviderUnavailable
        );
        assert_eq!(
            status_for(&TriageError::permanent(401, "expired")),
            SyncStatus::AuthFailed
        );
        assert_eq!(status_for(&TriageError::Cancelled), SyncStatus::Cancelled);
        assert_eq!(
            status_for(&TriageError::permanent(400, "bad query")),
            SyncStatus::Failed
        );
    }
}
