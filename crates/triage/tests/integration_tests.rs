//! Integration tests for the triage crate
//!
//! These tests drive the full flow (sync, classify, bulk) through fake
//! provider and classifier implementations against both stores.

use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use triage::classify::RawId;
use triage::intent;
use triage::mailbox::{FetchResult, ListQuery, MessagePage};
use triage::{
    AccountContext, AccountId, BulkExecutor, BulkOperation, BulkOptions, CancellationToken,
    Category, ClassifyItem, ClassifyOptions, ClassifyStatus, Classifier, EmailId, EmailStore,
    InMemoryEmailStore, IntentOutcome, JobStatus, MailboxProvider, MemoryAuditSink,
    MessageSnapshot, ProviderMessageId, RawVerdict, RetryPolicy, Selector, SqliteEmailStore,
    SyncMode, SyncOptions, SyncStatus, TaskStatus, TriageConfig, TriageError, TriageService,
    classify_account, sync_account,
};

const ACCOUNT: &str = "me@example.com";
const BASE_MS: i64 = 1_700_000_000_000;

fn ctx() -> AccountContext {
    AccountContext::new(ACCOUNT, "test-token")
}

fn account() -> AccountId {
    AccountId::from(ACCOUNT)
}

/// Snapshot whose internal date grows with the numeric suffix of `id`
fn make_snapshot(id: &str, labels: &[&str]) -> MessageSnapshot {
    let n: i64 = id.trim_start_matches(|c: char| !c.is_ascii_digit()).parse().unwrap_or(0);
    let internal_date = BASE_MS + n * 60_000;
    MessageSnapshot::builder(id)
        .thread_id(format!("t-{}", id))
        .subject(format!("Subject {}", id))
        .sender(format!("Sender {} <sender{}@example.com>", n, n))
        .recipient(ACCOUNT)
        .snippet(format!("Snippet for {}", id))
        .received_at(Utc.timestamp_millis_opt(internal_date).unwrap())
        .internal_date(internal_date)
        .labels(labels.iter().copied())
        .build()
}

/// Scripted mailbox: pages of ids, snapshots by id, per-id fetch errors
#[derive(Default)]
struct FakeProvider {
    pages: Mutex<Vec<Vec<String>>>,
    messages: Mutex<HashMap<String, MessageSnapshot>>,
    fetch_errors: Mutex<HashMap<String, TriageError>>,
    trash_errors: Mutex<HashSet<String>>,
    queries: Mutex<Vec<ListQuery>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeProvider {
    fn set_pages(&self, pages: &[&[&str]]) {
        *self.pages.lock().unwrap() = pages
            .iter()
            .map(|p| p.iter().map(|s| s.to_string()).collect())
            .collect();
    }

    fn put(&self, snapshot: MessageSnapshot) {
        self.messages
            .lock()
            .unwrap()
            .insert(snapshot.provider_message_id.as_str().to_string(), snapshot);
    }

    fn fail_fetch(&self, id: &str, error: TriageError) {
        self.fetch_errors.lock().unwrap().insert(id.to_string(), error);
    }

    fn heal_fetch(&self, id: &str) {
        self.fetch_errors.lock().unwrap().remove(id);
    }
}

impl MailboxProvider for FakeProvider {
    fn list_message_ids(
        &self,
        _ctx: &AccountContext,
        query: &ListQuery,
        page_token: Option<&str>,
    ) -> Result<MessagePage, TriageError> {
        self.queries.lock().unwrap().push(query.clone());
        let pages = self.pages.lock().unwrap();
        let index: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let ids = pages
            .get(index)
            .map(|p| p.iter().map(|s| ProviderMessageId::from(s.as_str())).collect())
            .unwrap_or_default();
        let next_page_token = (index + 1 < pages.len()).then(|| (index + 1).to_string());
        Ok(MessagePage {
            ids,
            next_page_token,
        })
    }

    fn fetch_messages(&self, _ctx: &AccountContext, ids: &[ProviderMessageId]) -> Vec<FetchResult> {
        let messages = self.messages.lock().unwrap();
        let errors = self.fetch_errors.lock().unwrap();
        ids.iter()
            .map(|id| {
                self.fetched.lock().unwrap().push(id.as_str().to_string());
                let result = match errors.get(id.as_str()) {
                    Some(e) => Err(e.clone()),
                    None => messages
                        .get(id.as_str())
                        .cloned()
                        .ok_or_else(|| TriageError::permanent(404, "not found")),
                };
                (id.clone(), result)
            })
            .collect()
    }

    fn modify_labels(
        &self,
        _ctx: &AccountContext,
        _id: &ProviderMessageId,
        _add: &[&str],
        _remove: &[&str],
    ) -> Result<(), TriageError> {
        Ok(())
    }

    fn trash(&self, _ctx: &AccountContext, id: &ProviderMessageId) -> Result<(), TriageError> {
        if self.trash_errors.lock().unwrap().contains(id.as_str()) {
            return Err(TriageError::transient("HTTP 503: backend error"));
        }
        Ok(())
    }

    fn untrash(&self, _ctx: &AccountContext, _id: &ProviderMessageId) -> Result<(), TriageError> {
        Ok(())
    }
}

type Responder = dyn Fn(&[ClassifyItem]) -> Result<Vec<RawVerdict>, TriageError> + Send + Sync;

struct FakeClassifier {
    respond: Box<Responder>,
    calls: AtomicUsize,
}

impl FakeClassifier {
    fn new<F>(respond: F) -> Self
    where
        F: Fn(&[ClassifyItem]) -> Result<Vec<RawVerdict>, TriageError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
        }
    }

    /// Labels everything as Work with fixed confidence
    fn work() -> Self {
        Self::new(|items| Ok(items.iter().map(|i| verdict(i.id, "Work", 0.8, false)).collect()))
    }
}

impl Classifier for FakeClassifier {
    fn classify_batch(&self, items: &[ClassifyItem]) -> Result<Vec<RawVerdict>, TriageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(items)
    }
}

fn verdict(id: EmailId, category: &str, confidence: f64, is_spam: bool) -> RawVerdict {
    RawVerdict {
        id: RawId::Number(id.get()),
        category: Some(category.to_string()),
        confidence_score: Some(confidence),
        is_spam: Some(is_spam),
        spam_reason: None,
    }
}

fn sync_options(mode: SyncMode, batch_size: usize) -> SyncOptions {
    SyncOptions {
        mode,
        batch_size,
        retry: RetryPolicy::immediate(2),
        ..SyncOptions::default()
    }
}

fn classify_options() -> ClassifyOptions {
    ClassifyOptions {
        retry: RetryPolicy::immediate(2),
        ..ClassifyOptions::default()
    }
}

fn email_id(store: &dyn EmailStore, provider_id: &str) -> EmailId {
    store
        .find_by_provider_id(&account(), &ProviderMessageId::from(provider_id))
        .unwrap()
        .unwrap()
        .id
}

/// Provider holding m1..m3 over two pages of size 2
fn three_message_provider() -> FakeProvider {
    let provider = FakeProvider::default();
    for id in ["m1", "m2", "m3"] {
        provider.put(make_snapshot(id, &["INBOX"]));
    }
    // Gmail lists newest first
    provider.set_pages(&[&["m3", "m2"], &["m1"]]);
    provider
}

fn check_two_page_resync(store: &dyn EmailStore) {
    let provider = three_message_provider();
    let cancel = CancellationToken::new();
    let options = sync_options(SyncMode::Incremental, 100);

    let first = sync_account(&ctx(), &provider, store, &options, &cancel).unwrap();
    assert_eq!(first.status, SyncStatus::Completed);
    assert_eq!(first.new_count, 3);
    assert_eq!(first.updated_count, 0);
    assert_eq!(store.count_emails(&account()).unwrap(), 3);
    assert_eq!(provider.queries.lock().unwrap().len(), 2);

    let m1_before = store
        .find_by_provider_id(&account(), &ProviderMessageId::from("m1"))
        .unwrap()
        .unwrap();

    provider.put(make_snapshot("m2", &["INBOX", "IMPORTANT"]));
    provider.put(make_snapshot("m4", &["INBOX"]));
    provider.set_pages(&[&["m4", "m2"]]);

    let second = sync_account(&ctx(), &provider, store, &options, &cancel).unwrap();
    assert_eq!(second.new_count, 1);
    assert_eq!(second.updated_count, 1);
    assert_eq!(store.count_emails(&account()).unwrap(), 4);

    let m2 = store
        .find_by_provider_id(&account(), &ProviderMessageId::from("m2"))
        .unwrap()
        .unwrap();
    assert!(m2.has_label("IMPORTANT"));
    let m1_after = store
        .find_by_provider_id(&account(), &ProviderMessageId::from("m1"))
        .unwrap()
        .unwrap();
    assert_eq!(m1_before, m1_after);

    let incremental_query = provider.queries.lock().unwrap().last().cloned().unwrap();
    assert!(incremental_query.q.unwrap().starts_with("after:"));
}

#[test]
fn test_two_page_sync_then_resync_in_memory() {
    check_two_page_resync(&InMemoryEmailStore::new());
}

#[test]
fn test_two_page_sync_then_resync_sqlite() {
    let (store, _dir) = create_sqlite_store();
    check_two_page_resync(&store);
}

#[test]
fn test_dedup_across_pages_and_modes() {
    let store = InMemoryEmailStore::new();
    let provider = three_message_provider();
    provider.set_pages(&[&["m3", "m2"], &["m2", "m1"], &["m3"]]);
    let cancel = CancellationToken::new();

    for mode in [SyncMode::Incremental, SyncMode::Full, SyncMode::Incremental] {
        sync_account(&ctx(), &provider, &store, &sync_options(mode, 2), &cancel).unwrap();
        for id in ["m1", "m2", "m3"] {
            let rows = store
                .select(&account(), &Selector::all().include_deleted())
                .unwrap()
                .into_iter()
                .filter(|e| e.provider_message_id.as_str() == id)
                .count();
            assert_eq!(rows, 1, "{} duplicated after {:?}", id, mode);
        }
    }
    let full_query = &provider.queries.lock().unwrap()[3];
    assert!(full_query.include_spam_trash);
}

#[test]
fn test_unchanged_resync_keeps_classification() {
    let store = InMemoryEmailStore::new();
    let provider = three_message_provider();
    let cancel = CancellationToken::new();
    let options = sync_options(SyncMode::Full, 100);

    sync_account(&ctx(), &provider, &store, &options, &cancel).unwrap();
    classify_account(
        &account(),
        &FakeClassifier::work(),
        &store,
        &classify_options(),
        &cancel,
    )
    .unwrap();
    let before = store.select(&account(), &Selector::all()).unwrap();

    let again = sync_account(&ctx(), &provider, &store, &options, &cancel).unwrap();
    assert_eq!(again.new_count, 0);
    assert_eq!(again.updated_count, 0);
    assert_eq!(again.unchanged_count, 3);

    let after = store.select(&account(), &Selector::all()).unwrap();
    for (b, a) in before.iter().zip(&after) {
        assert_eq!(b.category, a.category);
        assert_eq!(b.confidence_score, a.confidence_score);
        assert!(a.is_processed);
        assert!(a.last_seen_at >= b.last_seen_at);
    }
}

#[test]
fn test_watermark_never_decreases() {
    let store = InMemoryEmailStore::new();
    let provider = three_message_provider();
    let cancel = CancellationToken::new();
    let options = sync_options(SyncMode::Incremental, 100);

    let first = sync_account(&ctx(), &provider, &store, &options, &cancel).unwrap();
    let high = first.cursor.last_seen_provider_timestamp.unwrap();
    assert_eq!(high, BASE_MS + 3 * 60_000);

    // An older message showing up late must not pull the watermark back
    provider.put(make_snapshot("m0", &["INBOX"]));
    provider.set_pages(&[&["m0"]]);
    let second = sync_account(&ctx(), &provider, &store, &options, &cancel).unwrap();
    assert_eq!(second.new_count, 1);
    assert_eq!(second.cursor.last_seen_provider_timestamp, Some(high));
    let stored = store.get_cursor(&account()).unwrap().unwrap();
    assert_eq!(stored.last_seen_provider_timestamp, Some(high));
    assert!(stored.last_synced_at.is_some());
}

#[test]
fn test_failed_fetch_is_retried_next_run() {
    let store = InMemoryEmailStore::new();
    let provider = three_message_provider();
    provider.fail_fetch("m2", TriageError::transient("HTTP 500: backend error"));
    let cancel = CancellationToken::new();
    let options = sync_options(SyncMode::Incremental, 100);

    let first = sync_account(&ctx(), &provider, &store, &options, &cancel).unwrap();
    assert_eq!(first.status, SyncStatus::Completed);
    assert_eq!(first.new_count, 2);
    assert_eq!(first.error_count, 1);
    assert!(
        first
            .cursor
            .failed_message_ids
            .contains(&ProviderMessageId::from("m2"))
    );

    // Next listing no longer includes m2 because the watermark passed it
    provider.heal_fetch("m2");
    provider.set_pages(&[&[]]);
    let second = sync_account(&ctx(), &provider, &store, &options, &cancel).unwrap();
    assert_eq!(second.new_count, 1);
    assert!(second.cursor.failed_message_ids.is_empty());
    assert_eq!(store.count_emails(&account()).unwrap(), 3);
}

#[test]
fn test_malformed_message_is_not_retried_forever() {
    let store = InMemoryEmailStore::new();
    let provider = three_message_provider();
    provider.fail_fetch("m2", TriageError::MalformedResponse("no payload".to_string()));
    let cancel = CancellationToken::new();
    let options = sync_options(SyncMode::Incremental, 100);

    let first = sync_account(&ctx(), &provider, &store, &options, &cancel).unwrap();
    assert_eq!(first.status, SyncStatus::Completed);
    assert_eq!(first.new_count, 2);
    assert_eq!(first.error_count, 1);
    assert!(first.cursor.failed_message_ids.is_empty());

    provider.set_pages(&[&[]]);
    for _ in 0..3 {
        let again = sync_account(&ctx(), &provider, &store, &options, &cancel).unwrap();
        assert_eq!(again.error_count, 0);
        assert!(again.cursor.failed_message_ids.is_empty());
    }

    let fetched_m2 = provider
        .fetched
        .lock()
        .unwrap()
        .iter()
        .filter(|id| id.as_str() == "m2")
        .count();
    assert_eq!(fetched_m2, 1);
    let stored = store.get_cursor(&account()).unwrap().unwrap();
    assert!(stored.failed_message_ids.is_empty());
}

#[test]
fn test_rate_limit_stops_and_keeps_progress() {
    let store = InMemoryEmailStore::new();
    let provider = three_message_provider();
    provider.fail_fetch("m2", TriageError::rate_limited("HTTP 429"));
    let cancel = CancellationToken::new();

    let result = sync_account(
        &ctx(),
        &provider,
        &store,
        &sync_options(SyncMode::Incremental, 1),
        &cancel,
    )
    .unwrap();

    assert_eq!(result.status, SyncStatus::RateLimited);
    assert!(!result.is_complete());
    assert_eq!(result.new_count, 1);
    assert_eq!(store.count_emails(&account()).unwrap(), 1);
    assert!(!provider.fetched.lock().unwrap().contains(&"m3".to_string()));

    let cursor = store.get_cursor(&account()).unwrap().unwrap();
    assert_eq!(cursor.last_seen_provider_timestamp, Some(BASE_MS + 60_000));
    assert!(cursor.last_synced_at.is_none());
}

#[test]
fn test_cancelled_sync_commits_nothing_more() {
    let store = InMemoryEmailStore::new();
    let provider = three_message_provider();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = sync_account(
        &ctx(),
        &provider,
        &store,
        &sync_options(SyncMode::Incremental, 1),
        &cancel,
    )
    .unwrap();
    assert_eq!(result.status, SyncStatus::Cancelled);
    assert_eq!(store.count_emails(&account()).unwrap(), 0);
}

#[test]
fn test_classify_with_malformed_entry() {
    let store = InMemoryEmailStore::new();
    let provider = three_message_provider();
    provider.set_pages(&[&["m2", "m1"]]);
    let cancel = CancellationToken::new();
    sync_account(
        &ctx(),
        &provider,
        &store,
        &sync_options(SyncMode::Incremental, 100),
        &cancel,
    )
    .unwrap();
    let e1 = email_id(&store, "m1");
    let e2 = email_id(&store, "m2");

    let classifier = FakeClassifier::new(move |_items| {
        Ok(vec![
            verdict(e1, "spam", 0.97, true),
            RawVerdict {
                id: RawId::Number(e2.get()),
                category: None,
                confidence_score: Some(4.2),
                is_spam: None,
                spam_reason: None,
            },
        ])
    });

    let result = classify_account(&account(), &classifier, &store, &classify_options(), &cancel)
        .unwrap();
    assert_eq!(result.processed, 2);
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.status, ClassifyStatus::Completed);
    assert_eq!(result.job_status(), JobStatus::PartiallyFailed);

    let first = store.get_email(e1).unwrap().unwrap();
    assert!(first.is_processed);
    assert_eq!(first.category, Some(Category::Spam));
    assert!(first.is_spam);
    assert!(first.classification_consistent());

    let second = store.get_email(e2).unwrap().unwrap();
    assert!(!second.is_processed);
    assert!(second.category.is_none());

    let pending = store.select(&account(), &Selector::unprocessed()).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, e2);
}

#[test]
fn test_whole_batch_failure_leaves_rows_eligible() {
    let store = InMemoryEmailStore::new();
    let provider = three_message_provider();
    let cancel = CancellationToken::new();
    sync_account(
        &ctx(),
        &provider,
        &store,
        &sync_options(SyncMode::Full, 100),
        &cancel,
    )
    .unwrap();

    let classifier = FakeClassifier::new(|_| Err(TriageError::transient("timeout")));
    let result = classify_account(&account(), &classifier, &store, &classify_options(), &cancel)
        .unwrap();
    assert_eq!(result.failed, 3);
    assert_eq!(result.job_status(), JobStatus::Failed);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.select(&account(), &Selector::unprocessed()).unwrap().len(), 3);
}

#[test]
fn test_classify_budget_stops_run() {
    let store = InMemoryEmailStore::new();
    let provider = three_message_provider();
    let cancel = CancellationToken::new();
    sync_account(
        &ctx(),
        &provider,
        &store,
        &sync_options(SyncMode::Full, 100),
        &cancel,
    )
    .unwrap();

    let classifier = FakeClassifier::work();
    let options = ClassifyOptions {
        batch_size: 1,
        max_concurrency: 1,
        max_api_calls: Some(2),
        ..classify_options()
    };
    let result = classify_account(&account(), &classifier, &store, &options, &cancel).unwrap();
    assert_eq!(result.status, ClassifyStatus::BudgetExceeded);
    assert_eq!(result.processed, 2);
    assert_eq!(result.api_calls, 2);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.select(&account(), &Selector::unprocessed()).unwrap().len(), 1);
}

#[test]
fn test_reclassify_is_idempotent() {
    let store = InMemoryEmailStore::new();
    let provider = three_message_provider();
    let cancel = CancellationToken::new();
    sync_account(
        &ctx(),
        &provider,
        &store,
        &sync_options(SyncMode::Full, 100),
        &cancel,
    )
    .unwrap();
    let classifier = FakeClassifier::work();

    classify_account(&account(), &classifier, &store, &classify_options(), &cancel).unwrap();
    let first = store.select(&account(), &Selector::all()).unwrap();

    let ids: Vec<EmailId> = first.iter().map(|e| e.id).collect();
    let options = ClassifyOptions {
        retry: RetryPolicy::immediate(1),
        ..ClassifyOptions::reclassify(ids)
    };
    let rerun = classify_account(&account(), &classifier, &store, &options, &cancel).unwrap();
    assert_eq!(rerun.succeeded, 3);

    let second = store.select(&account(), &Selector::all()).unwrap();
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.category, b.category);
        assert_eq!(a.confidence_score, b.confidence_score);
        assert!(b.is_processed);
    }

    // Default selector has nothing left to do
    let idle = classify_account(&account(), &classifier, &store, &classify_options(), &cancel)
        .unwrap();
    assert_eq!(idle.processed, 0);
}

#[test]
fn test_bulk_delete_partial_failure() {
    let store = Arc::new(InMemoryEmailStore::new());
    let provider = Arc::new(three_message_provider());
    let cancel = CancellationToken::new();
    sync_account(
        &ctx(),
        provider.as_ref(),
        store.as_ref(),
        &sync_options(SyncMode::Full, 100),
        &cancel,
    )
    .unwrap();
    provider.trash_errors.lock().unwrap().insert("m2".to_string());

    let a = email_id(store.as_ref(), "m1");
    let b = email_id(store.as_ref(), "m2");
    let c = email_id(store.as_ref(), "m3");
    let b_before = store.get_email(b).unwrap().unwrap();

    let audit = Arc::new(MemoryAuditSink::new());
    let executor = BulkExecutor::new(provider.clone(), store.clone(), audit.clone());
    let options = BulkOptions {
        retry: RetryPolicy::immediate(2),
        ..BulkOptions::default()
    };
    let result = executor
        .execute(&ctx(), &BulkOperation::Delete, &[a, b, c], &options, &cancel)
        .unwrap();

    assert_eq!(result.succeeded, vec![a, c]);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].id, b);
    assert_eq!(result.status, JobStatus::PartiallyFailed);
    assert!(result.summary().contains("2 of 3 emails deleted"));

    assert!(store.get_email(a).unwrap().unwrap().is_deleted);
    assert!(store.get_email(c).unwrap().unwrap().is_deleted);
    assert_eq!(store.get_email(b).unwrap().unwrap(), b_before);
    assert_eq!(audit.records().len(), 3);
}

#[test]
fn test_soft_delete_excludes_from_selection() {
    let store = Arc::new(InMemoryEmailStore::new());
    let provider = Arc::new(three_message_provider());
    let cancel = CancellationToken::new();
    sync_account(
        &ctx(),
        provider.as_ref(),
        store.as_ref(),
        &sync_options(SyncMode::Full, 100),
        &cancel,
    )
    .unwrap();
    let x = email_id(store.as_ref(), "m1");

    let executor = BulkExecutor::new(
        provider.clone(),
        store.clone(),
        Arc::new(MemoryAuditSink::new()),
    );
    let options = BulkOptions::default();
    executor
        .execute(&ctx(), &BulkOperation::Delete, &[x], &options, &cancel)
        .unwrap();

    let deleted = store.get_email(x).unwrap().unwrap();
    assert!(deleted.is_deleted);
    assert!(deleted.has_label("TRASH"));

    let classifier = FakeClassifier::work();
    let result = classify_account(
        &account(),
        &classifier,
        store.as_ref(),
        &classify_options(),
        &cancel,
    )
    .unwrap();
    assert_eq!(result.processed, 2);
    assert!(!result.outcomes.contains_key(&x));

    let archive = executor
        .execute(&ctx(), &BulkOperation::Archive, &[x], &options, &cancel)
        .unwrap();
    assert_eq!(archive.status, JobStatus::Failed);
    assert!(!store.get_email(x).unwrap().unwrap().is_archived);

    assert!(
        !store
            .select(&account(), &Selector::all())
            .unwrap()
            .iter()
            .any(|e| e.id == x)
    );
    assert_eq!(store.count_emails(&account()).unwrap(), 3);
}

// ============================================================================
// SQLite persistence
// ============================================================================

fn create_sqlite_store() -> (SqliteEmailStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = SqliteEmailStore::new(dir.path().join("triage.test.sqlite")).unwrap();
    (store, dir)
}

#[test]
fn test_sqlite_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("triage.test.sqlite");
    let provider = three_message_provider();
    let cancel = CancellationToken::new();
    let options = sync_options(SyncMode::Incremental, 2);

    {
        let store = SqliteEmailStore::new(&path).unwrap();
        sync_account(&ctx(), &provider, &store, &options, &cancel).unwrap();
        classify_account(
            &account(),
            &FakeClassifier::work(),
            &store,
            &classify_options(),
            &cancel,
        )
        .unwrap();
    }

    let store = SqliteEmailStore::new(&path).unwrap();
    assert_eq!(store.count_emails(&account()).unwrap(), 3);
    let cursor = store.get_cursor(&account()).unwrap().unwrap();
    assert_eq!(cursor.last_seen_provider_timestamp, Some(BASE_MS + 3 * 60_000));
    assert!(store.select(&account(), &Selector::unprocessed()).unwrap().is_empty());

    let again = sync_account(&ctx(), &provider, &store, &options, &cancel).unwrap();
    assert_eq!(again.new_count, 0);
    assert_eq!(again.updated_count, 0);
    assert_eq!(
        store
            .select(&account(), &Selector::all().category(Category::Work))
            .unwrap()
            .len(),
        3
    );
}

// ============================================================================
// Service
// ============================================================================

fn service_with(provider: Arc<FakeProvider>, classifier: FakeClassifier) -> Arc<TriageService> {
    let mut config = TriageConfig::default();
    config.retry = RetryPolicy::immediate(2);
    Arc::new(TriageService::new(
        provider,
        Arc::new(classifier),
        Arc::new(InMemoryEmailStore::new()),
        Arc::new(MemoryAuditSink::new()),
        config,
    ))
}

#[test]
fn test_chat_intents_drive_pipeline() {
    let provider = Arc::new(three_message_provider());
    let spam_id = "m2";
    let service = service_with(
        provider,
        FakeClassifier::new(move |items| {
            Ok(items
                .iter()
                .map(|i| {
                    if i.subject.ends_with(spam_id) {
                        verdict(i.id, "Spam", 0.95, true)
                    } else {
                        verdict(i.id, "Personal", 0.9, false)
                    }
                })
                .collect())
        }),
    );
    let cancel = CancellationToken::new();

    let synced = service
        .handle_intent(&ctx(), &intent::parse("sync my mail"), &cancel)
        .unwrap();
    assert!(matches!(synced, IntentOutcome::Synced(ref r) if r.new_count == 3));

    let classified = service
        .handle_intent(&ctx(), &intent::parse("classify"), &cancel)
        .unwrap();
    assert!(matches!(classified, IntentOutcome::Classified(ref r) if r.succeeded == 3));

    match service
        .handle_intent(&ctx(), &intent::parse("show spam"), &cancel)
        .unwrap()
    {
        IntentOutcome::Spam(entries) => assert_eq!(entries.len(), 1),
        other => panic!("unexpected outcome {:?}", other),
    }

    match service
        .handle_intent(&ctx(), &intent::parse("delete spam"), &cancel)
        .unwrap()
    {
        IntentOutcome::Bulk(result) => {
            assert_eq!(result.succeeded.len(), 1);
            assert!(result.failed.is_empty());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(service.list_spam(&account()).unwrap().is_empty());

    let unknown = service
        .handle_intent(&ctx(), &intent::parse("what's the weather"), &cancel)
        .unwrap();
    assert_eq!(unknown, IntentOutcome::Unrecognized);
}

#[test]
fn test_background_sync_and_cooldown() {
    let provider = Arc::new(three_message_provider());
    let service = service_with(provider, FakeClassifier::work());
    assert!(service.sync_due(&account(), Utc::now()).unwrap());

    let handle = service.spawn_sync(ctx(), SyncMode::Incremental).unwrap();
    match handle.wait() {
        TaskStatus::Finished(result) => assert_eq!(result.new_count, 3),
        other => panic!("unexpected status {:?}", other),
    }
    assert!(!service.sync_due(&account(), Utc::now()).unwrap());

    let handle = service
        .spawn_classification(account(), Selector::unprocessed())
        .unwrap();
    match handle.wait() {
        TaskStatus::Finished(result) => assert_eq!(result.succeeded, 3),
        other => panic!("unexpected status {:?}", other),
    }
}
