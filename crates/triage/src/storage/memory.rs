//! In-memory storage implementation
//!
//! Used by tests and by callers that do not need durability. All maps sit
//! behind one lock so a batch write is atomic with respect to readers.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::traits::{EmailPatch, EmailStore, Selector, UpsertOutcome, merge_cursor};
use crate::models::{
    AccountId, Email, EmailId, MessageSnapshot, ProviderMessageId, SyncCursor, Verdict,
};

#[derive(Default)]
struct State {
    next_id: i64,
    /// Ordered by id so selection is stable
    emails: BTreeMap<EmailId, Email>,
    by_provider_id: HashMap<(AccountId, ProviderMessageId), EmailId>,
    cursors: HashMap<AccountId, SyncCursor>,
}

/// In-memory implementation of [`EmailStore`]
#[derive(Default)]
pub struct InMemoryEmailStore {
    state: RwLock<State>,
}

impl InMemoryEmailStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl EmailStore for InMemoryEmailStore {
    fn upsert_batch(
        &self,
        account_id: &AccountId,
        snapshots: &[MessageSnapshot],
        cursor: Option<&SyncCursor>,
        now: DateTime<Utc>,
    ) -> Result<Vec<UpsertOutcome>> {
        let mut state = self.write()?;
        let mut outcomes = Vec::with_capacity(snapshots.len());

        for snapshot in snapshots {
            let key = (account_id.clone(), snapshot.provider_message_id.clone());
            match state.by_provider_id.get(&key).copied() {
                Some(id) => {
                    let email = state
                        .emails
                        .get_mut(&id)
                        .ok_or_else(|| anyhow!("index points at missing email {}", id))?;
                    if email.refresh(snapshot.clone(), now) {
                        outcomes.push(UpsertOutcome::Updated(id));
                    } else {
                        outcomes.push(UpsertOutcome::Unchanged(id));
                    }
                }
                None => {
                    state.next_id += 1;
                    let id = EmailId(state.next_id);
                    let email = Email::from_snapshot(id, account_id.clone(), snapshot.clone(), now);
                    state.emails.insert(id, email);
                    state.by_provider_id.insert(key, id);
                    outcomes.push(UpsertOutcome::Inserted(id));
                }
            }
        }

        if let Some(cursor) = cursor {
            let merged = merge_cursor(state.cursors.get(&cursor.account_id), cursor);
            state.cursors.insert(merged.account_id.clone(), merged);
        }

        Ok(outcomes)
    }

    fn get_email(&self, id: EmailId) -> Result<Option<Email>> {
        Ok(self.read()?.emails.get(&id).cloned())
    }

    fn find_by_provider_id(
        &self,
        account_id: &AccountId,
        provider_message_id: &ProviderMessageId,
    ) -> Result<Option<Email>> {
        let state = self.read()?;
        let key = (account_id.clone(), provider_message_id.clone());
        Ok(state
            .by_provider_id
            .get(&key)
            .and_then(|id| state.emails.get(id))
            .cloned())
    }

    fn select(&self, account_id: &AccountId, selector: &Selector) -> Result<Vec<Email>> {
        let state = self.read()?;
        let mut rows: Vec<Email> = state
            .emails
            .values()
            .filter(|e| &e.account_id == account_id && selector.matches(e))
            .cloned()
            .collect();
        rows.sort_by_key(|e| (e.internal_date, e.id));
        if let Some(limit) = selector.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn count_emails(&self, account_id: &AccountId) -> Result<usize> {
        Ok(self
            .read()?
            .emails
            .values()
            .filter(|e| &e.account_id == account_id)
            .count())
    }

    fn apply_verdicts(&self, verdicts: &[(EmailId, Verdict)]) -> Result<usize> {
        let mut state = self.write()?;
        let mut written = 0;
        for (id, verdict) in verdicts {
            if let Some(email) = state.emails.get_mut(id) {
                email.apply_verdict(verdict);
                written += 1;
            }
        }
        Ok(written)
    }

    fn update_email(&self, id: EmailId, patch: &EmailPatch) -> Result<bool> {
        let mut state = self.write()?;
        match state.emails.get_mut(&id) {
            Some(email) => {
                patch.apply(email);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get_cursor(&self, account_id: &AccountId) -> Result<Option<SyncCursor>> {
        Ok(self.read()?.cursors.get(account_id).cloned())
    }

    fn save_cursor(&self, cursor: &SyncCursor) -> Result<()> {
        let mut state = self.write()?;
        let merged = merge_cursor(state.cursors.get(&cursor.account_id), cursor);
        state.cursors.insert(merged.account_id.clone(), merged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn account() -> AccountId {
        AccountId::from("me@example.com")
    }

    fn snapshot(id: &str, labels: &[&str]) -> MessageSnapshot {
        MessageSnapshot::builder(id)
            .subject(format!("Subject {}", id))
            .sender("alice@example.com")
            .internal_date(1_700_000_000_000)
            .labels(labels.iter().copied())
            .build()
    }

    #[test]
    fn test_upsert_assigns_ids_once() {
        let store = InMemoryEmailStore::new();
        let now = Utc::now();
        let first = store
            .upsert_batch(&account(), &[snapshot("m1", &["INBOX"])], None, now)
            .unwrap();
        let second = store
            .upsert_batch(&account(), &[snapshot("m1", &["INBOX"])], None, now)
            .unwrap();

        assert!(matches!(first[0], UpsertOutcome::Inserted(_)));
        assert_eq!(second[0], UpsertOutcome::Unchanged(first[0].id()));
        assert_eq!(store.count_emails(&account()).unwrap(), 1);
    }

    #[test]
    fn test_same_provider_id_in_two_accounts() {
        let store = InMemoryEmailStore::new();
        let now = Utc::now();
        store
            .upsert_batch(&account(), &[snapshot("m1", &[])], None, now)
            .unwrap();
        store
            .upsert_batch(&AccountId::from("other@example.com"), &[snapshot("m1", &[])], None, now)
            .unwrap();
        assert_eq!(store.count_emails(&account()).unwrap(), 1);
        assert_eq!(
            store
                .count_emails(&AccountId::from("other@example.com"))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_refresh_preserves_classification() {
        let store = InMemoryEmailStore::new();
        let now = Utc::now();
        let id = store
            .upsert_batch(&account(), &[snapshot("m1", &["INBOX"])], None, now)
            .unwrap()[0]
            .id();
        store
            .apply_verdicts(&[(
                id,
                Verdict {
                    category: Category::Work,
                    confidence_score: 0.9,
                    is_spam: false,
                    spam_score: None,
                    spam_reason: None,
                },
            )])
            .unwrap();

        let outcome = store
            .upsert_batch(&account(), &[snapshot("m1", &["INBOX", "STARRED"])], None, now)
            .unwrap();
        assert_eq!(outcome[0], UpsertOutcome::Updated(id));

        let email = store.get_email(id).unwrap().unwrap();
        assert_eq!(email.category, Some(Category::Work));
        assert!(email.is_processed);
        assert!(email.has_label("STARRED"));
    }

    #[test]
    fn test_cursor_saved_with_batch() {
        let store = InMemoryEmailStore::new();
        let mut cursor = SyncCursor::new(account());
        cursor.advance(1_700_000_000_000);
        store
            .upsert_batch(&account(), &[snapshot("m1", &[])], Some(&cursor), Utc::now())
            .unwrap();
        assert_eq!(store.get_cursor(&account()).unwrap(), Some(cursor));
    }

    #[test]
    fn test_update_missing_email() {
        let store = InMemoryEmailStore::new();
        let patch = EmailPatch {
            is_deleted: Some(true),
            ..EmailPatch::default()
        };
        assert!(!store.update_email(EmailId(99), &patch).unwrap());
    }
}
