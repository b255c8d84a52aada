//! SQLite-based email storage with zstd-compressed content bodies

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use rusqlite_migration::{M, Migrations};

use super::traits::{EmailPatch, EmailStore, Selector, UpsertOutcome, merge_cursor};
use crate::models::{
    AccountId, Category, Email, EmailId, MessageSnapshot, ProviderMessageId, SyncCursor, Verdict,
};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            CREATE TABLE emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id TEXT NOT NULL,
                provider_message_id TEXT NOT NULL,
                thread_id TEXT,
                subject TEXT NOT NULL,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                snippet TEXT NOT NULL,
                content_body BLOB,  -- zstd compressed
                received_at TEXT NOT NULL,
                internal_date INTEGER NOT NULL,
                labels TEXT NOT NULL DEFAULT '[]',  -- JSON array
                category TEXT,
                confidence_score REAL,
                is_spam INTEGER NOT NULL DEFAULT 0,
                spam_score REAL,
                spam_reason TEXT,
                is_processed INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                is_archived INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                UNIQUE (account_id, provider_message_id)
            );

            CREATE INDEX idx_emails_selection
                ON emails(account_id, is_deleted, is_processed, internal_date);
            CREATE INDEX idx_emails_sender ON emails(account_id, sender);

            -- One cursor per account
            CREATE TABLE sync_cursors (
                account_id TEXT PRIMARY KEY,
                last_synced_at TEXT,
                last_seen_provider_timestamp INTEGER
            );
            "#,
        ),
        // Migration 2: Retry list for messages that failed to fetch
        M::up(
            r#"
            ALTER TABLE sync_cursors ADD COLUMN failed_message_ids TEXT NOT NULL DEFAULT '[]';
            "#,
        ),
    ])
}

const EMAIL_COLUMNS: &str = "id, account_id, provider_message_id, thread_id, subject, sender, \
     recipient, snippet, content_body, received_at, internal_date, labels, category, \
     confidence_score, is_spam, spam_score, spam_reason, is_processed, is_deleted, \
     is_archived, created_at, last_seen_at";

/// SQLite-based email storage
pub struct SqliteEmailStore {
    conn: Mutex<Connection>,
}

impl SqliteEmailStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // WAL allows readers during the per-batch write transactions;
        // NORMAL sync is safe with WAL.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection lock poisoned"))
    }
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn compress(body: Option<&str>) -> Result<Option<Vec<u8>>> {
    // Level 3 = good balance of speed vs compression
    body.map(|text| zstd::encode_all(text.as_bytes(), 3))
        .transpose()
        .context("Failed to compress content body")
}

fn decompress(idx: usize, data: Option<Vec<u8>>) -> rusqlite::Result<Option<String>> {
    let Some(data) = data else {
        return Ok(None);
    };
    let bytes = zstd::decode_all(data.as_slice())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e)))?;
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e)))
}

fn labels_json(labels: &BTreeSet<String>) -> Result<String> {
    serde_json::to_string(labels).context("Failed to encode labels")
}

/// Map a row selected with [`EMAIL_COLUMNS`]
fn email_from_row(row: &Row<'_>) -> rusqlite::Result<Email> {
    let labels_raw: String = row.get(11)?;
    let labels: BTreeSet<String> = serde_json::from_str(&labels_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e)))?;
    let category: Option<String> = row.get(12)?;

    Ok(Email {
        id: EmailId(row.get(0)?),
        account_id: AccountId::new(row.get::<_, String>(1)?),
        provider_message_id: ProviderMessageId::new(row.get::<_, String>(2)?),
        thread_id: row.get(3)?,
        subject: row.get(4)?,
        sender: row.get(5)?,
        recipient: row.get(6)?,
        snippet: row.get(7)?,
        content_body: decompress(8, row.get(8)?)?,
        received_at: parse_ts(9, &row.get::<_, String>(9)?)?,
        internal_date: row.get(10)?,
        labels,
        category: category.map(Category::from),
        confidence_score: row.get(13)?,
        is_spam: row.get(14)?,
        spam_score: row.get(15)?,
        spam_reason: row.get(16)?,
        is_processed: row.get(17)?,
        is_deleted: row.get(18)?,
        is_archived: row.get(19)?,
        created_at: parse_ts(20, &row.get::<_, String>(20)?)?,
        last_seen_at: parse_ts(21, &row.get::<_, String>(21)?)?,
    })
}

fn load_by_provider_id(
    conn: &Connection,
    account_id: &AccountId,
    provider_message_id: &ProviderMessageId,
) -> Result<Option<Email>> {
    let sql = format!(
        "SELECT {} FROM emails WHERE account_id = ? AND provider_message_id = ?",
        EMAIL_COLUMNS
    );
    conn.query_row(
        &sql,
        params![account_id.as_str(), provider_message_id.as_str()],
        email_from_row,
    )
    .optional()
    .context("Failed to load email by provider id")
}

fn load_by_id(conn: &Connection, id: EmailId) -> Result<Option<Email>> {
    let sql = format!("SELECT {} FROM emails WHERE id = ?", EMAIL_COLUMNS);
    conn.query_row(&sql, [id.get()], email_from_row)
        .optional()
        .context("Failed to load email")
}

/// Write back every mutable column of an existing row
fn write_email(conn: &Connection, email: &Email) -> Result<()> {
    let content = compress(email.content_body.as_deref())?;
    conn.execute(
        "UPDATE emails SET
            thread_id = ?, subject = ?, sender = ?, recipient = ?, snippet = ?,
            content_body = ?, received_at = ?, internal_date = ?, labels = ?,
            category = ?, confidence_score = ?, is_spam = ?, spam_score = ?, spam_reason = ?,
            is_processed = ?, is_deleted = ?, is_archived = ?, last_seen_at = ?
         WHERE id = ?",
        params![
            email.thread_id,
            email.subject,
            email.sender,
            email.recipient,
            email.snippet,
            content,
            ts(&email.received_at),
            email.internal_date,
            labels_json(&email.labels)?,
            email.category.as_ref().map(|c| c.as_str().to_string()),
            email.confidence_score,
            email.is_spam,
            email.spam_score,
            email.spam_reason,
            email.is_processed,
            email.is_deleted,
            email.is_archived,
            ts(&email.last_seen_at),
            email.id.get(),
        ],
    )
    .context("Failed to update email")?;
    Ok(())
}

/// Insert a first sighting; `None` if the key already exists
fn insert_snapshot(
    conn: &Connection,
    account_id: &AccountId,
    snapshot: &MessageSnapshot,
    now: DateTime<Utc>,
) -> Result<Option<EmailId>> {
    let is_deleted = snapshot.has_label(crate::models::labels::TRASH);
    let content = compress(snapshot.content_body.as_deref())?;
    let inserted = conn
        .execute(
            "INSERT INTO emails (
                account_id, provider_message_id, thread_id, subject, sender, recipient,
                snippet, content_body, received_at, internal_date, labels, is_deleted,
                created_at, last_seen_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(account_id, provider_message_id) DO NOTHING",
            params![
                account_id.as_str(),
                snapshot.provider_message_id.as_str(),
                snapshot.thread_id,
                snapshot.subject,
                snapshot.sender,
                snapshot.recipient,
                snapshot.snippet,
                content,
                ts(&snapshot.received_at),
                snapshot.internal_date,
                labels_json(&snapshot.labels)?,
                is_deleted,
                ts(&now),
                ts(&now),
            ],
        )
        .context("Failed to insert email")?;

    Ok((inserted == 1).then(|| EmailId(conn.last_insert_rowid())))
}

fn load_cursor(conn: &Connection, account_id: &AccountId) -> Result<Option<SyncCursor>> {
    let row: Option<(Option<String>, Option<i64>, String)> = conn
        .query_row(
            "SELECT last_synced_at, last_seen_provider_timestamp, failed_message_ids
             FROM sync_cursors WHERE account_id = ?",
            [account_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .context("Failed to load sync cursor")?;

    let Some((last_synced_at, last_seen_provider_timestamp, failed_json)) = row else {
        return Ok(None);
    };

    let last_synced_at = last_synced_at
        .map(|raw| parse_ts(0, &raw))
        .transpose()
        .context("Invalid last_synced_at")?;
    let failed_message_ids: BTreeSet<ProviderMessageId> =
        serde_json::from_str(&failed_json).context("Invalid failed_message_ids")?;

    Ok(Some(SyncCursor {
        account_id: account_id.clone(),
        last_synced_at,
        last_seen_provider_timestamp,
        failed_message_ids,
    }))
}

fn store_cursor(conn: &Connection, cursor: &SyncCursor) -> Result<()> {
    let merged = merge_cursor(load_cursor(conn, &cursor.account_id)?.as_ref(), cursor);
    let failed_json = serde_json::to_string(&merged.failed_message_ids)?;

    conn.execute(
        "INSERT INTO sync_cursors
            (account_id, last_synced_at, last_seen_provider_timestamp, failed_message_ids)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(account_id) DO UPDATE SET
            last_synced_at = excluded.last_synced_at,
            last_seen_provider_timestamp = excluded.last_seen_provider_timestamp,
            failed_message_ids = excluded.failed_message_ids",
        params![
            merged.account_id.as_str(),
            merged.last_synced_at.as_ref().map(ts),
            merged.last_seen_provider_timestamp,
            failed_json,
        ],
    )
    .context("Failed to save sync cursor")?;
    Ok(())
}

fn upsert_in_tx(
    tx: &Transaction<'_>,
    account_id: &AccountId,
    snapshot: &MessageSnapshot,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome> {
    if let Some(id) = insert_snapshot(tx, account_id, snapshot, now)? {
        return Ok(UpsertOutcome::Inserted(id));
    }

    let mut email = load_by_provider_id(tx, account_id, &snapshot.provider_message_id)?
        .ok_or_else(|| {
            anyhow!(
                "email {} conflicted on insert but is missing",
                snapshot.provider_message_id
            )
        })?;

    if email.refresh(snapshot.clone(), now) {
        write_email(tx, &email)?;
        Ok(UpsertOutcome::Updated(email.id))
    } else {
        tx.execute(
            "UPDATE emails SET last_seen_at = ? WHERE id = ?",
            params![ts(&now), email.id.get()],
        )?;
        Ok(UpsertOutcome::Unchanged(email.id))
    }
}

/// Translate the SQL-expressible part of a selector
fn selector_sql(
    account_id: &AccountId,
    selector: &Selector,
) -> (String, Vec<rusqlite::types::Value>) {
    use rusqlite::types::Value;

    let mut sql = format!("SELECT {} FROM emails WHERE account_id = ?", EMAIL_COLUMNS);
    let mut args: Vec<Value> = vec![Value::Text(account_id.as_str().to_string())];

    if !selector.include_deleted {
        sql.push_str(" AND is_deleted = 0");
    }
    if selector.unprocessed_only {
        sql.push_str(" AND is_processed = 0");
    }
    if let Some(ids) = &selector.ids {
        if ids.is_empty() {
            sql.push_str(" AND 0");
        } else {
            let placeholders = vec!["?"; ids.len()].join(", ");
            sql.push_str(&format!(" AND id IN ({})", placeholders));
            args.extend(ids.iter().map(|id| Value::Integer(id.get())));
        }
    }
    if let Some(category) = &selector.category {
        sql.push_str(" AND category = ?");
        args.push(Value::Text(category.as_str().to_string()));
    }
    if let Some(is_spam) = selector.is_spam {
        sql.push_str(" AND is_spam = ?");
        args.push(Value::Integer(is_spam as i64));
    }
    if let Some(threshold) = selector.min_confidence {
        sql.push_str(" AND category IS NOT NULL AND confidence_score >= ?");
        args.push(Value::Real(threshold));
    }
    // Sender substring and received_before are checked by Selector::matches
    sql.push_str(" ORDER BY internal_date ASC, id ASC");
    (sql, args)
}

impl EmailStore for SqliteEmailStore {
    fn upsert_batch(
        &self,
        account_id: &AccountId,
        snapshots: &[MessageSnapshot],
        cursor: Option<&SyncCursor>,
        now: DateTime<Utc>,
    ) -> Result<Vec<UpsertOutcome>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let outcomes = snapshots
            .iter()
            .map(|snapshot| upsert_in_tx(&tx, account_id, snapshot, now))
            .collect::<Result<Vec<_>>>()?;

        if let Some(cursor) = cursor {
            store_cursor(&tx, cursor)?;
        }

        tx.commit().context("Failed to commit sync batch")?;
        debug!(
            "[STORE] Committed {} rows for {}",
            outcomes.len(),
            account_id
        );
        Ok(outcomes)
    }

    fn get_email(&self, id: EmailId) -> Result<Option<Email>> {
        let conn = self.conn()?;
        load_by_id(&conn, id)
    }

    fn find_by_provider_id(
        &self,
        account_id: &AccountId,
        provider_message_id: &ProviderMessageId,
    ) -> Result<Option<Email>> {
        let conn = self.conn()?;
        load_by_provider_id(&conn, account_id, provider_message_id)
    }

    fn select(&self, account_id: &AccountId, selector: &Selector) -> Result<Vec<Email>> {
        let conn = self.conn()?;
        let (sql, args) = selector_sql(account_id, selector);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args), email_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to select emails")?;

        let mut selected: Vec<Email> = rows.into_iter().filter(|e| selector.matches(e)).collect();
        if let Some(limit) = selector.limit {
            selected.truncate(limit);
        }
        Ok(selected)
    }

    fn count_emails(&self, account_id: &AccountId) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM emails WHERE account_id = ?",
            [account_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn apply_verdicts(&self, verdicts: &[(EmailId, Verdict)]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut written = 0;

        {
            let mut stmt = tx.prepare(
                "UPDATE emails SET category = ?, confidence_score = ?, is_spam = ?,
                        spam_score = ?, spam_reason = ?, is_processed = 1
                 WHERE id = ?",
            )?;
            for (id, verdict) in verdicts {
                written += stmt.execute(params![
                    verdict.category.as_str(),
                    verdict.confidence_score.clamp(0.0, 1.0),
                    verdict.is_spam,
                    verdict.spam_score,
                    verdict.spam_reason,
                    id.get(),
                ])?;
            }
        }

        tx.commit().context("Failed to commit verdicts")?;
        Ok(written)
    }

    fn update_email(&self, id: EmailId, patch: &EmailPatch) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let Some(mut email) = load_by_id(&tx, id)? else {
            return Ok(false);
        };
        patch.apply(&mut email);
        write_email(&tx, &email)?;
        tx.commit().context("Failed to commit email update")?;
        Ok(true)
    }

    fn get_cursor(&self, account_id: &AccountId) -> Result<Option<SyncCursor>> {
        let conn = self.conn()?;
        load_cursor(&conn, account_id)
    }

    fn save_cursor(&self, cursor: &SyncCursor) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        store_cursor(&tx, cursor)?;
        tx.commit().context("Failed to commit sync cursor")?;
        Ok(())
    }
}
