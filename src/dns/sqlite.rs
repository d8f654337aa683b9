//! Dynamic zone resolver
//!
//! The persistent, runtime-editable record store behind the HTTP control
//! plane. One SQLite table holds the text form of every record together with
//! its lookup key and an optional expiry; reverse PTR records are maintained
//! in the same transaction as their forward A/AAAA records, and a background
//! sweeper removes volatile rows once their expiry passes. Reads always
//! filter expired rows, so stale entries are never visible between sweeps.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dns::dynamic::{DynamicRecord, DynamicRecordSet};
use crate::dns::message::{Request, ResponseSink};
use crate::dns::record::{reverse_address, Domain, PtrRecord, Record};
use crate::dns::resolver::Resolver;
use crate::error::{Error, Result};

const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Escape `LIKE` metacharacters so only our own wildcards match.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub struct SqliteResolver {
    pool: SqlitePool,
    description: String,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SqliteResolver {
    /// Open (or create) the store at `database_url` and start the sweeper.
    pub async fn new(database_url: &str) -> Result<Self> {
        // one connection serializes every reader and writer, which sidesteps
        // SQLite lock contention; its lifetime is unbounded so an in-memory
        // store survives for the life of the pool
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(database_url)
            .await
            .map_err(|e| Error::external("failed to open dynamic zone store", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                qtype TEXT NOT NULL,
                expire INTEGER NOT NULL DEFAULT 0,
                record TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS records_name_qtype ON records (name, qtype)"#,
        )
        .execute(&pool)
        .await?;

        let shutdown = CancellationToken::new();
        let sweeper = Self::spawn_sweeper(pool.clone(), shutdown.clone());

        Ok(Self {
            pool,
            description: database_url.to_string(),
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Ephemeral store for servers running without a persistent zone file.
    pub async fn open_in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    pub async fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(&format!("sqlite:{}?mode=rwc", path.as_ref().display())).await
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn spawn_sweeper(pool: SqlitePool, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = interval.tick() => {
                        let result = sqlx::query("DELETE FROM records WHERE expire != 0 AND expire < ?")
                            .bind(unix_now())
                            .execute(&pool)
                            .await;
                        match result {
                            Ok(done) if done.rows_affected() > 0 => {
                                debug!("swept {} expired dynamic records", done.rows_affected());
                            }
                            Ok(_) => {}
                            Err(err) => warn!("dynamic zone sweep failed: {}", err),
                        }
                    }
                }
            }
        })
    }

    async fn insert_row(
        tx: &mut Transaction<'_, Sqlite>,
        record: &Record,
        expire: i64,
        now: i64,
    ) -> Result<()> {
        record.validate()?;
        let text = record.to_string();

        // expired rows are invisible to the duplicate check; clear them so
        // the UNIQUE column accepts a fresh row with a fresh ID
        sqlx::query("DELETE FROM records WHERE record = ? AND expire != 0 AND expire <= ?")
            .bind(&text)
            .bind(now)
            .execute(&mut **tx)
            .await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM records WHERE record = ? LIMIT 1")
                .bind(&text)
                .fetch_optional(&mut **tx)
                .await?;
        if existing.is_some() {
            return Ok(());
        }

        sqlx::query("INSERT INTO records (name, qtype, expire, record) VALUES (?, ?, ?, ?)")
            .bind(record.name().as_str())
            .bind(record.qtype().to_string())
            .bind(expire)
            .bind(&text)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    fn reverse_of(record: &Record) -> Option<Record> {
        match record {
            Record::Address(addr) => Some(Record::Ptr(PtrRecord {
                name: reverse_address(&addr.address),
                ttl: addr.ttl,
                target: addr.name.clone(),
            })),
            _ => None,
        }
    }

    async fn insert_record(
        tx: &mut Transaction<'_, Sqlite>,
        entry: &DynamicRecord,
        now: i64,
    ) -> Result<()> {
        let expire = if entry.volatile {
            now + i64::from(entry.record.ttl())
        } else {
            0
        };

        Self::insert_row(tx, &entry.record, expire, now).await?;

        if let Some(reverse) = Self::reverse_of(&entry.record) {
            Self::insert_row(tx, &reverse, expire, now).await?;
        }

        Ok(())
    }

    async fn drop_record(tx: &mut Transaction<'_, Sqlite>, entry: &DynamicRecord) -> Result<()> {
        let text = entry.record.to_string();

        // deleting a nonexistent record is silently ok
        match entry.id {
            Some(id) => {
                sqlx::query("DELETE FROM records WHERE id = ? AND record = ?")
                    .bind(id)
                    .bind(&text)
                    .execute(&mut **tx)
                    .await?;
            }
            None => {
                sqlx::query("DELETE FROM records WHERE record = ?")
                    .bind(&text)
                    .execute(&mut **tx)
                    .await?;
            }
        }

        if let Some(reverse) = Self::reverse_of(&entry.record) {
            sqlx::query("DELETE FROM records WHERE record = ?")
                .bind(reverse.to_string())
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }

    /// Apply an edit payload atomically: disabled entries are deleted,
    /// everything else is inserted (duplicates coalesce to a no-op). Any
    /// failure rolls the whole batch back.
    pub async fn set_records(&self, set: &DynamicRecordSet) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = unix_now();

        for entry in set.iter() {
            if entry.disabled {
                Self::drop_record(&mut tx, entry).await?;
            } else {
                Self::insert_record(&mut tx, entry, now).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    fn scan_row(id: i64, expire: i64, text: &str) -> Result<DynamicRecord> {
        Ok(DynamicRecord {
            record: text.parse()?,
            id: Some(id),
            volatile: expire != 0,
            disabled: false,
        })
    }

    fn scan_rows(rows: Vec<(i64, i64, String)>) -> Result<DynamicRecordSet> {
        let mut set = DynamicRecordSet::new();
        for (id, expire, text) in rows {
            set.push(Self::scan_row(id, expire, &text)?);
        }
        Ok(set)
    }

    /// All live records, ascending ID (insertion) order.
    pub async fn records(&self) -> Result<DynamicRecordSet> {
        let rows: Vec<(i64, i64, String)> = sqlx::query_as(
            "SELECT id, expire, record FROM records WHERE expire = 0 OR expire > ? ORDER BY id",
        )
        .bind(unix_now())
        .fetch_all(&self.pool)
        .await?;

        Self::scan_rows(rows)
    }

    /// Records whose name equals `suffix` or ends with `.<suffix>`.
    pub async fn search_records(&self, suffix: &Domain) -> Result<DynamicRecordSet> {
        let rows: Vec<(i64, i64, String)> = sqlx::query_as(
            r#"
            SELECT id, expire, record FROM records
            WHERE (name = ? OR name LIKE ? ESCAPE '\') AND (expire = 0 OR expire > ?)
            ORDER BY id
            "#,
        )
        .bind(suffix.as_str())
        .bind(format!("%.{}", escape_like(suffix.as_str())))
        .bind(unix_now())
        .fetch_all(&self.pool)
        .await?;

        Self::scan_rows(rows)
    }

    /// Shell-style glob on the name: `*` matches any run of characters,
    /// everything else is literal. The pattern is matched against the
    /// fully-qualified name.
    pub async fn glob_records(&self, pattern: &str) -> Result<DynamicRecordSet> {
        if pattern.is_empty() {
            return Err(Error::Argument("invalid glob pattern: \"\"".to_string()));
        }
        let normalized = if pattern.ends_with('.') {
            pattern.to_string()
        } else {
            format!("{}.", pattern)
        };
        let like = escape_like(&normalized).replace('*', "%");

        let rows: Vec<(i64, i64, String)> = sqlx::query_as(
            r#"
            SELECT id, expire, record FROM records
            WHERE name LIKE ? ESCAPE '\' AND (expire = 0 OR expire > ?)
            ORDER BY id
            "#,
        )
        .bind(like)
        .bind(unix_now())
        .fetch_all(&self.pool)
        .await?;

        Self::scan_rows(rows)
    }

    pub async fn get_record(&self, id: i64) -> Result<Option<DynamicRecord>> {
        let row: Option<(i64, i64, String)> = sqlx::query_as(
            "SELECT id, expire, record FROM records WHERE id = ? AND (expire = 0 OR expire > ?)",
        )
        .bind(id)
        .bind(unix_now())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((id, expire, text)) => Ok(Some(Self::scan_row(id, expire, &text)?)),
            None => Ok(None),
        }
    }

    /// Delete one record by ID; unlike the batch delete this fails with
    /// `NoSuchRecord` when the row does not exist.
    pub async fn remove_record(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<String> = sqlx::query_scalar(
            "SELECT record FROM records WHERE id = ? AND (expire = 0 OR expire > ?)",
        )
        .bind(id)
        .bind(unix_now())
        .fetch_optional(&mut *tx)
        .await?;

        let text = row.ok_or(Error::NoSuchRecord(id))?;

        sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let record: Record = text.parse()?;
        if let Some(reverse) = Self::reverse_of(&record) {
            sqlx::query("DELETE FROM records WHERE record = ?")
                .bind(reverse.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Resolver for SqliteResolver {
    async fn resolve(&self, sink: &mut dyn ResponseSink, req: &Request) -> Result<()> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT record FROM records WHERE name = ? AND qtype = ? AND (expire = 0 OR expire > ?)",
        )
        .bind(req.name.as_str())
        .bind(req.qtype.to_string())
        .bind(unix_now())
        .fetch_all(&self.pool)
        .await?;

        for text in rows {
            sink.add(text.parse()?)?;
        }

        Ok(())
    }

    fn recursion_available(&self) -> bool {
        false
    }

    async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        if let Some(handle) = self.sweeper.lock().await.take() {
            let _ = handle.await;
        }
        self.pool.close().await;
        Ok(())
    }
}
