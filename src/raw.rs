//! Raw record staging store.
//!
//! Collected API responses are staged as opaque rows in a per-collector
//! SQLite table before any downstream parsing happens. Each row carries the
//! run's parameter fingerprint, the raw JSON payload, the URL it was fetched
//! from, and the driving input record (when one exists), so downstream
//! parsers can always trace a record back to the request that produced it.
//!
//! The store owns the connection pool. Writes arrive as whole-page
//! transactions from concurrent fetch handlers while downstream parsers
//! read earlier rows, so the database runs in WAL mode with a busy timeout:
//! batch writers queue on the write lock instead of failing, and readers
//! are never blocked by an in-flight batch.
//!
//! Tables are created on demand by [`RawStore::prepare`]; a non-incremental
//! run then calls [`RawStore::purge`] to drop the previous run's rows for
//! the same fingerprint before any fetch is dispatched.
//!
//! # Example
//!
//! ```no_run
//! use collector_core::RawStore;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RawStore::open(Path::new("staging.db")).await?;
//! store.prepare("issues").await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use sqlx::FromRow;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, instrument};

/// Upper bound on pooled connections. Staging traffic is a handful of
/// page-batch writers plus a reader; SQLite serializes the writers anyway,
/// so a small pool just bounds how many batches queue at the lock.
const POOL_MAX_CONNECTIONS: u32 = 4;

/// How long a batch writer waits on a locked database before giving up.
/// Page batches are short transactions, so a queued writer clears quickly.
const BUSY_TIMEOUT_MS: u32 = 10_000;

/// Result type for staging-store operations.
pub type Result<T> = std::result::Result<T, RawStoreError>;

/// Errors from the raw staging store.
#[derive(Debug, thiserror::Error)]
pub enum RawStoreError {
    /// Failed to open or configure the staging database.
    #[error("failed to open staging database: {0}")]
    Open(#[source] sqlx::Error),

    /// The table name is not a plain SQL identifier.
    #[error("invalid staging table name: {0:?}")]
    InvalidTable(String),

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A staged row read back from a raw table.
#[derive(Debug, Clone, FromRow)]
pub struct RawRecord {
    /// Unique row identifier.
    pub id: i64,
    /// Fingerprint of the run that produced this row.
    pub params: String,
    /// Opaque JSON payload, exactly as returned by the API.
    pub data: String,
    /// URL the payload was fetched from (including query string).
    pub url: String,
    /// Serialized driving input record, when the run was input-driven.
    pub input: Option<String>,
    /// Insertion timestamp.
    pub created_at: String,
}

/// A row to be staged. Borrowed fields keep whole-page batches cheap to
/// assemble from a parsed response.
#[derive(Debug, Clone, Copy)]
pub struct NewRawRecord<'a> {
    /// Fingerprint of the producing run.
    pub params: &'a str,
    /// Opaque JSON payload.
    pub data: &'a str,
    /// URL the payload was fetched from.
    pub url: &'a str,
    /// Serialized driving input record, if any.
    pub input: Option<&'a str>,
}

/// SQLite-backed staging store for raw collected records.
///
/// Cheap to clone; all clones share the pool. All operations are safe for
/// concurrent invocation across distinct batches.
#[derive(Debug, Clone)]
pub struct RawStore {
    pool: SqlitePool,
}

impl RawStore {
    /// Opens (creating if needed) a file-backed staging database and
    /// configures it for the staging workload: WAL journaling,
    /// `synchronous=NORMAL` (safe under WAL, cheaper per batch commit),
    /// and a busy timeout so concurrent batch writers queue.
    ///
    /// # Errors
    ///
    /// Returns [`RawStoreError::Open`] if the connection or pragma setup
    /// fails.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .connect(&url)
            .await
            .map_err(RawStoreError::Open)?;

        for pragma in [
            "PRAGMA journal_mode=WAL".to_string(),
            "PRAGMA synchronous=NORMAL".to_string(),
            format!("PRAGMA busy_timeout={BUSY_TIMEOUT_MS}"),
        ] {
            sqlx::query(&pragma)
                .execute(&pool)
                .await
                .map_err(RawStoreError::Open)?;
        }

        debug!("staging database ready");
        Ok(Self { pool })
    }

    /// Opens an in-memory store, for tests.
    ///
    /// A single connection is used because every `sqlite::memory:`
    /// connection would otherwise open its own empty database; writers
    /// simply serialize on it.
    ///
    /// # Errors
    ///
    /// Returns [`RawStoreError::Open`] if the connection fails.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(RawStoreError::Open)?;

        Ok(Self { pool })
    }

    /// Returns the underlying pool, for callers running their own reads
    /// over staged rows.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Gracefully closes the pool. The store (and its clones) should not
    /// be used afterwards.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Idempotently creates the staging table (and its fingerprint index).
    ///
    /// # Errors
    ///
    /// Returns [`RawStoreError::InvalidTable`] for a malformed table name,
    /// or [`RawStoreError::Database`] if the DDL fails.
    #[instrument(skip(self))]
    pub async fn prepare(&self, table: &str) -> Result<()> {
        let quoted = quote_table(table)?;
        let ddl = format!(
            r#"CREATE TABLE IF NOT EXISTS {quoted} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                params TEXT NOT NULL,
                data TEXT NOT NULL,
                url TEXT NOT NULL,
                input TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )"#
        );
        sqlx::query(&ddl).execute(&self.pool).await?;

        let index = format!(
            r#"CREATE INDEX IF NOT EXISTS "idx_{table}_params" ON {quoted} (params)"#
        );
        sqlx::query(&index).execute(&self.pool).await?;

        debug!(table, "staging table ready");
        Ok(())
    }

    /// Deletes every row whose fingerprint matches `params`.
    ///
    /// Returns the number of rows removed. Rows staged under other
    /// fingerprints are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RawStoreError::InvalidTable`] or [`RawStoreError::Database`].
    #[instrument(skip(self, params))]
    pub async fn purge(&self, table: &str, params: &str) -> Result<u64> {
        let quoted = quote_table(table)?;
        let result = sqlx::query(&format!("DELETE FROM {quoted} WHERE params = ?"))
            .bind(params)
            .execute(&self.pool)
            .await?;

        debug!(table, rows = result.rows_affected(), "purged prior rows");
        Ok(result.rows_affected())
    }

    /// Stages a whole-page batch of rows in one transaction.
    ///
    /// An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RawStoreError::InvalidTable`] or [`RawStoreError::Database`].
    /// On failure the transaction is rolled back; no partial page is staged.
    #[instrument(skip(self, rows), fields(count = rows.len()))]
    pub async fn insert_batch(&self, table: &str, rows: &[NewRawRecord<'_>]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let quoted = quote_table(table)?;
        let insert =
            format!("INSERT INTO {quoted} (params, data, url, input) VALUES (?, ?, ?, ?)");

        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(&insert)
                .bind(row.params)
                .bind(row.data)
                .bind(row.url)
                .bind(row.input)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(table, count = rows.len(), "staged batch");
        Ok(())
    }

    /// Reads back every row staged under `params`, in insertion order.
    ///
    /// This is the read path used by downstream parsers.
    ///
    /// # Errors
    ///
    /// Returns [`RawStoreError::InvalidTable`] or [`RawStoreError::Database`].
    #[instrument(skip(self, params))]
    pub async fn fetch_all(&self, table: &str, params: &str) -> Result<Vec<RawRecord>> {
        let quoted = quote_table(table)?;
        let rows = sqlx::query_as::<_, RawRecord>(&format!(
            "SELECT * FROM {quoted} WHERE params = ? ORDER BY id ASC"
        ))
        .bind(params)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Counts the rows staged under `params`.
    ///
    /// # Errors
    ///
    /// Returns [`RawStoreError::InvalidTable`] or [`RawStoreError::Database`].
    #[instrument(skip(self, params))]
    pub async fn count(&self, table: &str, params: &str) -> Result<i64> {
        let quoted = quote_table(table)?;
        let result: (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM {quoted} WHERE params = ?"))
                .bind(params)
                .fetch_one(&self.pool)
                .await?;

        Ok(result.0)
    }
}

/// Validates a staging table name and returns it double-quoted for SQL
/// interpolation. Identifiers are restricted to `[A-Za-z_][A-Za-z0-9_]*`
/// because table names cannot be bound as query parameters.
pub(crate) fn quote_table(table: &str) -> Result<String> {
    let mut chars = table.chars();
    let valid_first = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_first || !valid_rest {
        return Err(RawStoreError::InvalidTable(table.to_string()));
    }

    Ok(format!("\"{table}\""))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn test_store() -> RawStore {
        RawStore::open_in_memory().await.unwrap()
    }

    fn row<'a>(params: &'a str, data: &'a str) -> NewRawRecord<'a> {
        NewRawRecord {
            params,
            data,
            url: "https://api.example.com/v1/things?page=1",
            input: None,
        }
    }

    #[test]
    fn test_quote_table_accepts_identifiers() {
        assert_eq!(quote_table("issues").unwrap(), "\"issues\"");
        assert_eq!(quote_table("_raw_jira_issues").unwrap(), "\"_raw_jira_issues\"");
        assert_eq!(quote_table("t2").unwrap(), "\"t2\"");
    }

    #[test]
    fn test_quote_table_rejects_injection_and_garbage() {
        assert!(quote_table("").is_err());
        assert!(quote_table("2fast").is_err());
        assert!(quote_table("drop table; --").is_err());
        assert!(quote_table("name\"quoted").is_err());
    }

    #[tokio::test]
    async fn test_open_file_backed_store_uses_wal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = RawStore::open(&temp_dir.path().join("staging.db")).await.unwrap();

        let mode: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(mode.0.to_lowercase(), "wal");

        store.prepare("things").await.unwrap();
        store.close().await;
    }

    #[tokio::test]
    async fn test_prepare_is_idempotent() {
        let store = test_store().await;
        store.prepare("things").await.unwrap();
        store.prepare("things").await.unwrap();
        assert_eq!(store.count("things", "{}").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_and_fetch_roundtrip() {
        let store = test_store().await;
        store.prepare("things").await.unwrap();

        let rows = vec![row("{\"source\":1}", "{\"a\":1}"), row("{\"source\":1}", "{\"a\":2}")];
        store.insert_batch("things", &rows).await.unwrap();

        let staged = store.fetch_all("things", "{\"source\":1}").await.unwrap();
        assert_eq!(staged.len(), 2);
        assert_eq!(staged[0].data, "{\"a\":1}");
        assert_eq!(staged[1].data, "{\"a\":2}");
        assert_eq!(staged[0].url, "https://api.example.com/v1/things?page=1");
        assert!(staged[0].input.is_none());
    }

    #[tokio::test]
    async fn test_insert_empty_batch_is_noop() {
        let store = test_store().await;
        store.prepare("things").await.unwrap();
        store.insert_batch("things", &[]).await.unwrap();
        assert_eq!(store.count("things", "{}").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_removes_only_matching_fingerprint() {
        let store = test_store().await;
        store.prepare("things").await.unwrap();

        store
            .insert_batch("things", &[row("F", "{\"a\":1}"), row("F", "{\"a\":2}")])
            .await
            .unwrap();
        store
            .insert_batch("things", &[row("G", "{\"b\":1}")])
            .await
            .unwrap();

        let purged = store.purge("things", "F").await.unwrap();
        assert_eq!(purged, 2);
        assert_eq!(store.count("things", "F").await.unwrap(), 0);
        assert_eq!(store.count("things", "G").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_input_column_persists() {
        let store = test_store().await;
        store.prepare("changelogs").await.unwrap();

        let record = NewRawRecord {
            params: "F",
            data: "{\"change\":\"x\"}",
            url: "https://api.example.com/issue/42/changelog",
            input: Some("{\"id\":42}"),
        };
        store.insert_batch("changelogs", &[record]).await.unwrap();

        let staged = store.fetch_all("changelogs", "F").await.unwrap();
        assert_eq!(staged[0].input.as_deref(), Some("{\"id\":42}"));
    }

    #[tokio::test]
    async fn test_operations_reject_invalid_table() {
        let store = test_store().await;
        let result = store.prepare("no spaces allowed").await;
        assert!(matches!(result, Err(RawStoreError::InvalidTable(_))));
    }
}
