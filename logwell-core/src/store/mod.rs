//! Embedded SQLite store: entry rows, the FTS index kept in sync by
//! triggers, and the cursor table.
//!
//! Writes flow through [`LogStore::insert_batch`], which commits entries and
//! the cursor advance in one transaction: a failed commit leaves the cursor
//! behind, and the same bytes are re-read and re-inserted next tick.

mod queries;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use logwell_model::{Cursor, LogEntry, LogLevel, StreamKind};

use crate::error::{EngineError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS log_entries (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    container TEXT NOT NULL,
    stream    TEXT NOT NULL,
    level     TEXT NOT NULL,
    message   TEXT NOT NULL,
    raw       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_log_entries_container ON log_entries(container);
CREATE INDEX IF NOT EXISTS idx_log_entries_level     ON log_entries(level);
CREATE INDEX IF NOT EXISTS idx_log_entries_timestamp ON log_entries(timestamp);

CREATE VIRTUAL TABLE IF NOT EXISTS log_entries_fts USING fts5(
    message,
    content='log_entries',
    content_rowid='id',
    tokenize="unicode61 remove_diacritics 2"
);

CREATE TRIGGER IF NOT EXISTS log_entries_fts_insert AFTER INSERT ON log_entries BEGIN
    INSERT INTO log_entries_fts(rowid, message) VALUES (new.id, new.message);
END;

CREATE TRIGGER IF NOT EXISTS log_entries_fts_delete AFTER DELETE ON log_entries BEGIN
    INSERT INTO log_entries_fts(log_entries_fts, rowid, message)
    VALUES ('delete', old.id, old.message);
END;

CREATE TABLE IF NOT EXISTS cursors (
    container_id TEXT PRIMARY KEY,
    file_path    TEXT NOT NULL,
    position     INTEGER NOT NULL,
    inode        INTEGER NOT NULL,
    updated_at   TEXT NOT NULL
);
"#;

/// An entry that has been reassembled and classified but not yet committed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub timestamp: DateTime<Utc>,
    pub container: String,
    pub stream: StreamKind,
    pub level: LogLevel,
    pub message: String,
    pub raw: String,
}

/// Handle to the embedded store. Cheap to clone; all clones share one pool.
#[derive(Debug, Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    /// Open (creating if missing) the store at `path` and ensure the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(map_sqlx)?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| EngineError::StoreFatal(format!("schema init failed: {e}")))?;

        debug!(path = %path.display(), "opened log store");
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Commit a batch of entries together with the cursor that covers them.
    ///
    /// Returns the committed rows with their store-assigned ids, in insert
    /// order. On [`EngineError::StoreBusy`] nothing was written and the
    /// caller retries the same bytes on its next tick.
    pub async fn insert_batch(
        &self,
        entries: &[NewEntry],
        cursor: &Cursor,
    ) -> Result<Vec<LogEntry>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let mut committed = Vec::with_capacity(entries.len());

        for entry in entries {
            let row = sqlx::query(
                "INSERT INTO log_entries (timestamp, container, stream, level, message, raw) \
                 VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(fmt_ts(entry.timestamp))
            .bind(&entry.container)
            .bind(entry.stream.as_str())
            .bind(entry.level.as_str())
            .bind(&entry.message)
            .bind(&entry.raw)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            let id: i64 = row.try_get(0).map_err(map_sqlx)?;
            committed.push(LogEntry {
                id,
                timestamp: entry.timestamp,
                container: entry.container.clone(),
                stream: entry.stream,
                level: entry.level,
                message: entry.message.clone(),
                raw: entry.raw.clone(),
            });
        }

        sqlx::query(
            "INSERT OR REPLACE INTO cursors (container_id, file_path, position, inode, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&cursor.container_id)
        .bind(cursor.file_path.to_string_lossy().into_owned())
        .bind(cursor.position as i64)
        .bind(cursor.inode as i64)
        .bind(fmt_ts(cursor.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(committed)
    }

    /// All persisted cursors, loaded once at scheduler startup.
    pub async fn load_cursors(&self) -> Result<Vec<Cursor>> {
        let rows = sqlx::query(
            "SELECT container_id, file_path, position, inode, updated_at FROM cursors",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut cursors = Vec::with_capacity(rows.len());
        for row in rows {
            cursors.push(Cursor {
                container_id: row.try_get("container_id").map_err(map_sqlx)?,
                file_path: row.try_get::<String, _>("file_path").map_err(map_sqlx)?.into(),
                position: row.try_get::<i64, _>("position").map_err(map_sqlx)? as u64,
                inode: row.try_get::<i64, _>("inode").map_err(map_sqlx)? as u64,
                updated_at: parse_ts(&row.try_get::<String, _>("updated_at").map_err(map_sqlx)?)?,
            });
        }
        Ok(cursors)
    }

    /// Total number of stored entries.
    pub async fn count(&self) -> Result<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM log_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(total as u64)
    }

    /// Delete lowest-id rows until at most `max_rows` remain. The FTS rows
    /// cascade through the delete trigger. Returns how many rows went.
    pub async fn trim_to(&self, max_rows: u64) -> Result<u64> {
        let total = self.count().await?;
        if total <= max_rows {
            return Ok(0);
        }
        let overflow = (total - max_rows) as i64;

        let result = sqlx::query(
            "DELETE FROM log_entries WHERE id IN \
             (SELECT id FROM log_entries ORDER BY id ASC LIMIT ?)",
        )
        .bind(overflow)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected())
    }
}

/// Timestamps are persisted as fixed-width RFC 3339 UTC text so that SQL
/// string comparison agrees with chronological order.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| EngineError::StoreFatal(format!("corrupt timestamp {text:?}: {e}")))
}

/// Map driver errors onto the engine's three store outcomes: transient
/// contention, a bad MATCH expression, or corruption.
pub(crate) fn map_sqlx(error: sqlx::Error) -> EngineError {
    if let sqlx::Error::Database(db) = &error {
        let code = db.code();
        let code = code.as_deref().unwrap_or("");
        if code == "5" || code == "6" || code == "517" || db.message().contains("database is locked")
        {
            return EngineError::StoreBusy;
        }
        let message = db.message();
        if message.contains("fts5") || message.contains("MATCH") {
            return EngineError::InvalidSearch(message.to_string());
        }
    }
    if matches!(error, sqlx::Error::PoolTimedOut) {
        return EngineError::StoreBusy;
    }
    EngineError::StoreFatal(error.to_string())
}
