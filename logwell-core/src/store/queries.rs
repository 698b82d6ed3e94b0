//! Read-side queries: filtered pagination, aggregate stats, and the
//! container listing. All reads run concurrently with the single ingestion
//! writer; WAL snapshots keep them isolated from in-flight transactions.

use std::collections::BTreeMap;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use logwell_model::{ContainerSummary, LogEntry, LogFilter, LogStats, Pagination};

use crate::error::{EngineError, Result};
use crate::store::{fmt_ts, map_sqlx, parse_ts, LogStore};

/// `total` comes from a bounded scan; beyond this many matching rows the
/// count saturates rather than walking the whole table.
const TOTAL_SCAN_CAP: i64 = 100_000;

impl LogStore {
    /// Filtered page of entries, newest first, plus the (bounded) filtered
    /// total.
    pub async fn list(
        &self,
        filter: &LogFilter,
        page: Pagination,
    ) -> Result<(Vec<LogEntry>, u64)> {
        let (where_clause, binds) = build_where(filter);

        let sql = format!(
            "SELECT id, timestamp, container, stream, level, message, raw \
             FROM log_entries{where_clause} ORDER BY id DESC LIMIT ? OFFSET ?",
        );
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(decode_row(&row)?);
        }

        let count_sql = format!(
            "SELECT COUNT(*) FROM (SELECT id FROM log_entries{where_clause} LIMIT {TOTAL_SCAN_CAP})",
        );
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for bind in &binds {
            count_query = count_query.bind(bind);
        }
        let total = count_query.fetch_one(self.pool()).await.map_err(map_sqlx)?;

        Ok((entries, total as u64))
    }

    /// Aggregated counters over everything currently retained.
    pub async fn stats(&self) -> Result<LogStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, MIN(timestamp) AS oldest, MAX(timestamp) AS newest \
             FROM log_entries",
        )
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx)?;

        let total: i64 = row.try_get("total").map_err(map_sqlx)?;
        let oldest: Option<String> = row.try_get("oldest").map_err(map_sqlx)?;
        let newest: Option<String> = row.try_get("newest").map_err(map_sqlx)?;

        let mut by_level = BTreeMap::new();
        let level_rows = sqlx::query("SELECT level, COUNT(*) AS n FROM log_entries GROUP BY level")
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx)?;
        for row in level_rows {
            let level: String = row.try_get("level").map_err(map_sqlx)?;
            let n: i64 = row.try_get("n").map_err(map_sqlx)?;
            by_level.insert(level, n as u64);
        }

        let mut by_container = BTreeMap::new();
        let container_rows =
            sqlx::query("SELECT container, COUNT(*) AS n FROM log_entries GROUP BY container")
                .fetch_all(self.pool())
                .await
                .map_err(map_sqlx)?;
        for row in container_rows {
            let container: String = row.try_get("container").map_err(map_sqlx)?;
            let n: i64 = row.try_get("n").map_err(map_sqlx)?;
            by_container.insert(container, n as u64);
        }

        Ok(LogStats {
            total: total as u64,
            oldest: oldest.as_deref().map(parse_ts).transpose()?,
            newest: newest.as_deref().map(parse_ts).transpose()?,
            by_level,
            by_container,
        })
    }

    /// Distinct containers with per-container retained counts.
    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let rows = sqlx::query(
            "SELECT container, COUNT(*) AS n FROM log_entries \
             GROUP BY container ORDER BY container",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx)?;

        let mut containers = Vec::with_capacity(rows.len());
        for row in rows {
            containers.push(ContainerSummary {
                name: row.try_get("container").map_err(map_sqlx)?,
                log_count: row.try_get::<i64, _>("n").map_err(map_sqlx)? as u64,
            });
        }
        Ok(containers)
    }
}

fn decode_row(row: &SqliteRow) -> Result<LogEntry> {
    let stream: String = row.try_get("stream").map_err(map_sqlx)?;
    let level: String = row.try_get("level").map_err(map_sqlx)?;
    let timestamp: String = row.try_get("timestamp").map_err(map_sqlx)?;

    Ok(LogEntry {
        id: row.try_get("id").map_err(map_sqlx)?,
        timestamp: parse_ts(&timestamp)?,
        container: row.try_get("container").map_err(map_sqlx)?,
        stream: stream
            .parse()
            .map_err(|_| EngineError::StoreFatal(format!("corrupt stream kind {stream:?}")))?,
        level: level
            .parse()
            .map_err(|_| EngineError::StoreFatal(format!("corrupt level {level:?}")))?,
        message: row.try_get("message").map_err(map_sqlx)?,
        raw: row.try_get("raw").map_err(map_sqlx)?,
    })
}

fn build_where(filter: &LogFilter) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(container) = &filter.container {
        conditions.push("container = ?".to_string());
        binds.push(container.clone());
    }
    if let Some(level) = filter.level {
        conditions.push("level = ?".to_string());
        binds.push(level.as_str().to_string());
    }
    if let Some(search) = &filter.search {
        conditions.push(
            "id IN (SELECT rowid FROM log_entries_fts WHERE log_entries_fts MATCH ?)".to_string(),
        );
        binds.push(search.clone());
    }
    if let Some(since) = filter.since {
        conditions.push("timestamp >= ?".to_string());
        binds.push(fmt_ts(since));
    }
    if let Some(until) = filter.until {
        conditions.push("timestamp <= ?".to_string());
        binds.push(fmt_ts(until));
    }

    if conditions.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), binds)
    }
}
