use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use logwell_model::{ContainerSummary, LogEntry, LogFilter, LogStats, Pagination};

use crate::errors::{AppError, AppResult};
use crate::handlers::with_deadline;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub container: Option<String>,
    pub level: Option<String>,
    pub search: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Serialize)]
pub struct ContainersResponse {
    pub containers: Vec<ContainerSummary>,
}

/// Parse the `level` query parameter, turning unknown names into a 400
/// rather than an empty result set.
pub(crate) fn parse_level(level: Option<&str>) -> AppResult<Option<logwell_model::LogLevel>> {
    level
        .map(|raw| {
            raw.parse().map_err(|_| {
                AppError::bad_request("invalid_level", format!("unknown log level {raw:?}"))
            })
        })
        .transpose()
}

pub async fn list_logs(
    State(state): State<AppState>,
    Query(params): Query<LogsQuery>,
) -> AppResult<Json<LogsResponse>> {
    let filter = LogFilter {
        container: params.container,
        level: parse_level(params.level.as_deref())?,
        search: params.search,
        since: params.since,
        until: params.until,
    };
    let page = Pagination::clamped(params.limit, params.offset);

    let (logs, total) =
        with_deadline(state.config.query_timeout, state.store.list(&filter, page)).await?;

    Ok(Json(LogsResponse {
        logs,
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}

pub async fn list_containers(
    State(state): State<AppState>,
) -> AppResult<Json<ContainersResponse>> {
    let containers =
        with_deadline(state.config.query_timeout, state.store.list_containers()).await?;
    Ok(Json(ContainersResponse { containers }))
}

pub async fn stats(State(state): State<AppState>) -> AppResult<Json<LogStats>> {
    let stats = with_deadline(state.config.query_timeout, state.store.stats()).await?;
    Ok(Json(stats))
}
