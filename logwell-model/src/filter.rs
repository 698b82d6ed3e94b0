use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::LogLevel;

/// Default number of rows returned by a list query.
pub const DEFAULT_PAGE_LIMIT: u32 = 100;
/// Hard ceiling on rows per page.
pub const MAX_PAGE_LIMIT: u32 = 500;

/// Filter applied to list queries and (container/level only) to tail
/// subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Short container name.
    pub container: Option<String>,
    pub level: Option<LogLevel>,
    /// Full-text MATCH expression over `message`: `term`, `"phrase"`,
    /// `A OR B`, `A NOT B`.
    pub search: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl LogFilter {
    /// True when `entry` passes the container/level dimensions of this
    /// filter. Tail subscriptions evaluate this before enqueueing.
    pub fn matches_stream(&self, container: &str, level: LogLevel) -> bool {
        if let Some(want) = &self.container {
            if want != container {
                return false;
            }
        }
        if let Some(want) = self.level {
            if want != level {
                return false;
            }
        }
        true
    }
}

/// Validated limit/offset pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Clamp a caller-supplied limit into `[1, MAX_PAGE_LIMIT]`.
    pub fn clamped(limit: Option<u32>, offset: Option<u32>) -> Self {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        Self {
            limit,
            offset: offset.unwrap_or(0),
        }
    }
}
