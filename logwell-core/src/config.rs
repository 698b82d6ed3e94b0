use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Engine configuration, resolved once at startup from the environment.
///
/// Every knob has a default so a bare `logwell-server` run against a local
/// Docker root works without any environment at all.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store file location (`DATABASE_PATH`).
    pub database_path: PathBuf,
    /// Root directory scanned for container subdirectories (`LOG_SOURCES`).
    pub log_sources: PathBuf,
    /// Allow-list of short container names (`CONTAINERS`, comma-separated).
    /// Empty means every discovered container is ingested.
    pub containers: Vec<String>,
    /// Ring-buffer cap on total stored entries (`MAX_ENTRIES`).
    pub max_entries: u64,
    /// Seconds between scheduler ticks (`POLL_INTERVAL`).
    pub poll_interval: Duration,
    /// Bytes to tail on first sight of a container (`TAIL_BUFFER`).
    pub tail_buffer: u64,
    /// Held partials flush after this many idle ticks.
    pub stale_after_ticks: u32,
    /// Entries per store transaction.
    pub batch_size: usize,
    /// Soft deadline for read queries.
    pub query_timeout: Duration,
    /// Live tail limits.
    pub max_tail_subscribers: usize,
    pub tail_queue_depth: usize,
    pub tail_session_limit: Duration,
    pub tail_heartbeat: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("logwell.db"),
            log_sources: PathBuf::from("/var/lib/docker/containers"),
            containers: Vec::new(),
            max_entries: 100_000,
            poll_interval: Duration::from_secs(2),
            tail_buffer: 64 * 1024,
            stale_after_ticks: 2,
            batch_size: 1000,
            query_timeout: Duration::from_secs(10),
            max_tail_subscribers: 5,
            tail_queue_depth: 256,
            tail_session_limit: Duration::from_secs(30 * 60),
            tail_heartbeat: Duration::from_secs(15),
        }
    }
}

impl Config {
    /// Load configuration from the process environment on top of defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = non_empty_var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(path) = non_empty_var("LOG_SOURCES") {
            config.log_sources = PathBuf::from(path);
        }
        if let Some(list) = non_empty_var("CONTAINERS") {
            config.containers = list
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();
        }
        if let Some(max) = non_empty_var("MAX_ENTRIES") {
            config.max_entries = parse_var("MAX_ENTRIES", &max)?;
        }
        if let Some(secs) = non_empty_var("POLL_INTERVAL") {
            let secs: u64 = parse_var("POLL_INTERVAL", &secs)?;
            if secs == 0 {
                return Err(EngineError::Config(
                    "POLL_INTERVAL must be at least 1 second".to_string(),
                ));
            }
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(bytes) = non_empty_var("TAIL_BUFFER") {
            config.tail_buffer = parse_var("TAIL_BUFFER", &bytes)?;
        }

        Ok(config)
    }

    /// True when `name` passes the configured allow-list.
    pub fn allows_container(&self, name: &str) -> bool {
        self.containers.is_empty() || self.containers.iter().any(|allowed| allowed == name)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        EngineError::Config(format!("invalid value for {name}: {value:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.max_entries, 100_000);
        assert!(config.allows_container("anything"));
    }

    #[test]
    fn allow_list_filters_by_short_name() {
        let config = Config {
            containers: vec!["web".to_string(), "db".to_string()],
            ..Default::default()
        };
        assert!(config.allows_container("web"));
        assert!(!config.allows_container("cache"));
    }
}
