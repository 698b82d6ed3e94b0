//! Container discovery over the source filesystem.
//!
//! Docker's layout: each container `ID` owns `{root}/{ID}/{ID}-json.log`
//! plus a `config.v2.json` whose `Name` field carries the human name with a
//! leading slash.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::config::Config;

/// One discovered container and where its log lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSource {
    /// Full opaque identifier (the directory name).
    pub id: String,
    /// Short name from `config.v2.json`, falling back to a truncated id.
    pub name: String,
    pub log_path: PathBuf,
}

/// Scan the source root for containers, apply the allow-list, and return
/// them in stable lexical order by name.
pub async fn discover(config: &Config) -> io::Result<Vec<ContainerSource>> {
    let mut containers = Vec::new();
    let mut dir = tokio::fs::read_dir(&config.log_sources).await?;

    while let Some(dirent) = dir.next_entry().await? {
        let file_type = match dirent.file_type().await {
            Ok(file_type) => file_type,
            // Entry vanished between readdir and stat; pick it up next tick.
            Err(_) => continue,
        };
        if !file_type.is_dir() {
            continue;
        }
        let id = dirent.file_name().to_string_lossy().into_owned();
        let dir_path = dirent.path();
        let log_path = dir_path.join(format!("{id}-json.log"));
        if !tokio::fs::try_exists(&log_path).await.unwrap_or(false) {
            continue;
        }

        let name = read_container_name(&dir_path)
            .await
            .unwrap_or_else(|| short_id(&id));
        if !config.allows_container(&name) {
            debug!(container = %name, "skipping container outside allow-list");
            continue;
        }

        containers.push(ContainerSource { id, name, log_path });
    }

    containers.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    Ok(containers)
}

async fn read_container_name(dir: &Path) -> Option<String> {
    let raw = tokio::fs::read(dir.join("config.v2.json")).await.ok()?;
    let value: Value = serde_json::from_slice(&raw).ok()?;
    let name = value.get("Name")?.as_str()?;
    let name = name.strip_prefix('/').unwrap_or(name);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}
