//! The long-lived ingestion loop.
//!
//! One scheduler task owns every write: it discovers containers, drives
//! reader → decoder → reassembler per container, commits each container's
//! batch atomically with its cursor, publishes committed rows to the tail
//! broker, and enforces the ring-buffer retention cap.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::ingest::classify::classify;
use crate::ingest::cursors::CursorMap;
use crate::ingest::decode::decode;
use crate::ingest::discover::{discover, ContainerSource};
use crate::ingest::reader::{self, ReadBatch, ReadOutcome};
use crate::ingest::reassemble::{Partial, Reassembler};
use crate::store::{LogStore, NewEntry};
use crate::tail::TailBroker;

/// What one tick accomplished, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub containers: usize,
    pub committed: usize,
    pub trimmed: u64,
}

/// Single-writer ingestion worker.
pub struct IngestScheduler {
    store: LogStore,
    broker: Arc<TailBroker>,
    config: Arc<Config>,
    cursors: CursorMap,
    assemblers: HashMap<String, Reassembler>,
    idle_ticks: HashMap<String, u32>,
    /// Short names by full container id, refreshed every discovery pass.
    names: HashMap<String, String>,
}

impl std::fmt::Debug for IngestScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestScheduler")
            .field("known_containers", &self.names.len())
            .finish()
    }
}

impl IngestScheduler {
    /// Build a scheduler with cursors warmed from the store.
    pub async fn new(
        store: LogStore,
        broker: Arc<TailBroker>,
        config: Arc<Config>,
    ) -> Result<Self> {
        let cursors = CursorMap::from_loaded(store.load_cursors().await?);
        Ok(Self {
            store,
            broker,
            config,
            cursors,
            assemblers: HashMap::new(),
            idle_ticks: HashMap::new(),
            names: HashMap::new(),
        })
    }

    /// Poll until shutdown. Returns an error only for fatal store failures,
    /// which the binary surfaces as a non-zero exit for the supervisor.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            sources = %self.config.log_sources.display(),
            interval = ?self.config.poll_interval,
            "ingestion scheduler started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(summary) if summary.committed > 0 || summary.trimmed > 0 => {
                            debug!(
                                containers = summary.containers,
                                committed = summary.committed,
                                trimmed = summary.trimmed,
                                "ingest tick"
                            );
                        }
                        Ok(_) => {}
                        Err(err) if err.is_fatal() => {
                            error!(error = %err, "fatal store failure, stopping ingestion");
                            return Err(err);
                        }
                        Err(err) => warn!(error = %err, "ingest tick failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        if let Err(err) = self.flush_all_partials().await {
            warn!(error = %err, "failed to flush held partials on shutdown");
        }
        info!("ingestion scheduler stopped");
        Ok(())
    }

    /// One full pass over every discovered container.
    pub async fn tick(&mut self) -> Result<TickSummary> {
        let sources = match discover(&self.config).await {
            Ok(sources) => sources,
            Err(err) => {
                warn!(error = %err, "container discovery failed, will retry next tick");
                return Ok(TickSummary::default());
            }
        };

        for source in &sources {
            self.names.insert(source.id.clone(), source.name.clone());
        }

        let mut summary = TickSummary {
            containers: sources.len(),
            ..Default::default()
        };

        for source in &sources {
            match self.process_container(source).await {
                Ok(committed) => summary.committed += committed,
                Err(EngineError::StoreBusy) => {
                    debug!(container = %source.name, "store busy, batch retried next tick");
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(container = %source.name, error = %err, "transient ingest error");
                }
            }
        }

        // Pending-reassembly state dies with its container; cursors stay
        // (the store still holds them, and a discovery blip must not trigger
        // a divergent reseed).
        let known: HashSet<&str> = sources.iter().map(|source| source.id.as_str()).collect();
        self.assemblers.retain(|id, _| known.contains(id.as_str()));
        self.idle_ticks.retain(|id, _| known.contains(id.as_str()));

        summary.trimmed = self.enforce_retention().await?;
        Ok(summary)
    }

    async fn process_container(&mut self, source: &ContainerSource) -> Result<usize> {
        let (file_size, inode) = match reader::stat(&source.log_path).await {
            Ok(stat) => stat,
            Err(err) => {
                debug!(container = %source.name, error = %err, "stat failed, skipping");
                return Ok(0);
            }
        };

        let mut cursor = self.cursors.get_or_seed(
            &source.id,
            &source.log_path,
            file_size,
            inode,
            self.config.tail_buffer,
        );
        let unchanged = cursor.clone();
        cursor.file_path = source.log_path.clone();

        let mut assembler = self
            .assemblers
            .get(&source.id)
            .cloned()
            .unwrap_or_default();
        let mut pending: Vec<NewEntry> = Vec::new();

        let batch = match reader::read_from(&source.log_path, cursor.position, cursor.inode).await
        {
            Ok(ReadOutcome::Data(batch)) => batch,
            Ok(ReadOutcome::Rotated { inode }) => {
                info!(container = %source.name, inode, "log file rotated, cursor reset");
                // Everything held from the old inode flushes ahead of any
                // byte from the new one.
                if let Some(partial) = assembler.flush() {
                    pending.push(finish_entry(&source.name, partial));
                }
                cursor.reset_for_rotation(inode);
                match reader::read_from(&source.log_path, 0, inode).await {
                    Ok(ReadOutcome::Data(batch)) => batch,
                    // Rotated twice within one tick; settle next poll.
                    Ok(ReadOutcome::Rotated { .. }) | Err(_) => ReadBatch::default(),
                }
            }
            Err(err) => {
                debug!(container = %source.name, error = %err, "read failed, skipping");
                return Ok(0);
            }
        };

        let had_lines = !batch.lines.is_empty();
        let mut consumed_end = cursor.position;
        for (text, end_offset) in batch.lines {
            if pending.len() >= self.config.batch_size {
                break;
            }
            let decoded = decode(&text, Utc::now());
            if let Some(partial) = assembler.push(decoded) {
                pending.push(finish_entry(&source.name, partial));
            }
            consumed_end = end_offset;
        }
        cursor.position = consumed_end;

        if had_lines {
            self.idle_ticks.insert(source.id.clone(), 0);
        } else {
            let idle = self.idle_ticks.entry(source.id.clone()).or_insert(0);
            *idle += 1;
            // A partial held across too many quiet polls flushes so a
            // container that stopped writing mid-trace still surfaces.
            if assembler.is_holding() && *idle >= self.config.stale_after_ticks {
                if let Some(partial) = assembler.flush() {
                    debug!(container = %source.name, "flushing stale partial");
                    pending.push(finish_entry(&source.name, partial));
                }
                *idle = 0;
            }
        }

        if pending.is_empty() && cursor == unchanged {
            self.assemblers.insert(source.id.clone(), assembler);
            return Ok(0);
        }

        let committed = self.store.insert_batch(&pending, &cursor).await?;
        self.cursors.commit(cursor);
        self.assemblers.insert(source.id.clone(), assembler);

        let count = committed.len();
        for entry in committed {
            self.broker.publish(&Arc::new(entry));
        }
        Ok(count)
    }

    async fn enforce_retention(&self) -> Result<u64> {
        let total = match self.store.count().await {
            Ok(total) => total,
            Err(EngineError::StoreBusy) => return Ok(0),
            Err(err) => return Err(err),
        };
        if total <= self.config.max_entries {
            return Ok(0);
        }
        match self.store.trim_to(self.config.max_entries).await {
            Ok(trimmed) => {
                debug!(trimmed, cap = self.config.max_entries, "retention trim");
                Ok(trimmed)
            }
            Err(EngineError::StoreBusy) => Ok(0),
            Err(err) => Err(err),
        }
    }

    /// Shutdown path: everything still buffered becomes a committed entry.
    async fn flush_all_partials(&mut self) -> Result<()> {
        let ids: Vec<String> = self.assemblers.keys().cloned().collect();
        for id in ids {
            let Some(assembler) = self.assemblers.get_mut(&id) else {
                continue;
            };
            let Some(partial) = assembler.flush() else {
                continue;
            };
            let Some(cursor) = self.cursors.get(&id).cloned() else {
                continue;
            };
            let name = self.names.get(&id).cloned().unwrap_or_else(|| id.clone());
            let entry = finish_entry(&name, partial);
            match self.store.insert_batch(&[entry], &cursor).await {
                Ok(committed) => {
                    for entry in committed {
                        self.broker.publish(&Arc::new(entry));
                    }
                }
                Err(EngineError::StoreBusy) => {
                    warn!(container = %name, "store busy during shutdown flush, partial dropped");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

/// Classify and label a completed partial for insertion.
fn finish_entry(container: &str, partial: Partial) -> NewEntry {
    let level = classify(partial.stream, &partial.message);
    NewEntry {
        timestamp: partial.timestamp,
        container: container.to_string(),
        stream: partial.stream,
        level,
        message: partial.message,
        raw: partial.raw,
    }
}
