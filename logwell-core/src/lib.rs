//! Logwell engine: container discovery, log-file tailing, multi-line
//! reassembly, severity classification, the embedded SQLite store, and the
//! live tail broker.
//!
//! The ingestion side is single-writer: one [`ingest::IngestScheduler`] owns
//! every write to the store and every publish into the [`tail::TailBroker`].
//! Queries run concurrently against the same store.

pub mod config;
pub mod error;
pub mod ingest;
pub mod store;
pub mod tail;

pub use config::Config;
pub use error::{EngineError, Result};
pub use store::{LogStore, NewEntry};
pub use tail::{TailBroker, TailEvent, TailSubscription};
