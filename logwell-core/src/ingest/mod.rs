//! The ingestion pipeline: container discovery, positioned reads, record
//! decoding, multi-line reassembly, severity classification, and the
//! scheduler that drives all of it.

pub mod classify;
pub mod cursors;
pub mod decode;
pub mod discover;
pub mod reader;
pub mod reassemble;
pub mod scheduler;

pub use discover::ContainerSource;
pub use scheduler::{IngestScheduler, TickSummary};
