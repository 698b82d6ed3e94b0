//! HTTP surface for the Logwell engine.
//!
//! The binary in `main.rs` wires configuration, the store, the tail broker,
//! and the ingestion scheduler together; everything reusable by integration
//! tests lives here.

/// Error types and handling
pub mod errors;

/// Request handlers
pub mod handlers;

/// Route organization
pub mod routes;

use std::sync::Arc;

use tokio::sync::watch;

use logwell_core::{Config, LogStore, TailBroker};

// Server application state
#[derive(Clone)]
pub struct AppState {
    pub store: LogStore,
    pub broker: Arc<TailBroker>,
    pub config: Arc<Config>,
    /// Flipped once at shutdown; tail streams watch it to close cleanly.
    pub shutdown: watch::Receiver<bool>,
}
