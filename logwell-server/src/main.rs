//! # Logwell Server
//!
//! Single-process container log engine: one ingestion worker tails the
//! docker JSON logs under the configured source root, and the axum surface
//! serves queries, statistics, and a live SSE tail over what it commits.
//!
//! The process exits `0` on a clean shutdown and non-zero when startup
//! fails or the store goes fatally wrong, so a supervisor can restart it.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use logwell_core::ingest::IngestScheduler;
use logwell_core::{Config, LogStore, TailBroker};
use logwell_server::{routes, AppState};

/// Command line arguments for the Logwell server
#[derive(Parser, Debug)]
#[command(name = "logwell-server")]
#[command(about = "Container log ingestion and query engine")]
struct Args {
    /// Bind address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("LOG_LEVEL")
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Arc::new(Config::from_env().context("loading configuration")?);
    if !config.log_sources.is_dir() {
        anyhow::bail!(
            "log sources directory {} does not exist",
            config.log_sources.display()
        );
    }

    let store = LogStore::open(&config.database_path)
        .await
        .with_context(|| format!("opening store at {}", config.database_path.display()))?;
    let broker = Arc::new(TailBroker::new(
        config.max_tail_subscribers,
        config.tail_queue_depth,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = IngestScheduler::new(store.clone(), Arc::clone(&broker), Arc::clone(&config))
        .await
        .context("initializing ingestion scheduler")?;
    let mut ingest_task = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    let state = AppState {
        store,
        broker,
        config: Arc::clone(&config),
        shutdown: shutdown_rx.clone(),
    };
    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, sources = %config.log_sources.display(), "logwell server listening");

    let mut server_shutdown = shutdown_rx.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    });

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
        result = &mut ingest_task => {
            // The scheduler only exits on its own for fatal store failures.
            let _ = shutdown_tx.send(true);
            let _ = server_task.await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => {
                    error!(error = %err, "ingestion terminated");
                    Err(err.into())
                }
                Err(join) => Err(join.into()),
            };
        }
    }

    server_task
        .await
        .context("server task panicked")?
        .context("server error")?;
    ingest_task
        .await
        .context("ingestion task panicked")?
        .context("ingestion error")?;

    info!("clean shutdown");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
