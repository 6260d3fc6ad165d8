//! Knowledge-exchange service entry point: loads config, opens storage,
//! serves the HTTP surface, and runs the background sweeps the API
//! doesn't drive itself — job-timeout reclamation, subscription polling,
//! and retroactive-propagation draining.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use kx_core::config::KxConfig;
use kx_http::AppState;
use kx_pipeline::Orchestrator;
use kx_queue::JobQueue;
use kx_storage::{queries::notebooks, StorageEngine};
use kx_subscription::Poller;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "kx-server")]
#[command(about = "Knowledge-exchange service: notebooks, claims, and the review/subscription pipeline")]
struct Cli {
    /// Path to a TOML config file. Missing fields fall back to documented defaults.
    #[arg(long, env = "KX_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind the HTTP server on.
    #[arg(long, env = "KX_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_toml = match &cli.config {
        Some(path) => std::fs::read_to_string(path)?,
        None => String::new(),
    };
    let config = KxConfig::from_toml(&config_toml)?;

    let engine = StorageEngine::open(&config.storage.connection_string)?;
    let state = AppState::new(engine.clone(), config);

    spawn_reclaim_loop(engine.clone());
    spawn_poll_loop(engine.clone());
    spawn_retroactive_loop(state.orchestrator.clone());

    let app = kx_http::router(state);
    let listener = tokio::net::TcpListener::bind(&cli.listen_addr).await?;
    info!(addr = %cli.listen_addr, "kx-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Every 30 seconds, reclaim jobs whose claim outlived their timeout so a
/// crashed or stalled worker doesn't strand a job in `in_progress` forever.
fn spawn_reclaim_loop(engine: StorageEngine) {
    tokio::spawn(async move {
        let queue = JobQueue::new(engine.clone());
        loop {
            tokio::time::sleep(Duration::from_secs(30)).await;
            let notebooks = match engine.writer().with_conn(|conn| notebooks::list_all(conn)).await {
                Ok(n) => n,
                Err(e) => {
                    error!(error = %e, "failed to list notebooks for reclaim sweep");
                    continue;
                }
            };
            for notebook in notebooks {
                match queue.reclaim_timed_out(notebook.id).await {
                    Ok(0) => {}
                    Ok(n) => info!(notebook_id = %notebook.id, reclaimed = n, "reclaimed timed-out jobs"),
                    Err(e) => warn!(notebook_id = %notebook.id, error = %e, "reclaim sweep failed"),
                }
            }
        }
    });
}

/// Every 10 seconds, sync whichever subscriptions are due per their own
/// poll interval (§4.G) — `Poller::sync_due` decides who's due, not this loop.
fn spawn_poll_loop(engine: StorageEngine) {
    tokio::spawn(async move {
        let poller = Poller::new(engine.clone(), JobQueue::new(engine));
        loop {
            tokio::time::sleep(Duration::from_secs(10)).await;
            match poller.sync_due().await {
                Ok(reports) => {
                    for (subscription_id, result) in reports {
                        if let Err(e) = result {
                            warn!(%subscription_id, error = %e, "subscription sync failed");
                        }
                    }
                }
                Err(e) => error!(error = %e, "subscription poll sweep failed"),
            }
        }
    });
}

/// Every 5 seconds, drain entries queued for retroactive re-comparison —
/// new subscriptions and newly-approved reviews both push onto this queue
/// rather than triggering synchronous re-comparison inline.
fn spawn_retroactive_loop(orchestrator: std::sync::Arc<Orchestrator>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(5)).await;
            match orchestrator.drain_retroactive().await {
                Ok(0) => {}
                Ok(n) => info!(drained = n, "retroactive queue drained"),
                Err(e) => error!(error = %e, "retroactive drain failed"),
            }
        }
    });
}
