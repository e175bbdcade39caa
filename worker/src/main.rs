//! Orchestrator worker
//!
//! The worker is the execution agent: it accepts task events from the
//! manager over HTTP, drains them through a FIFO dispatcher against the
//! local container runtime, and reports task state and host metrics back.
// This is the main entry point for the worker binary. It is responsible for:
// - Initializing logging and configuration.
// - Wiring the core `Worker` to the container runtime.
// - Spawning the dispatcher and stats loops.
// - Serving the REST API and handling graceful shutdown.

// Use jemalloc as the global allocator for better performance
#[cfg(not(target_os = "windows"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

mod api;
mod runtime;
mod stats;
mod worker;

use runtime::DockerCli;
use shared::config::WorkerConfig;
use stats::StatsCollector;
use worker::Worker;

/// Maximum time to wait for a loop to wind down during shutdown
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Command-line arguments for the worker
#[derive(Parser, Debug)]
#[command(name = "worker")]
#[command(about = "Orchestrator worker that runs and supervises containers", long_about = None)]
struct CliArgs {
    /// Path to the worker configuration file (worker.toml)
    #[arg(value_name = "CONFIG_FILE")]
    config_file: PathBuf,

    /// Override the listen address from config file
    #[arg(long = "listen-address", value_name = "ADDRESS")]
    listen_address: Option<String>,

    /// Override the worker name from config file
    #[arg(long = "name", value_name = "NAME")]
    name: Option<String>,
}

/// Spawns the dispatcher loop: one queued task per tick.
///
/// Failed results are logged and the loop continues; the manager's health
/// loop owns any retry.
fn spawn_dispatcher(
    worker: Arc<Worker>,
    interval_seconds: u64,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match worker.run_next_task().await {
                        Some(Ok(())) => {}
                        Some(Err(e)) => error!(error = %e, "Task dispatch failed"),
                        None => debug!("No tasks queued"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Dispatcher received shutdown signal");
                    break;
                }
            }
        }
    })
}

/// Spawns the host metrics loop: collect a snapshot every tick and publish
/// it on the worker for the stats endpoint.
fn spawn_stats_collector(
    worker: Arc<Worker>,
    interval_seconds: u64,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut collector = StatsCollector::new(worker.name().to_string());
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let task_count = worker.task_count().await;
                    let snapshot = collector.collect(task_count);
                    worker.update_stats(snapshot).await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Stats collector received shutdown signal");
                    break;
                }
            }
        }
    })
}

/// Broadcast shutdown and wait for the background loops to finish.
async fn shutdown(shutdown_tx: &broadcast::Sender<()>, handles: Vec<(&str, JoinHandle<()>)>) {
    let _ = shutdown_tx.send(());
    for (name, handle) in handles {
        match tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, handle).await {
            Ok(Ok(())) => info!("{} loop completed", name),
            Ok(Err(e)) => error!("{} loop panicked: {}", name, e),
            Err(_) => error!("{} loop shutdown timeout reached, aborting", name),
        }
    }
}

/// Sets up signal handlers for graceful shutdown.
/// Returns a future that completes when a shutdown signal is received.
async fn setup_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let sigterm = signal(SignalKind::terminate());
        let sigint = signal(SignalKind::interrupt());

        match (sigterm, sigint) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to register signal handlers: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to wait for Ctrl+C: {}", e);
                } else {
                    info!("Received Ctrl+C");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to receive Ctrl+C signal: {}", e);
        } else {
            info!("Received Ctrl+C");
        }
    }
}

/// Worker entry point
///
/// Initializes logging, loads configuration, wires up the worker and runs
/// until a shutdown signal is received.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    let file_appender = tracing_appender::rolling::daily("./logs", "worker.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("worker=info,shared=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(non_blocking)
        .init();

    let cli_args = CliArgs::parse();
    info!("Orchestrator worker starting up");
    info!("Configuration file: {}", cli_args.config_file.display());

    let mut config = WorkerConfig::load(&cli_args.config_file)
        .context("Failed to load worker configuration")?;
    if let Some(listen_address) = cli_args.listen_address {
        config.listen_address = listen_address;
    }
    if let Some(name) = cli_args.name {
        config.name = name;
    }
    config.validate().context("Invalid worker configuration")?;

    let listen_address = config.socket_address()?;
    info!(
        worker = %config.name,
        listen_address = %listen_address,
        dispatch_interval = config.dispatch_interval_seconds,
        stats_interval = config.stats_interval_seconds,
        "Worker configuration loaded"
    );

    let runtime = Arc::new(DockerCli::new());
    let worker = Arc::new(Worker::new(config.name.clone(), runtime));

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = broadcast::channel(1);

    let dispatcher_handle = spawn_dispatcher(
        Arc::clone(&worker),
        config.dispatch_interval_seconds,
        shutdown_tx.subscribe(),
    );
    let stats_handle = spawn_stats_collector(
        Arc::clone(&worker),
        config.stats_interval_seconds,
        shutdown_tx.subscribe(),
    );

    let app = api::create_router(api::AppState {
        worker: Arc::clone(&worker),
    });

    let listener = tokio::net::TcpListener::bind(listen_address)
        .await
        .with_context(|| format!("Failed to bind TCP listener to {}", listen_address))?;
    info!("Starting worker API on {}", listen_address);

    let shutdown_future = {
        let mut rx = shutdown_tx.subscribe();
        async move {
            let _ = rx.recv().await;
            info!("HTTP server received shutdown signal");
        }
    };

    tokio::select! {
        result = axum::serve(listener, app).with_graceful_shutdown(shutdown_future) => {
            result.map_err(|e| anyhow::anyhow!("Worker API server error: {}", e))?;
        }
        _ = setup_shutdown_signal() => {
            info!("Shutdown signal received, initiating graceful shutdown");
        }
    }

    shutdown(
        &shutdown_tx,
        vec![
            ("dispatcher", dispatcher_handle),
            ("stats", stats_handle),
        ],
    )
    .await;
    info!("Worker shutdown complete");
    Ok(())
}
