//! Orchestrator manager
//!
//! The manager is the control plane: it accepts task submissions over HTTP,
//! places them on workers round-robin, periodically reconciles its view
//! against what the workers report, and restarts unhealthy tasks up to a
//! bounded count.
// This is the main entry point for the manager binary. It is responsible for:
// - Initializing logging and configuration.
// - Setting up the core `Manager` struct.
// - Spawning the dispatch, reconcile and health-check loops.
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
use tracing::{error, info};

mod api;
mod manager;
mod scheduler;

use manager::Manager;
use shared::config::ManagerConfig;

/// Maximum time to wait for a loop to wind down during shutdown
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Command-line arguments for the manager
#[derive(Parser, Debug)]
#[command(name = "manager")]
#[command(about = "Orchestrator control plane that dispatches tasks to workers", long_about = None)]
struct CliArgs {
    /// Path to the manager configuration file (manager.toml)
    #[arg(value_name = "CONFIG_FILE")]
    config_file: PathBuf,

    /// Override the listen address from config file
    #[arg(long = "listen-address", value_name = "ADDRESS")]
    listen_address: Option<String>,

    /// Override the worker list from config file (comma-separated host:port)
    #[arg(long = "workers", value_name = "ENDPOINTS", value_delimiter = ',')]
    workers: Option<Vec<String>>,
}

/// Spawn one periodic control loop driving a manager pass on each tick.
fn spawn_control_loop<F, Fut>(
    name: &'static str,
    interval_seconds: u64,
    mut shutdown_rx: broadcast::Receiver<()>,
    mut pass: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
        loop {
            tokio::select! {
                _ = interval.tick() => pass().await,
                _ = shutdown_rx.recv() => {
                    info!("{} loop received shutdown signal", name);
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

/// Manager entry point
///
/// Initializes logging, loads configuration, spawns the control loops and
/// runs until a shutdown signal is received.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    let file_appender = tracing_appender::rolling::daily("./logs", "manager.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("manager=info,shared=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(non_blocking)
        .init();

    let cli_args = CliArgs::parse();
    info!("Orchestrator manager starting up");
    info!("Configuration file: {}", cli_args.config_file.display());

    let mut config = ManagerConfig::load(&cli_args.config_file)
        .context("Failed to load manager configuration")?;
    if let Some(listen_address) = cli_args.listen_address {
        config.listen_address = listen_address;
    }
    if let Some(workers) = cli_args.workers {
        config.workers = workers;
    }
    config.validate().context("Invalid manager configuration")?;

    let listen_address = config.socket_address()?;
    info!(
        listen_address = %listen_address,
        workers = ?config.workers,
        dispatch_interval = config.dispatch_interval_seconds,
        reconcile_interval = config.reconcile_interval_seconds,
        health_check_interval = config.health_check_interval_seconds,
        "Manager configuration loaded"
    );

    let manager = Arc::new(Manager::new(config.workers.clone()));

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = broadcast::channel(1);

    let dispatch_handle = {
        let manager = Arc::clone(&manager);
        spawn_control_loop(
            "dispatch",
            config.dispatch_interval_seconds,
            shutdown_tx.subscribe(),
            move || {
                let manager = Arc::clone(&manager);
                async move { manager.dispatch_next().await }
            },
        )
    };
    let reconcile_handle = {
        let manager = Arc::clone(&manager);
        spawn_control_loop(
            "reconcile",
            config.reconcile_interval_seconds,
            shutdown_tx.subscribe(),
            move || {
                let manager = Arc::clone(&manager);
                async move { manager.reconcile().await }
            },
        )
    };
    let health_handle = {
        let manager = Arc::clone(&manager);
        spawn_control_loop(
            "health-check",
            config.health_check_interval_seconds,
            shutdown_tx.subscribe(),
            move || {
                let manager = Arc::clone(&manager);
                async move { manager.health_checks().await }
            },
        )
    };

    let app = api::create_router(api::AppState {
        manager: Arc::clone(&manager),
    });

    let listener = tokio::net::TcpListener::bind(listen_address)
        .await
        .with_context(|| format!("Failed to bind TCP listener to {}", listen_address))?;
    info!("Starting manager API on {}", listen_address);

    let shutdown_future = {
        let mut rx = shutdown_tx.subscribe();
        async move {
            let _ = rx.recv().await;
            info!("HTTP server received shutdown signal");
        }
    };

    tokio::select! {
        result = axum::serve(listener, app).with_graceful_shutdown(shutdown_future) => {
            result.map_err(|e| anyhow::anyhow!("Manager API server error: {}", e))?;
        }
        _ = setup_shutdown_signal() => {
            info!("Shutdown signal received, initiating graceful shutdown");
        }
    }

    shutdown(
        &shutdown_tx,
        vec![
            ("dispatch", dispatch_handle),
            ("reconcile", reconcile_handle),
            ("health-check", health_handle),
        ],
    )
    .await;
    info!("Manager shutdown complete");
    Ok(())
}
