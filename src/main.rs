//! offline_sync daemon
//!
//! Hosts the offline engine behind a loopback HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use offline_sync::api::{create_router, spawn_warmup, AppState};
use offline_sync::clock::SystemClock;
use offline_sync::config::Config;
use offline_sync::diagnostics::LogBuffer;
use offline_sync::storage::Database;
use offline_sync::tasks::{
    spawn_maintenance_task, spawn_probe_task, spawn_reconnect_listener, spawn_sync_ticker,
};
use offline_sync::transport::{HttpTransport, Transport};
use offline_sync::warmup::Manifest;

/// Main entry point for the offline sync daemon.
///
/// # Startup Sequence
/// 1. Initialize tracing (stdout plus the diagnostics ring buffer)
/// 2. Load configuration from environment variables
/// 3. Open the database and recover writes orphaned by a crash
/// 4. Start background tasks (probe, reconnect listener, ticker, maintenance, status)
/// 5. Optionally warm the cache from the configured manifest
/// 6. Serve the local API until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    let logs = LogBuffer::new(config.log_buffer_capacity);

    // Defaults to "info" for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offline_sync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(logs.layer())
        .init();

    info!(
        db = %config.db_path.display(),
        remote = %config.remote_base_url,
        port = config.server_port,
        "starting offline sync daemon"
    );

    let db = Database::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(&config.remote_base_url, &config.probe_path, config.request_timeout())
            .context("building http transport")?,
    );

    let mut state = AppState::new(db, transport.clone(), SystemClock::shared(), &config, logs);
    if let Some(path) = &config.warmup_manifest {
        let manifest = Manifest::load(path).with_context(|| format!("loading {}", path.display()))?;
        info!(entries = manifest.len(), "warm-up manifest loaded");
        state = state.with_manifest(manifest);
    }

    let recovered = state.queue.recover_orphaned()?;
    if recovered > 0 {
        warn!(recovered, "writes interrupted by the previous run were re-queued");
    }

    let mut tasks = vec![
        spawn_reconnect_listener(state.engine.clone()),
        spawn_probe_task(
            transport,
            state.monitor.clone(),
            std::time::Duration::from_secs(config.probe_interval_secs.max(1)),
            config.request_timeout(),
        ),
        spawn_sync_ticker(
            state.engine.clone(),
            std::time::Duration::from_secs(config.sync_interval_secs.max(1)),
        ),
        spawn_maintenance_task(
            state.cache.clone(),
            state.queue.clone(),
            std::time::Duration::from_secs(config.sweep_interval_secs.max(1)),
            config.completed_retention(),
        ),
        state
            .reporter
            .spawn_publisher(std::time::Duration::from_secs(config.status_interval_secs.max(1))),
    ];
    info!("background tasks started");

    if let Some(manifest) = state.manifest.clone() {
        tasks.push(spawn_warmup(state.warmer.clone(), manifest));
    }

    let app = create_router(state);

    // Loopback only; the API is for the local presentation layer
    let addr = SocketAddr::from(([127, 0, 0, 1], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(tasks))
        .await
        .context("serving local api")?;

    info!("shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts the
/// background tasks.
async fn shutdown_signal(tasks: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
    }

    for task in &tasks {
        task.abort();
    }
    warn!(count = tasks.len(), "background tasks aborted");
}
