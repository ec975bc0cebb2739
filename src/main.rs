use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tutorslot::api::{self, AppState};
use tutorslot::config::Config;
use tutorslot::engine::{Engine, WalStore};
use tutorslot::gateway::SandboxGateway;
use tutorslot::notify::NotifyHub;
use tutorslot::reaper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    tutorslot::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(WalStore::open(&config.wal_path())?);
    let notify = Arc::new(NotifyHub::new());
    let gateway = Arc::new(SandboxGateway::new());
    let hold_ttl_ms = i64::try_from(config.hold_ttl.as_millis())?;
    let engine = Arc::new(Engine::new(store.clone(), gateway, notify).with_hold_ttl(hold_ttl_ms));

    tokio::spawn(reaper::run_sweeper(engine.clone(), config.sweep_interval));
    tokio::spawn(reaper::run_compactor(store.clone(), config.compact_threshold));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("tutorslot listening on {addr}");
    info!("  journal: {}", config.wal_path().display());
    info!("  reservations: {}", store.reservation_count());
    info!("  hold ttl: {}s", config.hold_ttl.as_secs());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let app = api::router(AppState { engine });
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("tutorslot stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM. In-flight requests drain before `serve` returns.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("cannot listen for SIGTERM: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining requests");
}
