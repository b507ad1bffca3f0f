use anyhow::Context;
use beacon_relay::{
    app::{build_router, shutdown_relay},
    auth::revocation::DEFAULT_PRUNE_INTERVAL,
    config::RelayConfig,
    monitor::spawn_eviction_worker,
    state::RelayState,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    config.validate().context("invalid relay configuration")?;
    if config.is_dev_jwt_secret() {
        warn!("using the development JWT secret; set BEACON_JWT_SECRET in production");
    }

    let listen_addr = config.listen_addr;
    let state = RelayState::new(config)?;

    let (idle_rx, sweep) = state.presence.start_sweep(state.sweep_config());
    let eviction_worker =
        spawn_eviction_worker(idle_rx, Arc::clone(&state.sessions), state.presence.clone());
    let revocation_pruner = state.revocations().start_pruning(DEFAULT_PRUNE_INTERVAL);

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {listen_addr}"))?;

    info!(
        listen_addr = %listen_addr,
        offline_timeout_secs = state.config.offline_timeout.as_secs(),
        sweep_interval_secs = state.config.sweep_interval.as_secs(),
        "starting relay server"
    );

    let shutdown_state = state.clone();
    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_relay(&shutdown_state, sweep).await;
        })
        .await
        .context("relay server exited unexpectedly");

    eviction_worker.abort();
    revocation_pruner.abort();
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(?error, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(?error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
