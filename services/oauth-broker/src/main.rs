//! OAuth broker
//!
//! Single-binary service that:
//! 1. Redirects browsers to Webex or Snowflake for authorization
//! 2. Tracks Snowflake's PKCE verifiers between login and callback
//! 3. Routes the shared `/callback` to the right provider by its state
//! 4. Exchanges the authorization code and relays the tokens as JSON

mod callback;
mod config;
mod error;
mod metrics;
mod routes;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use oauth_flow::{MemoryVerifierStore, VerifierStore, spawn_sweeper};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::routes::{AppState, build_router};

/// How long in-flight requests may take to finish after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting oauth-broker");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    let args: Vec<String> = std::env::args().collect();
    let config_path = Config::resolve_path(config_path_arg(&args));
    match &config_path {
        Some(path) => info!(path = %path.display(), "loading configuration"),
        None => info!("no config file given, reading configuration from environment"),
    }

    let config = Config::load(config_path.as_deref()).context("failed to load configuration")?;

    info!(
        listen_addr = %config.listen_addr(),
        redirect_uri = %config.redirect_uri,
        exchange_timeout_secs = config.server.exchange_timeout_secs,
        pending_ttl_secs = config.server.pending_ttl_secs,
        "configuration loaded"
    );

    let store: Arc<dyn VerifierStore> = Arc::new(MemoryVerifierStore::new(config.pending_ttl()));
    let sweeper = spawn_sweeper(store.clone(), config.sweep_interval());

    let http_client = reqwest::Client::builder()
        .connect_timeout(config.exchange_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let listen_addr = config.listen_addr();
    let max_connections = config.server.max_connections;

    let app_state = AppState {
        providers: Arc::new(config.providers),
        redirect_uri: config.redirect_uri.into(),
        store,
        http_client,
        exchange_timeout: Duration::from_secs(config.server.exchange_timeout_secs),
        started_at: Instant::now(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, max_connections);

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "accepting requests");
    for provider in provider::ProviderKind::ALL {
        info!(
            provider = %provider,
            login = %format!("http://localhost:{}/login/{provider}", listen_addr.port()),
            "login route ready"
        );
    }

    // Drain timer starts at signal receipt, not at server start
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    sweeper.abort();
    info!("shutdown complete");
    Ok(())
}

/// Value following a `--config` flag, if any.
fn config_path_arg(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
