//! Session client
//!
//! Long-running client for one logged-in session:
//! 1. Loads config and seeds the session cookie
//! 2. Wires a single refresh coordinator into the HTTP layer and the push stream
//! 3. Optionally probes the API to confirm the session
//! 4. Watches the push stream, reconnecting until the session ends or a signal arrives

mod config;
mod metrics;
mod watch;

use std::sync::Arc;

use anyhow::{Context, Result};
use session_http::{HttpRefresher, HttpTransport, Session, SseConnector};
use session_refresh::{ApiRequest, RefreshCoordinator, RequestInterceptionLayer, StreamReconnector};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

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

    info!("starting session-client");

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.session.base_url,
        refresh_path = %config.session.refresh_path,
        stream_path = %config.session.stream_path,
        session_cookie = config.session.session_cookie.is_some(),
        "configuration loaded"
    );

    if let Some(addr) = config.metrics.listen_addr {
        metrics::exporter()
            .context("failed to configure metrics exporter")?
            .with_http_listener(addr)
            .install()
            .with_context(|| format!("failed to start metrics exporter on {addr}"))?;
        info!(%addr, "metrics exporter listening");
    }

    let session = Session::new(&config.session.base_url, config.session.timeout())
        .context("failed to build http session")?;
    if let Some(cookie) = &config.session.session_cookie {
        session.seed_cookie(&config.session.session_cookie_name, cookie);
    } else {
        warn!("no session cookie configured, relying on refresh to establish one");
    }

    // One coordinator per session, shared by every caller that can see an expiry
    let coordinator = Arc::new(RefreshCoordinator::new());
    let layer = RequestInterceptionLayer::new(
        coordinator.clone(),
        Arc::new(HttpTransport::new(session.clone())),
        Arc::new(HttpRefresher::new(
            session.clone(),
            config.session.refresh_path.clone(),
        )),
    )
    .with_wait_timeout(config.session.wait_timeout());
    let reconnector = StreamReconnector::new(coordinator, SseConnector::new(session));

    if let Some(probe_path) = &config.session.probe_path {
        let response = layer
            .execute(ApiRequest::get(probe_path.clone()))
            .await
            .with_context(|| format!("session probe {probe_path} failed"))?;
        if response.is_success() {
            info!(path = %probe_path, status = response.status, "session probe succeeded");
        } else {
            warn!(
                path = %probe_path,
                status = response.status,
                body = %response.text(),
                "session probe returned non-success status"
            );
        }
    }

    let watcher = watch::watch(
        &reconnector,
        &layer,
        &config.session.stream_path,
        config.stream.reconnect_delay(),
        |event| {
            info!(
                event = %event.event,
                id = event.id.as_deref().unwrap_or(""),
                data = %event.data,
                "push event"
            );
        },
    );

    tokio::select! {
        ended = watcher => {
            error!(error = %ended, "session ended");
            anyhow::bail!("session ended: {ended}");
        }
        _ = shutdown_signal() => {}
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
