//! Runtime lifecycle: bind, serve, and shut down gracefully on Ctrl+C.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::common::config::AppConfig;
use crate::server::routes::create_router;
use crate::server::state::AppState;

/// In-flight requests get this long to finish after Ctrl+C.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

fn bind_addr(config: &AppConfig) -> Result<SocketAddr> {
    let ip: IpAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.server.bind))?;
    Ok(SocketAddr::new(ip, config.server.port))
}

/// Run the relay until Ctrl+C.
pub async fn serve(config: AppConfig) -> Result<()> {
    let addr = bind_addr(&config)?;
    let state = AppState::new(config)?;
    let app = create_router(state.clone());

    let listener = std::net::TcpListener::bind(addr).context(
        "Failed to bind to port - port already in use.\n\n\
         Is another ftprelay instance running?\n\
         Or is another service using this port?",
    )?;
    listener
        .set_nonblocking(true)
        .context("Failed to set listener to non-blocking mode")?;
    let local = listener.local_addr()?;

    let handle = axum_server::Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    // Forget idle rate-limit windows so the table doesn't grow without bound
    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            tick.tick().await;
            limiter.prune();
        }
    });

    tracing::info!(
        %local,
        remote = %format!("{}:{}", state.config.remote.host, state.config.remote.port),
        security = ?state.config.remote.security,
        staging = %state.staging.dir().display(),
        "ftprelay listening"
    );

    axum_server::from_tcp(listener)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// First Ctrl+C drains, a second one forces.
async fn shutdown_on_signal(handle: axum_server::Handle) {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("Failed to listen for Ctrl+C");
        return;
    }

    tracing::info!(
        connections = handle.connection_count(),
        "Ctrl+C received - draining in-flight requests"
    );
    handle.graceful_shutdown(Some(DRAIN_TIMEOUT));

    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!(
            remaining = handle.connection_count(),
            "Force shutdown requested"
        );
        handle.shutdown();
    }
}
