//! roomcast - real-time multi-room chat server over WebSocket.

use roomcast::config::Config;
use roomcast::coordinator::Coordinator;
use roomcast::server::ChatServer;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration; running without a file uses the defaults.
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).map_err(|e| {
            error!(path = %path, error = %e, "Failed to load config");
            e
        })?,
        None => Config::default(),
    };
    let config = Arc::new(config);

    info!(address = %config.server.address, "Starting roomcast");

    let coordinator = Arc::new(Coordinator::new(config.room.mailbox_capacity));
    let server = ChatServer::new(coordinator, Arc::clone(&config));

    let listener = tokio::net::TcpListener::bind(config.server.address).await?;
    info!(
        "WebSocket endpoint: ws://{}/ws",
        listener.local_addr()?
    );

    let app = server.router();
    let shutdown_server = Arc::clone(&server);
    let grace = config.server.shutdown_grace();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            info!("Shutdown signal received");
            shutdown_server.shutdown(grace).await;
        })
        .await?;

    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
