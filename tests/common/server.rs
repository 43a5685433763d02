//! Test server management.
//!
//! Spawns roomcast in-process on an ephemeral port for integration testing.

#![allow(dead_code)]

use roomcast::config::Config;
use roomcast::coordinator::Coordinator;
use roomcast::server::ChatServer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A test server instance.
pub struct TestServer {
    addr: SocketAddr,
    server: Arc<ChatServer>,
    stop: CancellationToken,
    serve_task: JoinHandle<()>,
}

impl TestServer {
    /// Spawn a server with default configuration on an ephemeral port.
    pub async fn spawn() -> anyhow::Result<Self> {
        let config = Arc::new(Config::default());
        let coordinator = Arc::new(Coordinator::new(config.room.mailbox_capacity));
        let server = ChatServer::new(coordinator, config);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = server.router();
        let stop = CancellationToken::new();
        let stop_signal = stop.clone();
        let serve_task = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop_signal.cancelled().await })
                .await;
        });

        Ok(Self {
            addr,
            server,
            stop,
            serve_task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn chat(&self) -> &Arc<ChatServer> {
        &self.server
    }

    /// Run the server's ordered graceful shutdown, then stop serving.
    pub async fn shutdown(self, grace: Duration) {
        self.server.shutdown(grace).await;
        self.stop.cancel();
        let _ = self.serve_task.await;
    }

    /// Tear down without the graceful sequence.
    pub fn abort(self) {
        self.stop.cancel();
        self.serve_task.abort();
    }
}
