//! HTTP/WebSocket frontend.
//!
//! A thin axum app: `/ws` upgrades and hands the socket to a
//! [`ClientSession`]; `/health` answers liveness probes. The server keeps
//! the set of live sessions and owns the ordered graceful shutdown:
//! connection layer first, then the Coordinator, then HTTP.

mod session;

pub use session::ClientSession;

use crate::config::Config;
use crate::coordinator::Coordinator;
use axum::Router;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Transport-level frame ceiling. Kept above the application limit so an
/// oversized frame is received and answered in-band with
/// `message_too_large` instead of dying inside the protocol layer.
const TRANSPORT_FRAME_CEILING: usize = 64 * 1024;

/// Poll interval while waiting for sessions to drain on shutdown.
const DRAIN_POLL: Duration = Duration::from_millis(50);

pub struct ChatServer {
    coordinator: Arc<Coordinator>,
    config: Arc<Config>,
    sessions: DashMap<Uuid, SessionHandle>,
    shutdown: CancellationToken,
}

struct SessionHandle {
    cancel: CancellationToken,
}

impl ChatServer {
    pub fn new(coordinator: Arc<Coordinator>, config: Arc<Config>) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            config,
            sessions: DashMap::new(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Build the HTTP surface.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health))
            .with_state(Arc::clone(self))
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Ordered graceful shutdown: cancel every session, wait for the set to
    /// drain, then close the coordinator's rooms. Each phase is bounded by
    /// the remaining grace.
    pub async fn shutdown(&self, grace: Duration) {
        let deadline = Instant::now() + grace;
        info!(sessions = self.sessions.len(), "shutting down connection layer");

        self.shutdown.cancel();
        // Copy the handles out before touching them; cancellation triggers
        // session cleanup, which removes entries from the same map.
        let handles: Vec<CancellationToken> = self
            .sessions
            .iter()
            .map(|entry| entry.value().cancel.clone())
            .collect();
        for handle in handles {
            handle.cancel();
        }

        while !self.sessions.is_empty() && Instant::now() < deadline {
            sleep(DRAIN_POLL).await;
        }
        if !self.sessions.is_empty() {
            warn!(remaining = self.sessions.len(), "sessions still open at deadline");
        }

        if let Err(err) = self.coordinator.shutdown(deadline).await {
            warn!(error = %err, "coordinator shutdown incomplete");
        }
        info!("shutdown complete");
    }
}

async fn ws_handler(
    State(server): State<Arc<ChatServer>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.max_message_size(TRANSPORT_FRAME_CEILING)
        .on_upgrade(move |socket| handle_socket(server, socket))
}

async fn handle_socket(server: Arc<ChatServer>, socket: WebSocket) {
    if server.shutdown.is_cancelled() {
        return;
    }

    let session_id = Uuid::new_v4();
    let cancel = server.shutdown.child_token();
    let (session, outbound) = ClientSession::new(
        session_id,
        Arc::clone(&server.coordinator),
        Arc::clone(&server.config),
        cancel.clone(),
    );
    server
        .sessions
        .insert(session_id, SessionHandle { cancel });

    info!(session = %session_id, "client connected");
    session.run(socket, outbound).await;

    server.sessions.remove(&session_id);
    info!(session = %session_id, "client disconnected");
}

async fn health() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"status":"healthy"}"#,
    )
}
