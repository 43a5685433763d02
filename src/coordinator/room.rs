//! Room actor: the single owner of one chat room's membership and fan-out.
//!
//! Each room runs an isolated task consuming a bounded FIFO mailbox of
//! [`RoomEvent`]s. All membership mutation happens inside that task, so the
//! hot path needs no coordination beyond the mailbox itself. Handles are
//! cheap clones; read helpers return snapshot copies.

use crate::error::CoordinatorError;
use crate::messages::Event;
use crate::sink::{OutboundSink, SinkSendError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::debug;

/// Per-recipient delivery budget during a broadcast. A member whose sink
/// stays full past this window loses that one message; fan-out never blocks
/// on a slow consumer.
const BROADCAST_WAIT: Duration = Duration::from_millis(100);

/// Submission budget when a room's mailbox is full.
const ENQUEUE_WAIT: Duration = Duration::from_secs(1);

/// A chat participant. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
}

/// Everything a room needs to attach a new member.
#[derive(Debug)]
pub struct RoomClient {
    pub user_id: String,
    pub user: User,
    pub sink: OutboundSink,
}

/// Events processed by the room's loop, in submission order.
pub enum RoomEvent {
    Join(Box<RoomClient>),
    Leave {
        user_id: String,
        reply_tx: oneshot::Sender<usize>,
    },
    Broadcast(Box<Event>),
    Close,
}

/// Handle to a live room. Cloning shares the same actor.
#[derive(Clone)]
pub struct Room {
    inner: Arc<RoomInner>,
}

struct RoomInner {
    id: String,
    name: String,
    author_id: String,
    created_at: DateTime<Utc>,
    state: RwLock<RoomState>,
    events: mpsc::Sender<RoomEvent>,
}

#[derive(Default)]
struct RoomState {
    members: HashMap<String, User>,
    sinks: HashMap<String, OutboundSink>,
}

impl Room {
    /// Create the room and spawn its event loop.
    pub fn spawn(id: &str, name: &str, author_id: &str, mailbox_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(mailbox_capacity);
        let inner = Arc::new(RoomInner {
            id: id.to_string(),
            name: name.to_string(),
            author_id: author_id.to_string(),
            created_at: Utc::now(),
            state: RwLock::new(RoomState::default()),
            events: tx,
        });
        tokio::spawn(run_loop(Arc::clone(&inner), rx));
        Self { inner }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn author_id(&self) -> &str {
        &self.inner.author_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Snapshot of the current members.
    pub async fn users(&self) -> HashMap<String, User> {
        self.inner.state.read().await.members.clone()
    }

    pub async fn user_count(&self) -> usize {
        self.inner.state.read().await.members.len()
    }

    /// Submit a join. The loop applies it in order; a repeat join for the
    /// same user replaces the sink entry.
    pub async fn enqueue_join(&self, client: RoomClient) -> Result<(), CoordinatorError> {
        self.submit(RoomEvent::Join(Box::new(client)), ENQUEUE_WAIT)
            .await
    }

    /// Submit a leave and wait for the loop to apply it. Returns the member
    /// count after removal, which makes empty-room collection deterministic.
    pub async fn enqueue_leave(&self, user_id: &str) -> Result<usize, CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(
            RoomEvent::Leave {
                user_id: user_id.to_string(),
                reply_tx,
            },
            ENQUEUE_WAIT,
        )
        .await?;
        reply_rx
            .await
            .map_err(|_| CoordinatorError::RoomNotFound(self.inner.id.clone()))
    }

    /// Submit an envelope for fan-out to every current member.
    pub async fn enqueue_broadcast(&self, event: Event) -> Result<(), CoordinatorError> {
        self.submit(RoomEvent::Broadcast(Box::new(event)), ENQUEUE_WAIT)
            .await
    }

    /// Ask the loop to terminate within the given budget.
    pub async fn enqueue_close(&self, budget: Duration) -> Result<(), CoordinatorError> {
        self.submit(RoomEvent::Close, budget).await
    }

    async fn submit(&self, event: RoomEvent, wait: Duration) -> Result<(), CoordinatorError> {
        self.inner
            .events
            .send_timeout(event, wait)
            .await
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => CoordinatorError::RoomBusy(self.inner.id.clone()),
                // A closed mailbox means the loop already terminated; to
                // callers the room no longer exists.
                SendTimeoutError::Closed(_) => CoordinatorError::RoomNotFound(self.inner.id.clone()),
            })
    }
}

async fn run_loop(inner: Arc<RoomInner>, mut rx: mpsc::Receiver<RoomEvent>) {
    debug!(room = %inner.id, "room loop started");
    while let Some(event) = rx.recv().await {
        match event {
            RoomEvent::Join(client) => inner.apply_join(*client).await,
            RoomEvent::Leave { user_id, reply_tx } => {
                let remaining = inner.apply_leave(&user_id).await;
                let _ = reply_tx.send(remaining);
            }
            RoomEvent::Broadcast(event) => inner.fan_out(*event).await,
            RoomEvent::Close => break,
        }
    }
    inner.drain().await;
    debug!(room = %inner.id, "room loop terminated");
}

impl RoomInner {
    async fn apply_join(&self, client: RoomClient) {
        let mut state = self.state.write().await;
        state.members.insert(client.user_id.clone(), client.user);
        state.sinks.insert(client.user_id, client.sink);
    }

    /// Remove a member and close their sink so the session's writer pump
    /// observes end-of-stream. Leaving a non-member is a no-op.
    async fn apply_leave(&self, user_id: &str) -> usize {
        let mut state = self.state.write().await;
        state.members.remove(user_id);
        let sink = state.sinks.remove(user_id);
        let remaining = state.members.len();
        drop(state);
        if let Some(sink) = sink {
            sink.close();
        }
        remaining
    }

    async fn fan_out(&self, event: Event) {
        let sinks: Vec<(String, OutboundSink)> = {
            let state = self.state.read().await;
            state
                .sinks
                .iter()
                .map(|(user_id, sink)| (user_id.clone(), sink.clone()))
                .collect()
        };
        for (user_id, sink) in sinks {
            match sink.send_timeout(event.clone(), BROADCAST_WAIT).await {
                Ok(()) => {}
                Err(SinkSendError::Timeout) => {
                    debug!(room = %self.id, user = %user_id, "dropping broadcast for slow consumer");
                }
                Err(SinkSendError::Closed) => {}
            }
        }
    }

    async fn drain(&self) {
        let mut state = self.state.write().await;
        state.members.clear();
        for (_, sink) in state.sinks.drain() {
            sink.close();
        }
    }
}
