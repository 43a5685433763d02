//! Per-connection client session.
//!
//! Two cooperating tasks per connection, joined by a shared cancellation
//! token and the session's bounded outbound sink:
//!
//! - The **reader** (this task) ingests frames under an idle deadline,
//!   parses envelopes in two stages, binds the session identity, and
//!   dispatches to the Coordinator. Semantic failures are answered in-band;
//!   only transport errors and oversized frames end the loop.
//! - The **writer** pumps the sink to the socket with a per-frame deadline
//!   and keeps the peer alive with periodic transport pings. It exits on
//!   sink end-of-stream, cancellation, or any write failure, and fires the
//!   session token so the reader unwinds too.
//!
//! Cleanup runs once on reader exit: cancel, best-effort leave of every
//! joined room, removal from the server's session set.

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::error::SessionError;
use crate::messages::{
    CreateRoomPayload, Envelope, Event, JoinRoomPayload, LeaveRoomPayload, MAX_FRAME_BYTES,
    Outbound, SendMessagePayload,
};
use crate::sink::{OutboundSink, SinkConsumer};
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// The identity bound to a session. Set at most once.
#[derive(Debug, Clone)]
struct Identity {
    user_id: String,
    user_name: String,
}

pub struct ClientSession {
    id: Uuid,
    coordinator: Arc<Coordinator>,
    config: Arc<Config>,
    sink: OutboundSink,
    cancel: CancellationToken,
    identity: Option<Identity>,
    joined_rooms: HashSet<String>,
}

impl ClientSession {
    /// Build a session and the consumer half of its outbound sink.
    pub fn new(
        id: Uuid,
        coordinator: Arc<Coordinator>,
        config: Arc<Config>,
        cancel: CancellationToken,
    ) -> (Self, SinkConsumer) {
        let (sink, consumer) = OutboundSink::channel(config.session.outbound_capacity);
        (
            Self {
                id,
                coordinator,
                config,
                sink,
                cancel,
                identity: None,
                joined_rooms: HashSet::new(),
            },
            consumer,
        )
    }

    /// Drive the connection to completion: spawn the writer, run the read
    /// loop, then clean up.
    #[instrument(skip_all, fields(session = %self.id), name = "session")]
    pub async fn run(mut self, socket: WebSocket, outbound: SinkConsumer) {
        let (ws_tx, mut ws_rx) = socket.split();
        let writer = tokio::spawn(write_pump(
            ws_tx,
            outbound,
            self.cancel.clone(),
            self.config.session.ping_period(),
            self.config.session.write_wait(),
        ));

        self.read_loop(&mut ws_rx).await;
        self.cleanup().await;
        let _ = writer.await;
    }

    async fn read_loop(&mut self, ws_rx: &mut SplitStream<WebSocket>) {
        let pong_wait = self.config.session.pong_wait();
        let mut deadline = Instant::now() + pong_wait;

        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = timeout_at(deadline, ws_rx.next()) => match next {
                    Err(_) => {
                        debug!("read deadline expired");
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(err))) => {
                        debug!(error = %err, "websocket read failed");
                        break;
                    }
                    Ok(Some(Ok(frame))) => frame,
                },
            };

            match frame {
                Message::Text(text) => {
                    if self.handle_frame(text.as_bytes()).await.is_break() {
                        break;
                    }
                }
                Message::Binary(buf) => {
                    if self.handle_frame(&buf).await.is_break() {
                        break;
                    }
                }
                // Only pongs refresh the liveness deadline.
                Message::Pong(_) => deadline = Instant::now() + pong_wait,
                // The transport layer answers pings on our behalf.
                Message::Ping(_) => {}
                Message::Close(_) => break,
            }
        }
    }

    /// Handle one inbound frame. Break means the session must terminate.
    async fn handle_frame(&mut self, raw: &[u8]) -> ControlFlow<()> {
        if raw.len() > MAX_FRAME_BYTES {
            warn!(size = raw.len(), "oversized frame");
            self.reply_error(&SessionError::FrameTooLarge).await;
            return ControlFlow::Break(());
        }

        let envelope: Envelope = match serde_json::from_slice(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(error = %err, "unparseable frame");
                self.reply_error(&SessionError::MalformedJson).await;
                return ControlFlow::Continue(());
            }
        };

        if let Err(err) = self.dispatch(&envelope).await {
            self.reply_error(&err).await;
        }
        ControlFlow::Continue(())
    }

    async fn dispatch(&mut self, envelope: &Envelope) -> Result<(), SessionError> {
        match envelope.kind.as_str() {
            "create_room" => self.handle_create_room(envelope).await,
            "join" => self.handle_join(envelope).await,
            "leave" => self.handle_leave(envelope).await,
            "message" => self.handle_message(envelope).await,
            "ping" => {
                let _ = self.sink.send(Event::Pong).await;
                Ok(())
            }
            other => Err(SessionError::InvalidMessageType(other.to_string())),
        }
    }

    async fn handle_create_room(&mut self, envelope: &Envelope) -> Result<(), SessionError> {
        let payload: CreateRoomPayload = parse(envelope)?;

        // create_room may establish the identity once.
        if !payload.user_id.is_empty() || !payload.user_name.is_empty() {
            self.ensure_identity(&payload.user_id, &payload.user_name)?;
        }
        let user_id = match &self.identity {
            Some(identity) => identity.user_id.clone(),
            None => return Err(SessionError::Unidentified),
        };

        self.joined_rooms.insert(payload.room_id.clone());
        self.coordinator
            .create_room(&payload.room_id, &user_id, &payload.room_name, &self.sink)
            .await
            .map_err(SessionError::CreateRoom)?;

        info!(room = %payload.room_id, user = %user_id, "created room");
        Ok(())
    }

    async fn handle_join(&mut self, envelope: &Envelope) -> Result<(), SessionError> {
        let payload: JoinRoomPayload = parse(envelope)?;

        // Absent user fields fall back to the bound identity.
        let user_id = if payload.user_id.is_empty() {
            self.identity
                .as_ref()
                .map(|identity| identity.user_id.clone())
                .unwrap_or_default()
        } else {
            payload.user_id.clone()
        };
        let user_name = if payload.user_name.is_empty() {
            self.identity
                .as_ref()
                .map(|identity| identity.user_name.clone())
                .unwrap_or_default()
        } else {
            payload.user_name.clone()
        };

        self.ensure_identity(&user_id, &user_name)?;

        // Join under whatever is bound; an unbound (empty) identity is the
        // Coordinator's invalid_argument to report.
        let (bound_id, bound_name) = match &self.identity {
            Some(identity) => (identity.user_id.clone(), identity.user_name.clone()),
            None => (String::new(), String::new()),
        };

        self.coordinator
            .join_room(&payload.room_id, &bound_id, &bound_name, &self.sink)
            .await
            .map_err(SessionError::JoinRoom)?;

        self.joined_rooms.insert(payload.room_id.clone());
        info!(room = %payload.room_id, user = %bound_id, "joined room");

        let _ = self
            .sink
            .send(Event::join_success(&payload.room_id, &bound_id))
            .await;
        Ok(())
    }

    async fn handle_leave(&mut self, envelope: &Envelope) -> Result<(), SessionError> {
        let payload: LeaveRoomPayload = parse(envelope)?;

        if !self.joined_rooms.contains(&payload.room_id) {
            return Err(SessionError::LeaveNotJoined);
        }
        let user_id = self
            .identity
            .as_ref()
            .map(|identity| identity.user_id.clone())
            .unwrap_or_default();

        self.coordinator
            .leave_room(&payload.room_id, &user_id)
            .await
            .map_err(SessionError::LeaveRoom)?;

        self.joined_rooms.remove(&payload.room_id);
        info!(room = %payload.room_id, user = %user_id, "left room");
        Ok(())
    }

    async fn handle_message(&mut self, envelope: &Envelope) -> Result<(), SessionError> {
        let payload: SendMessagePayload = parse(envelope)?;

        if payload.room_id.is_empty() {
            return Err(SessionError::MissingRoomId);
        }
        if !self.joined_rooms.contains(&payload.room_id) {
            return Err(SessionError::MessageNotJoined);
        }
        let user_id = self
            .identity
            .as_ref()
            .map(|identity| identity.user_id.clone())
            .unwrap_or_default();

        self.coordinator
            .send_message(&payload.room_id, &user_id, &payload.message)
            .await
            .map_err(SessionError::SendMessage)
    }

    /// Identity binding rules: the first non-empty `user_id` binds for the
    /// session's lifetime. Re-binding the same id is a no-op (the name is
    /// not updated); a different non-empty id is a conflict; an empty
    /// candidate neither binds nor conflicts.
    fn ensure_identity(&mut self, user_id: &str, user_name: &str) -> Result<(), SessionError> {
        match &self.identity {
            Some(identity) => {
                if !user_id.is_empty() && identity.user_id != user_id {
                    Err(SessionError::IdentityBound(identity.user_id.clone()))
                } else {
                    Ok(())
                }
            }
            None => {
                if !user_id.is_empty() {
                    self.identity = Some(Identity {
                        user_id: user_id.to_string(),
                        user_name: user_name.to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    async fn reply_error(&self, err: &SessionError) {
        // A failed send means the writer is already gone; teardown follows.
        let _ = self.sink.send(Outbound::Error(err.to_event())).await;
    }

    /// Runs once, on reader exit.
    async fn cleanup(&mut self) {
        self.cancel.cancel();

        let Some(identity) = self.identity.take() else {
            self.joined_rooms.clear();
            return;
        };
        for room_id in std::mem::take(&mut self.joined_rooms) {
            if let Err(err) = self
                .coordinator
                .leave_room(&room_id, &identity.user_id)
                .await
            {
                debug!(room = %room_id, user = %identity.user_id, error = %err,
                    "leave on disconnect failed");
            }
        }
    }
}

/// Writer pump: sink to socket, plus transport liveness pings.
async fn write_pump(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: SinkConsumer,
    cancel: CancellationToken,
    ping_period: Duration,
    write_wait: Duration,
) {
    let mut ping = tokio::time::interval(ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it.
    ping.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Flush envelopes queued before cancellation (in-band errors
                // on a terminating session, most notably) before closing.
                while let Ok(item) = outbound.try_recv() {
                    if write_frame(&mut ws_tx, &item, write_wait).await.is_err() {
                        break;
                    }
                }
                break;
            }
            item = outbound.recv() => match item {
                Some(item) => {
                    if write_frame(&mut ws_tx, &item, write_wait).await.is_err() {
                        break;
                    }
                }
                None => {
                    // End-of-stream: the sink was closed (room leave or
                    // teardown). Tell the peer and stop.
                    let _ = timeout(write_wait, ws_tx.send(Message::Close(None))).await;
                    break;
                }
            },
            _ = ping.tick() => {
                match timeout(write_wait, ws_tx.send(Message::Ping(Bytes::new()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        debug!(error = %err, "ping write failed");
                        break;
                    }
                    Err(_) => {
                        debug!("ping write timed out");
                        break;
                    }
                }
            }
        }
    }

    // Wake the reader so session teardown runs even when the writer exits
    // first (write failure or sink closure).
    cancel.cancel();
    let _ = ws_tx.close().await;
}

async fn write_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    item: &Outbound,
    write_wait: Duration,
) -> Result<(), ()> {
    let text = match serde_json::to_string(item) {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "failed to encode outbound envelope");
            return Ok(());
        }
    };
    match timeout(write_wait, ws_tx.send(Message::Text(text.into()))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            debug!(error = %err, "websocket write failed");
            Err(())
        }
        Err(_) => {
            debug!("websocket write timed out");
            Err(())
        }
    }
}

fn parse<T>(envelope: &Envelope) -> Result<T, SessionError>
where
    T: serde::de::DeserializeOwned + Default,
{
    envelope
        .parse_payload()
        .map_err(|err| SessionError::InvalidPayload(err.to_string()))
}
