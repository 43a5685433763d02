//! The Coordinator: public surface of the chat engine.
//!
//! The only component outside a room that decides whether an operation is
//! legal. It owns the room registry, validates create/join/leave/send
//! against it, translates them into room events, and emits the system
//! announcements (`user_joined` / `user_left`). Rooms are collected as soon
//! as their last member leaves.

mod registry;
mod room;

pub use registry::RoomRegistry;
pub use room::{Room, RoomClient, RoomEvent, User};

use crate::error::CoordinatorError;
use crate::messages::Event;
use crate::sink::OutboundSink;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Maximum message content size in bytes.
const MAX_MESSAGE_BYTES: usize = 10 * 1024;

pub struct Coordinator {
    rooms: RoomRegistry,
    mailbox_capacity: usize,
}

impl Coordinator {
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            rooms: RoomRegistry::new(),
            mailbox_capacity,
        }
    }

    /// Look up a room by id.
    pub fn room(&self, room_id: &str) -> Option<Room> {
        self.rooms.load(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Create a room and auto-join its author.
    ///
    /// The `new_room` acknowledgment is written directly to the creator's
    /// sink rather than broadcast, so the creator sees it before any later
    /// traffic on the room regardless of event-loop timing.
    pub async fn create_room(
        &self,
        room_id: &str,
        author_id: &str,
        room_name: &str,
        sink: &OutboundSink,
    ) -> Result<(), CoordinatorError> {
        if room_id.is_empty() || room_name.is_empty() {
            return Err(CoordinatorError::MissingRoomFields);
        }
        if self.rooms.load(room_id).is_some() {
            return Err(CoordinatorError::RoomExists(room_id.to_string()));
        }

        let room = Room::spawn(room_id, room_name, author_id, self.mailbox_capacity);
        if !self.rooms.store(room_id, room.clone()) {
            // Lost a create race; retire the loop we just spawned.
            let _ = room.enqueue_close(Duration::from_secs(1)).await;
            return Err(CoordinatorError::RoomExists(room_id.to_string()));
        }

        // The author has no separate display name at creation time.
        let author = User {
            id: author_id.to_string(),
            name: author_id.to_string(),
        };
        if let Err(err) = room
            .enqueue_join(RoomClient {
                user_id: author_id.to_string(),
                user: author,
                sink: sink.clone(),
            })
            .await
        {
            self.rooms.delete(room_id);
            let _ = room.enqueue_close(Duration::from_secs(1)).await;
            return Err(err);
        }

        info!(room = %room_id, author = %author_id, "room created");

        if sink
            .send(Event::new_room(room_id, author_id, room_name))
            .await
            .is_err()
        {
            debug!(room = %room_id, author = %author_id, "creator sink closed before new_room");
        }
        Ok(())
    }

    /// Join a user to an existing room and announce it.
    pub async fn join_room(
        &self,
        room_id: &str,
        user_id: &str,
        user_name: &str,
        sink: &OutboundSink,
    ) -> Result<(), CoordinatorError> {
        let room = self
            .rooms
            .load(room_id)
            .ok_or_else(|| CoordinatorError::RoomNotFound(room_id.to_string()))?;
        if user_id.is_empty() || user_name.is_empty() {
            return Err(CoordinatorError::MissingUserFields);
        }
        if room.users().await.contains_key(user_id) {
            return Err(CoordinatorError::AlreadyMember(user_id.to_string()));
        }

        room.enqueue_join(RoomClient {
            user_id: user_id.to_string(),
            user: User {
                id: user_id.to_string(),
                name: user_name.to_string(),
            },
            sink: sink.clone(),
        })
        .await?;

        room.enqueue_broadcast(Event::user_joined(room_id, user_id, user_name))
            .await?;

        info!(room = %room_id, user = %user_id, "user joined room");
        Ok(())
    }

    /// Remove a user from a room, announce it to the remaining members, and
    /// collect the room if it is now empty.
    ///
    /// The announcement is enqueued after the Leave, and the Leave closes
    /// the departing member's sink, so leavers never see their own
    /// `user_left`.
    pub async fn leave_room(&self, room_id: &str, user_id: &str) -> Result<(), CoordinatorError> {
        let room = self
            .rooms
            .load(room_id)
            .ok_or_else(|| CoordinatorError::RoomNotFound(room_id.to_string()))?;
        let users = room.users().await;
        let user = users
            .get(user_id)
            .ok_or_else(|| CoordinatorError::NotMember {
                user_id: user_id.to_string(),
                room_id: room_id.to_string(),
            })?;

        let remaining = room.enqueue_leave(user_id).await?;
        room.enqueue_broadcast(Event::user_left(room_id, user_id, &user.name))
            .await?;

        info!(room = %room_id, user = %user_id, remaining, "user left room");

        if remaining == 0 {
            // Delete first so later lookups resolve as room_not_found, then
            // let the loop terminate.
            self.rooms.delete(room_id);
            let _ = room.enqueue_close(Duration::from_secs(1)).await;
            debug!(room = %room_id, "empty room removed");
        }
        Ok(())
    }

    /// Fan a chat message out to every member of a room.
    pub async fn send_message(
        &self,
        room_id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<(), CoordinatorError> {
        if content.is_empty() {
            return Err(CoordinatorError::EmptyMessage);
        }
        if content.len() > MAX_MESSAGE_BYTES {
            return Err(CoordinatorError::MessageTooLong);
        }

        let room = self
            .rooms
            .load(room_id)
            .ok_or_else(|| CoordinatorError::RoomNotFound(room_id.to_string()))?;
        let users = room.users().await;
        let user = users
            .get(user_id)
            .ok_or_else(|| CoordinatorError::NotMember {
                user_id: user_id.to_string(),
                room_id: room_id.to_string(),
            })?;

        room.enqueue_broadcast(Event::new_message(room_id, user_id, &user.name, content))
            .await
    }

    /// Enqueue Close on every room, bounded by `deadline`. Room loops are
    /// not awaited; connection teardown is the transport layer's job.
    pub async fn shutdown(&self, deadline: Instant) -> Result<(), CoordinatorError> {
        for room in self.rooms.snapshot() {
            let now = Instant::now();
            if now >= deadline {
                return Err(CoordinatorError::DeadlineExceeded);
            }
            if let Err(err) = room.enqueue_close(deadline - now).await {
                debug!(room = %room.id(), error = %err, "close submission failed");
            }
        }
        Ok(())
    }
}
