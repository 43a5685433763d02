//! Wire schema for the WebSocket protocol.
//!
//! Every frame is a UTF-8 JSON envelope. Inbound frames are parsed in two
//! stages: the outer `{type, payload}` shape first, then the payload against
//! the struct the `type` selects. That split is what lets the session report
//! `invalid_message_type` and `invalid_payload` as distinct errors.
//!
//! Outbound traffic is a closed set: the tagged [`Event`] variants plus the
//! untagged `error` envelope, wrapped together as [`Outbound`].

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Maximum inbound frame size in bytes.
pub const MAX_FRAME_BYTES: usize = 10 * 1024;

/// Inbound envelope: the outer shape of every client frame.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    /// Defaults to empty when absent, which dispatch then rejects as an
    /// unknown message type.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
}

impl Envelope {
    /// Second-stage parse of the payload against a concrete shape.
    ///
    /// An absent or `null` payload parses to the type's default, matching
    /// clients that omit the field entirely; field-level validation is the
    /// Coordinator's job.
    pub fn parse_payload<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match self.payload.as_deref() {
            None => Ok(T::default()),
            Some(raw) if raw.get() == "null" => Ok(T::default()),
            Some(raw) => serde_json::from_str(raw.get()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRoomPayload {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub room_name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinRoomPayload {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaveRoomPayload {
    #[serde(default)]
    pub room_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessagePayload {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub message: String,
}

/// Body of a `new_message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

/// Outbound room and session events, discriminated by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    NewRoom {
        room_id: String,
        author_id: String,
        room_name: String,
    },
    JoinSuccess {
        room_id: String,
        user_id: String,
    },
    UserJoined {
        room_id: String,
        user_id: String,
        user_name: String,
        message_time: String,
    },
    UserLeft {
        room_id: String,
        user_id: String,
        user_name: String,
        message_time: String,
    },
    NewMessage {
        room_id: String,
        user_id: String,
        user_name: String,
        message: MessageBody,
        message_time: String,
    },
    Pong,
}

impl Event {
    pub fn new_room(room_id: &str, author_id: &str, room_name: &str) -> Self {
        Self::NewRoom {
            room_id: room_id.to_string(),
            author_id: author_id.to_string(),
            room_name: room_name.to_string(),
        }
    }

    pub fn join_success(room_id: &str, user_id: &str) -> Self {
        Self::JoinSuccess {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        }
    }

    pub fn user_joined(room_id: &str, user_id: &str, user_name: &str) -> Self {
        Self::UserJoined {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            message_time: rfc3339_now(),
        }
    }

    pub fn user_left(room_id: &str, user_id: &str, user_name: &str) -> Self {
        Self::UserLeft {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            message_time: rfc3339_now(),
        }
    }

    pub fn new_message(room_id: &str, user_id: &str, user_name: &str, content: &str) -> Self {
        Self::NewMessage {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            message: MessageBody {
                message: content.to_string(),
            },
            message_time: rfc3339_now(),
        }
    }
}

/// The `error` envelope. Deliberately untagged: the wire shape is
/// `{code, message}` with no `type` discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub code: String,
    pub message: String,
}

/// Anything a session's writer pump can put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outbound {
    Event(Event),
    Error(ErrorEvent),
}

impl From<Event> for Outbound {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

impl From<ErrorEvent> for Outbound {
    fn from(error: ErrorEvent) -> Self {
        Self::Error(error)
    }
}

/// Current time as RFC3339 UTC with second precision, e.g.
/// `2026-08-02T12:30:00Z`.
pub fn rfc3339_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
