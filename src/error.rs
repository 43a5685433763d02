//! Unified error handling for roomcast.
//!
//! Two layers: `CoordinatorError` for engine operations (room lifecycle,
//! membership, fan-out submission) and `SessionError` for the per-connection
//! protocol surface. Session errors carry the stable wire `code` that goes
//! into the in-band `error` envelope; the session stays alive after all of
//! them except `message_too_large`.

use crate::messages::ErrorEvent;
use thiserror::Error;

// ============================================================================
// Coordinator errors (engine operations)
// ============================================================================

/// Errors produced by Coordinator operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("room_id and room_name are required")]
    MissingRoomFields,

    #[error("user_id and user_name are required")]
    MissingUserFields,

    #[error("message content cannot be empty")]
    EmptyMessage,

    #[error("message exceeds 10KB limit")]
    MessageTooLong,

    #[error("room with id {0} already exists")]
    RoomExists(String),

    #[error("room {0} not found")]
    RoomNotFound(String),

    #[error("user {0} already in room")]
    AlreadyMember(String),

    #[error("user {user_id} not in room {room_id}")]
    NotMember { user_id: String, room_id: String },

    /// The room's event mailbox stayed full past the submission budget.
    #[error("room {0} is busy")]
    RoomBusy(String),

    #[error("shutdown deadline exceeded")]
    DeadlineExceeded,
}

impl CoordinatorError {
    /// Get a static kind string for logging and assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingRoomFields | Self::MissingUserFields => "invalid_argument",
            Self::EmptyMessage | Self::MessageTooLong => "invalid_argument",
            Self::RoomExists(_) => "room_exists",
            Self::RoomNotFound(_) => "room_not_found",
            Self::AlreadyMember(_) => "already_member",
            Self::NotMember { .. } => "not_member",
            Self::RoomBusy(_) => "room_busy",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

// ============================================================================
// Session errors (protocol surface)
// ============================================================================

/// Errors reported in-band on a client session.
///
/// Each maps to a stable wire code via [`SessionError::code`]. Only
/// `FrameTooLarge` terminates the session; everything else is answered and
/// the read loop continues.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("message exceeds 10KB limit")]
    FrameTooLarge,

    #[error("invalid JSON message")]
    MalformedJson,

    #[error("unknown message type: {0}")]
    InvalidMessageType(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("user not identified yet")]
    Unidentified,

    #[error("connection already bound to user {0}")]
    IdentityBound(String),

    /// `leave` for a room this session never joined.
    #[error("user not in this room")]
    LeaveNotJoined,

    /// `message` for a room this session never joined.
    #[error("not in this room")]
    MessageNotJoined,

    #[error("room_id is required")]
    MissingRoomId,

    #[error("{0}")]
    CreateRoom(CoordinatorError),

    #[error("{0}")]
    JoinRoom(CoordinatorError),

    #[error("{0}")]
    LeaveRoom(CoordinatorError),

    #[error("{0}")]
    SendMessage(CoordinatorError),
}

impl SessionError {
    /// The stable `code` field of the `error` envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FrameTooLarge => "message_too_large",
            Self::MalformedJson => "malformed_json",
            Self::InvalidMessageType(_) => "invalid_message_type",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Unidentified | Self::IdentityBound(_) => "identity_error",
            Self::CreateRoom(_) => "create_room_error",
            Self::JoinRoom(_) => "join_room_error",
            Self::LeaveNotJoined | Self::LeaveRoom(_) => "leave_room_error",
            Self::MessageNotJoined | Self::MissingRoomId | Self::SendMessage(_) => "message_error",
        }
    }

    /// Convert to the in-band `error` envelope.
    pub fn to_event(&self) -> ErrorEvent {
        ErrorEvent {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}
