//! roomcast - real-time multi-room chat server over WebSocket.
//!
//! Clients connect over a persistent WebSocket, bind an identity, create or
//! join named rooms, and exchange messages that are fanned out to every
//! participant. Nothing is durable: rooms and memberships live exactly as
//! long as the process.
//!
//! # Architecture
//!
//! - **Room**: each room runs as an isolated task owning its member set and
//!   processing a bounded FIFO mailbox of join/leave/broadcast events. This
//!   keeps the hot path (fan-out) free of lock contention.
//! - **Coordinator**: the public surface of the engine. Owns the room
//!   registry, validates every cross-entity operation, and translates it
//!   into room events.
//! - **ClientSession**: one reader and one writer task per connection,
//!   joined by a shared cancellation token and a bounded outbound sink.
//! - **Server**: thin axum frontend - `/ws` upgrade plus `/health`.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod messages;
pub mod server;
pub mod sink;
