//! Transport abstraction layer for bingo rooms.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the persistent connection a player holds to a room. Frames are text:
//! the wire protocol is JSON plus the literal `ping` liveness probe.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A close frame sent to the peer when the server ends a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code. 1000 is a normal close; 4000-4999 are
    /// application codes.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
}

impl CloseReason {
    /// Normal closure (1000).
    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: 1000,
            reason: reason.into(),
        }
    }

    /// The room named by the connection target does not exist (4004).
    pub fn room_not_found() -> Self {
        Self {
            code: 4004,
            reason: "room not found".into(),
        }
    }

    /// The client failed to authorize in time (4001).
    pub fn unauthorized() -> Self {
        Self {
            code: 4001,
            reason: "unauthorized".into(),
        }
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;
}

/// A single persistent connection that exchanges text frames.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one text frame to the remote peer.
    async fn send(&self, text: &str) -> Result<(), Self::Error>;

    /// Receives the next text frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<String>, Self::Error>;

    /// Sends a close frame and shuts the connection down.
    async fn close(&self, reason: CloseReason) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// The request target the connection was opened with (e.g.
    /// `/socket/happy-otter`).
    fn target(&self) -> &str;

    /// Whether the connection is still open for sending.
    fn is_open(&self) -> bool;
}

/// Extracts the room slug from a connection target: the last non-empty
/// path segment, with any query string stripped.
pub fn room_slug_from_target(target: &str) -> Option<&str> {
    let path = target.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/').find(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_room_slug_from_socket_path() {
        assert_eq!(
            room_slug_from_target("/socket/happy-otter"),
            Some("happy-otter")
        );
    }

    #[test]
    fn test_room_slug_ignores_query_and_trailing_slash() {
        assert_eq!(
            room_slug_from_target("/socket/happy-otter/?v=2"),
            Some("happy-otter")
        );
    }

    #[test]
    fn test_room_slug_missing_for_root() {
        assert_eq!(room_slug_from_target("/"), None);
        assert_eq!(room_slug_from_target(""), None);
    }

    #[test]
    fn test_close_reason_codes() {
        assert_eq!(CloseReason::room_not_found().code, 4004);
        assert_eq!(CloseReason::unauthorized().code, 4001);
        assert_eq!(CloseReason::normal("bye").code, 1000);
    }
}
