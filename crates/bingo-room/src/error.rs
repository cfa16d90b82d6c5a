//! Error types for the room layer.

use bingo_protocol::RoomId;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// A room with this id is already registered.
    #[error("room {0} already exists")]
    AlreadyExists(RoomId),

    /// A board could not be generated for the room.
    #[error("board generation failed: {0}")]
    Generator(#[from] bingo_generator::GeneratorError),

    /// A generated board could not be tiled.
    #[error("invalid board: {0}")]
    Board(#[from] bingo_protocol::ProtocolError),

    /// The race sidecar refused the operation.
    #[error(transparent)]
    Race(#[from] bingo_race::RaceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors reported by the external room store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store failed.
    #[error("store backend error: {0}")]
    Backend(String),

    /// No stored data for the requested key.
    #[error("not found in store: {0}")]
    NotFound(String),

    /// A history payload could not be converted to or from JSON.
    #[error("history payload error: {0}")]
    Payload(#[from] serde_json::Error),
}
