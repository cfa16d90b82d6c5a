//! Unified error type for the bingo server.

use bingo_auth::AuthError;
use bingo_generator::GeneratorError;
use bingo_protocol::{ProtocolError, RoomId};
use bingo_race::RaceError;
use bingo_room::{RoomError, StoreError};
use bingo_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum BingoError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A token could not be issued or verified.
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Race(#[from] RaceError),

    /// A room-level error (not found, already exists).
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The password given for a room token was wrong.
    #[error("wrong password for room {0}")]
    WrongPassword(RoomId),

    /// The dispatcher task is gone.
    #[error("server is shutting down")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let bingo_err: BingoError = err.into();
        assert!(matches!(bingo_err, BingoError::Transport(_)));
        assert!(bingo_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let bingo_err: BingoError = err.into();
        assert!(matches!(bingo_err, BingoError::Protocol(_)));
    }

    #[test]
    fn test_from_auth_error() {
        let bingo_err: BingoError = AuthError::Expired.into();
        assert!(matches!(bingo_err, BingoError::Auth(_)));
    }

    #[test]
    fn test_from_room_error() {
        let err = RoomError::NotFound(RoomId::new("happy-otter"));
        let bingo_err: BingoError = err.into();
        assert!(matches!(bingo_err, BingoError::Room(_)));
        assert!(bingo_err.to_string().contains("happy-otter"));
    }

    #[test]
    fn test_from_generator_error() {
        let bingo_err: BingoError = GeneratorError::EmptyPool.into();
        assert!(matches!(bingo_err, BingoError::Generator(_)));
    }
}
