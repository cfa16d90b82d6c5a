//! Wire protocol for bingo rooms.
//!
//! This crate defines the "language" that browsers and the server speak:
//!
//! - **Types** ([`ClientFrame`], [`ClientAction`], [`ServerMessage`],
//!   [`Board`], [`ChatMessage`], etc.), the structures that travel on the
//!   wire and that rooms keep as state.
//! - **Race types** ([`RaceSnapshot`], [`RacePush`], [`RaceControl`]), the
//!   documents exchanged with the external race service.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]), how those messages are
//!   converted to and from text frames.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (text frames) and the rooms.
//! It doesn't know about connections or tokens; it only knows how to
//! serialize and deserialize messages.
//!
//! ```text
//! Transport (text) → Protocol (ClientFrame) → Room (identity + state)
//! ```

mod codec;
mod error;
mod race;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use race::{
    EntrantStatus, RaceControl, RaceEntrant, RacePush, RaceSnapshot,
    RaceStatus, RaceStatusValue, RaceUser,
};
pub use types::{
    BOARD_CELLS, BOARD_SIZE, Board, Cell, ChatMessage, ChatSegment,
    ClientAction, ClientFrame, GenerationMode, Identity, RaceLinkStatus,
    RoomId, ServerMessage,
};

/// The literal liveness probe a client may send instead of a JSON frame.
pub const PING: &str = "ping";

/// The reply to [`PING`].
pub const PONG: &str = "pong";
