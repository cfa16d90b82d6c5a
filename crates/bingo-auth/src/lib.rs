//! Per-room player tokens for bingo rooms.
//!
//! A player who passes a room's password is handed a token binding their
//! uuid to that room. Every frame they send carries it:
//!
//! 1. **Issuing and verifying** ([`TokenAuthority`] trait,
//!    [`HmacTokenAuthority`]): signed claims checked without any lookup.
//! 2. **Revocation** ([`RevocationList`]): tokens of players who left
//!    stop working immediately, and entries are purged once the token
//!    would have expired anyway.
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatcher (above)  ← verifies every frame, revokes on leave
//!     ↕
//! Token layer (this crate)
//!     ↕
//! Protocol layer (below)  ← provides RoomId
//! ```

mod auth;
mod error;
mod revocation;
mod token;

pub use auth::TokenAuthority;
pub use error::AuthError;
pub use revocation::RevocationList;
pub use token::{HmacTokenAuthority, RoomClaims, TokenConfig};
