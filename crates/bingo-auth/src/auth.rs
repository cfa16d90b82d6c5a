//! The token authority hook.
//!
//! The room engine never stores who holds which token. Instead every
//! inbound frame carries a signed token and the dispatcher asks a
//! [`TokenAuthority`] to verify it. Swapping the implementation (a
//! different signing scheme, or a permissive one in tests) needs no
//! changes to the dispatcher.

use bingo_protocol::RoomId;
use uuid::Uuid;

use crate::{AuthError, RoomClaims};

/// Issues, verifies, and revokes per-room player tokens.
///
/// Owned by the dispatcher task, so methods take `&mut self` where state
/// changes and need no interior locking.
///
/// # Example
///
/// ```rust
/// use bingo_auth::{HmacTokenAuthority, TokenAuthority, TokenConfig};
/// use bingo_protocol::RoomId;
/// use uuid::Uuid;
///
/// let mut authority =
///     HmacTokenAuthority::new(b"secret", TokenConfig::default()).unwrap();
/// let uuid = Uuid::new_v4();
/// let token = authority.issue(uuid, &RoomId::new("happy-otter")).unwrap();
///
/// let claims = authority.verify(&token).unwrap();
/// assert_eq!(claims.uuid, uuid);
///
/// authority.revoke(&token);
/// assert!(authority.verify(&token).is_err());
/// ```
pub trait TokenAuthority: Send + 'static {
    /// Issues a token binding `uuid` to `room`.
    fn issue(&self, uuid: Uuid, room: &RoomId) -> Result<String, AuthError>;

    /// Checks signature, expiry, and revocation, returning the claims.
    fn verify(&self, token: &str) -> Result<RoomClaims, AuthError>;

    /// Revokes a token so later verification fails. Tokens that don't
    /// verify are ignored.
    fn revoke(&mut self, token: &str);

    /// Drops revocation entries for tokens that have expired anyway.
    /// Returns how many were purged.
    fn purge_expired(&mut self) -> usize;
}
