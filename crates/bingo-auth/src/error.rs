//! Error types for the token layer.

/// Errors that can occur while issuing or verifying room tokens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token isn't `payload.signature`, or a part isn't valid
    /// base64url, or the payload isn't a claims document.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The signature doesn't match the payload. Either the token was
    /// tampered with or it was signed with another key.
    #[error("bad token signature")]
    BadSignature,

    /// The token's expiry has passed.
    #[error("token expired")]
    Expired,

    /// The token was revoked (the player left the room).
    #[error("token revoked")]
    Revoked,

    /// The signing key was rejected (e.g. empty).
    #[error("invalid signing key")]
    InvalidKey,

    /// The claims could not be serialized.
    #[error("failed to encode claims: {0}")]
    Encode(#[source] serde_json::Error),
}
