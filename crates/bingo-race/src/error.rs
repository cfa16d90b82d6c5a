//! Error types for the race sidecar.

/// Errors that can occur while linking to or talking with a race.
#[derive(Debug, thiserror::Error)]
pub enum RaceError {
    /// `connect` was called while a race is already linked.
    #[error("a race is already linked")]
    AlreadyLinked,

    /// The operation needs a linked race URL.
    #[error("no race is linked")]
    NotLinked,

    /// The operation needs an open, authenticated socket.
    #[error("race socket is not live")]
    NotLive,

    /// The race data request failed (network error or non-2xx status).
    #[error("race request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The push socket could not be opened or broke.
    #[error("race socket error: {0}")]
    Socket(String),

    /// The race document has no socket path.
    #[error("race has no socket url")]
    NoSocketUrl,

    /// The socket driver is gone.
    #[error("race socket closed")]
    Closed,

    /// A probe got no answer in time.
    #[error("race socket probe timed out")]
    ProbeTimeout,

    /// A control frame could not be serialized.
    #[error("failed to encode control frame: {0}")]
    Encode(#[source] serde_json::Error),

    /// The service couldn't be reached for another reason.
    #[error("race service unreachable: {0}")]
    Unreachable(String),

    /// Recording the link in the room store failed.
    #[error("failed to persist race link: {0}")]
    Persistence(String),
}
