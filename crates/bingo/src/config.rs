//! Server configuration.

use std::time::Duration;

use bingo_auth::TokenConfig;
use bingo_room::RoomConfig;

/// Everything the server needs to know before it starts.
///
/// Every field has a default; override the ones you need:
///
/// ```rust
/// use std::time::Duration;
/// use bingo::ServerConfig;
///
/// let config = ServerConfig {
///     join_timeout: Duration::from_secs(2),
///     ..ServerConfig::default()
/// };
/// assert_eq!(config.sweep_interval, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// How long a new connection may stay without a valid `join`.
    pub join_timeout: Duration,
    /// How often rooms are checked for inactivity.
    pub sweep_interval: Duration,
    /// A room with no connections and no activity for this long is
    /// flagged inactive.
    pub inactivity_threshold: Duration,
    /// How often linked races are re-fetched and their sockets probed.
    pub race_refresh_interval: Duration,
    pub token: TokenConfig,
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            join_timeout: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(60),
            inactivity_threshold: Duration::from_secs(60 * 60),
            race_refresh_interval: Duration::from_secs(5 * 60),
            token: TokenConfig::default(),
            room: RoomConfig::default(),
        }
    }
}
