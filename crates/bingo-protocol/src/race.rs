//! Types exchanged with the external race-coordination service.
//!
//! The race service publishes a versioned JSON document per race. Rooms
//! relay it to players inside [`ServerMessage::RaceUpdate`], so the
//! snapshot lives in the protocol crate even though only the race sidecar
//! produces it.
//!
//! [`ServerMessage::RaceUpdate`]: crate::ServerMessage::RaceUpdate

use serde::{Deserialize, Serialize};

/// A race's lifecycle status as reported by the service.
///
/// Unrecognized values decode as [`Unknown`](Self::Unknown) rather than
/// failing the whole snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceStatusValue {
    Open,
    Invitational,
    Pending,
    InProgress,
    Finished,
    Cancelled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceStatus {
    pub value: RaceStatusValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceUser {
    pub name: String,
}

/// One participant's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceEntrant {
    pub user: RaceUser,
    pub status: EntrantStatus,
    #[serde(default)]
    pub place: Option<u32>,
    #[serde(default)]
    pub finish_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrantStatus {
    pub value: String,
}

/// A versioned race document.
///
/// The service bumps `version` on every change. Consumers only accept a
/// snapshot whose version is strictly greater than the one they hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub version: u64,
    #[serde(default)]
    pub name: String,
    pub status: RaceStatus,
    #[serde(default)]
    pub entrants: Vec<RaceEntrant>,
    /// Path of the service's bot socket for this race. Needed to open the
    /// push channel; never forwarded to players.
    #[serde(rename = "websocket_bot_url", default, skip_serializing)]
    pub socket_url: Option<String>,
}

impl RaceSnapshot {
    pub fn is_cancelled(&self) -> bool {
        self.status.value == RaceStatusValue::Cancelled
    }
}

/// Frames pushed by the race service over its socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RacePush {
    #[serde(rename = "race.data")]
    RaceData { race: RaceSnapshot },
    /// Chat, errors, and anything else the service sends.
    #[serde(other)]
    Other,
}

/// Control frames written to the race service socket.
///
/// Adjacently tagged: `{"action":"authenticate","data":{"oauth_token":..}}`
/// and `{"action":"join"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum RaceControl {
    Authenticate { oauth_token: String },
    Join,
}
