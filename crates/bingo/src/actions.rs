//! The race action surface.
//!
//! Race management is driven by requests outside the room socket (an
//! HTTP endpoint in a full deployment). The types here are transport
//! agnostic: a front end deserializes an [`ActionRequest`], passes it to
//! [`ServerHandle::action`](crate::ServerHandle::action), and serializes
//! the [`ActionResponse`].
//!
//! ```text
//! {"room":"happy-otter","action":"race/create","authToken":"…",
//!  "payload":{"url":"https://races.example/oot/brave-tingle-1234"}}
//!   → {"status":202}
//! ```
//!
//! A 2xx status only means the request was dispatched. The outcome
//! reaches players as `raceUpdate` broadcasts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use bingo_protocol::RoomId;

/// Request accepted and dispatched.
pub const STATUS_ACCEPTED: u16 = 202;
/// Unknown action or malformed payload.
pub const STATUS_BAD_REQUEST: u16 = 400;
/// Token missing, invalid, revoked, or expired.
pub const STATUS_UNAUTHORIZED: u16 = 401;
/// Token belongs to a different room.
pub const STATUS_FORBIDDEN: u16 = 403;
/// No such room.
pub const STATUS_NOT_FOUND: u16 = 404;
/// The race link is in the wrong state for this action.
pub const STATUS_CONFLICT: u16 = 409;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub room: RoomId,
    pub action: String,
    pub auth_token: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn accepted() -> Self {
        Self {
            status: STATUS_ACCEPTED,
            value: None,
            error: None,
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            value: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A parsed race action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RaceAction {
    Create { url: String },
    Join { token: String },
    Refresh,
    Disconnect,
}

#[derive(Deserialize)]
struct UrlPayload {
    url: String,
}

#[derive(Deserialize)]
struct TokenPayload {
    token: String,
}

impl RaceAction {
    /// Parses an action name and its payload.
    pub(crate) fn parse(
        action: &str,
        payload: Option<Value>,
    ) -> Result<Self, ActionResponse> {
        let payload = payload.unwrap_or(Value::Null);
        match action {
            "race/create" => {
                let UrlPayload { url } = decode(payload)?;
                if url.trim().is_empty() {
                    return Err(ActionResponse::error(
                        STATUS_BAD_REQUEST,
                        "race url is empty",
                    ));
                }
                Ok(Self::Create { url })
            }
            "race/join" => {
                let TokenPayload { token } = decode(payload)?;
                Ok(Self::Join { token })
            }
            "race/refresh" => Ok(Self::Refresh),
            "race/disconnect" => Ok(Self::Disconnect),
            other => Err(ActionResponse::error(
                STATUS_BAD_REQUEST,
                format!("unknown action {other:?}"),
            )),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, ActionResponse> {
    serde_json::from_value(payload).map_err(|e| {
        ActionResponse::error(STATUS_BAD_REQUEST, format!("invalid payload: {e}"))
    })
}
