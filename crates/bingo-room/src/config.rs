//! Room configuration and activity status.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration shared by every room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Marker color given to players on their first join.
    pub default_color: String,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            default_color: "blue".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// Whether a room is in use.
///
/// Rooms are never removed from memory. An idle room is flagged
/// inactive by the sweep, and any later action flips it back:
///
/// ```text
/// Active ──(sweep: idle)──→ Inactive ──(any action)──→ Active
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    #[default]
    Active,
    Inactive,
}

impl RoomStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_config_default_color() {
        assert_eq!(RoomConfig::default().default_color, "blue");
    }

    #[test]
    fn test_room_status_default_is_active() {
        assert!(RoomStatus::default().is_active());
        assert!(!RoomStatus::Inactive.is_active());
    }

    #[test]
    fn test_room_status_display() {
        assert_eq!(RoomStatus::Active.to_string(), "active");
        assert_eq!(RoomStatus::Inactive.to_string(), "inactive");
    }
}
