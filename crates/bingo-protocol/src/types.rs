//! Core protocol types for the bingo wire format.
//!
//! Every type here travels "on the wire": it is serialized to a JSON text
//! frame, sent to the browser, and parsed on the other side (or the
//! reverse for [`ClientFrame`]). The board types double as the room's
//! in-memory state, so what a room holds and what it sends never drift.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::race::RaceSnapshot;

/// Number of rows (and columns) on a board.
pub const BOARD_SIZE: usize = 5;

/// Number of cells on a board.
pub const BOARD_CELLS: usize = BOARD_SIZE * BOARD_SIZE;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The stable external identifier of a room: an opaque slug such as
/// `"happy-otter"` that appears in connection targets and tokens.
///
/// `#[serde(transparent)]` serializes this as the bare string.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wraps a slug.
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    /// Returns the slug.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(slug: &str) -> Self {
        Self::new(slug)
    }
}

/// A player's presence in a room: what others see them as.
///
/// Keyed by the uuid carried in the player's room token. Identities
/// outlive connections, so a reconnecting player keeps their nickname and
/// color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub nickname: String,
    pub color: String,
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// One square of the board.
///
/// `colors` is a `BTreeSet`, so marker colors are always unique and always
/// serialized in ascending lexicographic order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub goal: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub colors: BTreeSet<String>,
}

impl Cell {
    /// Creates an unmarked cell for a goal.
    pub fn new(goal: impl Into<String>, description: Option<String>) -> Self {
        Self {
            goal: goal.into(),
            description,
            colors: BTreeSet::new(),
        }
    }

    /// Adds a marker color. Returns `false` if the color was already
    /// present.
    pub fn mark(&mut self, color: &str) -> bool {
        if self.colors.contains(color) {
            return false;
        }
        self.colors.insert(color.to_owned())
    }

    /// Removes a marker color. Returns `false` if it wasn't present.
    pub fn unmark(&mut self, color: &str) -> bool {
        self.colors.remove(color)
    }

    /// Whether this is a blank filler cell (no goal).
    pub fn is_blank(&self) -> bool {
        self.goal.is_empty()
    }
}

/// A 5×5 grid of cells, serialized as an array of five rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    rows: [[Cell; BOARD_SIZE]; BOARD_SIZE],
}

impl Board {
    /// Tiles cells into a board in row-major order.
    ///
    /// Fewer than 25 cells leaves the remaining squares blank.
    ///
    /// # Errors
    /// Returns `ProtocolError::InvalidMessage` for more than 25 cells.
    pub fn from_cells(
        cells: impl IntoIterator<Item = Cell>,
    ) -> Result<Self, ProtocolError> {
        let mut board = Self::default();
        for (index, cell) in cells.into_iter().enumerate() {
            if index >= BOARD_CELLS {
                return Err(ProtocolError::InvalidMessage(format!(
                    "a board holds at most {BOARD_CELLS} cells"
                )));
            }
            board.rows[index / BOARD_SIZE][index % BOARD_SIZE] = cell;
        }
        Ok(board)
    }

    /// Returns the cell at `(row, col)`, or `None` when out of range.
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row)?.get(col)
    }

    /// Mutable access to the cell at `(row, col)`.
    pub fn cell_mut(&mut self, row: usize, col: usize) -> Option<&mut Cell> {
        self.rows.get_mut(row)?.get_mut(col)
    }

    /// Iterates over the rows.
    pub fn rows(&self) -> impl Iterator<Item = &[Cell; BOARD_SIZE]> {
        self.rows.iter()
    }

    /// Iterates over every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.rows.iter().flatten()
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// One piece of a chat line: plain text, or text drawn in a player's color.
///
/// `#[serde(untagged)]` means a plain segment is just a JSON string and a
/// colored one is `{"text": ..., "color": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatSegment {
    Text(String),
    Colored { text: String, color: String },
}

impl ChatSegment {
    /// The segment's text without color.
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) | Self::Colored { text, .. } => text,
        }
    }
}

/// An ordered sequence of segments making up one line of chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatMessage(pub Vec<ChatSegment>);

impl ChatMessage {
    /// Starts a line with a player's nickname drawn in their color.
    pub fn from_player(identity: &Identity) -> Self {
        Self(vec![ChatSegment::Colored {
            text: identity.nickname.clone(),
            color: identity.color.clone(),
        }])
    }

    /// Appends a plain text segment.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.0.push(ChatSegment::Text(text.into()));
        self
    }

    /// Appends a colored segment.
    pub fn colored(
        mut self,
        text: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        self.0.push(ChatSegment::Colored {
            text: text.into(),
            color: color.into(),
        });
        self
    }

    /// The line with all colors stripped.
    pub fn plain_text(&self) -> String {
        self.0.iter().map(ChatSegment::text).collect()
    }
}

// ---------------------------------------------------------------------------
// Generation mode
// ---------------------------------------------------------------------------

/// How a board's goals are chosen and placed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub enum GenerationMode {
    /// Uniform shuffle of the goal pool.
    #[default]
    #[serde(rename = "RANDOM")]
    Random,
    /// Difficulty-balanced placement: every line has the same sum.
    #[serde(rename = "SRLv5")]
    Balanced,
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => f.write_str("RANDOM"),
            Self::Balanced => f.write_str("SRLv5"),
        }
    }
}

// ---------------------------------------------------------------------------
// ClientFrame / ClientAction: browser → server
// ---------------------------------------------------------------------------

/// One inbound frame: an action plus the room token that authorizes it.
///
/// `#[serde(flatten)]` merges the action's fields into the same JSON
/// object, so the wire form is `{"action":"mark","row":1,"col":2,
/// "authToken":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(rename = "authToken", default)]
    pub auth_token: Option<String>,
    #[serde(flatten)]
    pub action: ClientAction,
}

/// Actions a player can take in a room.
///
/// Payload fields are all optional at the wire level: a frame that names
/// a valid action but leaves out its payload still decodes, and the room
/// treats it as a silent no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientAction {
    Join {
        #[serde(default)]
        nickname: Option<String>,
    },
    Leave,
    Mark {
        #[serde(default)]
        row: Option<u8>,
        #[serde(default)]
        col: Option<u8>,
    },
    Unmark {
        #[serde(default)]
        row: Option<u8>,
        #[serde(default)]
        col: Option<u8>,
    },
    Chat {
        #[serde(default)]
        message: Option<String>,
    },
    ChangeColor {
        #[serde(default)]
        color: Option<String>,
    },
    NewCard {
        #[serde(rename = "generationMode", default)]
        generation_mode: Option<GenerationMode>,
    },
}

impl ClientAction {
    /// The wire name of the action, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave => "leave",
            Self::Mark { .. } => "mark",
            Self::Unmark { .. } => "unmark",
            Self::Chat { .. } => "chat",
            Self::ChangeColor { .. } => "changeColor",
            Self::NewCard { .. } => "newCard",
        }
    }
}

// ---------------------------------------------------------------------------
// ServerMessage: server → browser
// ---------------------------------------------------------------------------

/// State of a room's link to an external race, as shown to players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaceLinkStatus {
    Disconnected,
    Linked,
    Live,
    /// The race service could not be reached; the link was dropped.
    Unreachable,
}

/// Messages a room sends to its players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// The frame's token was invalid or its uuid has no identity here.
    Unauthorized,

    /// Full snapshot sent to a player right after a successful join.
    Connected {
        board: Board,
        chat_history: Vec<ChatMessage>,
        nickname: String,
        color: String,
        room_name: String,
        game: String,
        game_slug: String,
        new_generation_mode: GenerationMode,
        race_status: RaceLinkStatus,
        race: Option<RaceSnapshot>,
    },

    /// Sent to a player who left; the connection closes afterwards.
    Disconnected,

    Chat {
        message: ChatMessage,
    },

    CellUpdate {
        row: u8,
        col: u8,
        cell: Cell,
    },

    SyncBoard {
        board: Board,
    },

    RaceUpdate {
        status: RaceLinkStatus,
        race: Option<RaceSnapshot>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cell_colors_serialize_sorted() {
        let mut cell = Cell::new("Beat the boss", None);
        assert!(cell.mark("red"));
        assert!(cell.mark("blue"));
        assert!(cell.mark("green"));
        assert!(!cell.mark("blue"));

        let value = serde_json::to_value(&cell).unwrap();
        assert_eq!(value["colors"], json!(["blue", "green", "red"]));
    }

    #[test]
    fn test_cell_unmark_absent_color() {
        let mut cell = Cell::new("goal", None);
        assert!(!cell.unmark("red"));
        cell.mark("red");
        assert!(cell.unmark("red"));
        assert!(cell.colors.is_empty());
    }

    #[test]
    fn test_board_from_cells_row_major() {
        let cells = (0..25).map(|i| Cell::new(format!("g{i}"), None));
        let board = Board::from_cells(cells).unwrap();

        assert_eq!(board.cell(0, 0).unwrap().goal, "g0");
        assert_eq!(board.cell(1, 0).unwrap().goal, "g5");
        assert_eq!(board.cell(4, 4).unwrap().goal, "g24");
        assert!(board.cell(5, 0).is_none());
        assert!(board.cell(0, 5).is_none());
    }

    #[test]
    fn test_board_from_fewer_cells_leaves_blanks() {
        let board =
            Board::from_cells((0..3).map(|i| Cell::new(i.to_string(), None)))
                .unwrap();
        assert_eq!(board.cells().filter(|c| !c.is_blank()).count(), 3);
        assert!(board.cell(4, 4).unwrap().is_blank());
    }

    #[test]
    fn test_board_from_too_many_cells_fails() {
        let result = Board::from_cells((0..26).map(|_| Cell::default()));
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_board_serializes_as_rows() {
        let value = serde_json::to_value(Board::default()).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.as_array().unwrap().len() == 5));
    }

    #[test]
    fn test_chat_message_wire_form() {
        let identity = Identity {
            nickname: "Ana".into(),
            color: "red".into(),
        };
        let message = ChatMessage::from_player(&identity).text(": hi");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!([{"text": "Ana", "color": "red"}, ": hi"])
        );
        assert_eq!(message.plain_text(), "Ana: hi");

        let back: ChatMessage =
            serde_json::from_value(json!(["x", {"text": "y", "color": "z"}]))
                .unwrap();
        assert_eq!(back.plain_text(), "xy");
    }

    #[test]
    fn test_generation_mode_wire_names() {
        assert_eq!(
            serde_json::to_value(GenerationMode::Random).unwrap(),
            json!("RANDOM")
        );
        assert_eq!(
            serde_json::to_value(GenerationMode::Balanced).unwrap(),
            json!("SRLv5")
        );
    }

    #[test]
    fn test_client_frame_join_without_nickname() {
        let frame: ClientFrame = serde_json::from_value(
            json!({"action": "join", "authToken": "tok"}),
        )
        .unwrap();
        assert_eq!(frame.action, ClientAction::Join { nickname: None });
    }

    #[test]
    fn test_client_frame_leave() {
        let frame: ClientFrame = serde_json::from_value(
            json!({"action": "leave", "authToken": "tok"}),
        )
        .unwrap();
        assert_eq!(frame.action, ClientAction::Leave);
    }

    #[test]
    fn test_client_frame_mark_missing_col() {
        let frame: ClientFrame = serde_json::from_value(
            json!({"action": "mark", "row": 2, "authToken": "tok"}),
        )
        .unwrap();
        assert_eq!(
            frame.action,
            ClientAction::Mark {
                row: Some(2),
                col: None
            }
        );
    }

    #[test]
    fn test_client_frame_new_card_mode() {
        let frame: ClientFrame = serde_json::from_value(json!({
            "action": "newCard",
            "generationMode": "SRLv5",
            "authToken": "tok"
        }))
        .unwrap();
        assert_eq!(
            frame.action,
            ClientAction::NewCard {
                generation_mode: Some(GenerationMode::Balanced)
            }
        );
        assert_eq!(frame.action.name(), "newCard");
    }

    #[test]
    fn test_client_frame_without_token() {
        let frame: ClientFrame =
            serde_json::from_value(json!({"action": "leave"})).unwrap();
        assert!(frame.auth_token.is_none());
    }

    #[test]
    fn test_server_message_cell_update_wire_form() {
        let mut cell = Cell::new("goal", Some("desc".into()));
        cell.mark("blue");
        let msg = ServerMessage::CellUpdate { row: 1, col: 4, cell };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "action": "cellUpdate",
                "row": 1,
                "col": 4,
                "cell": {"goal": "goal", "description": "desc", "colors": ["blue"]}
            })
        );
    }

    #[test]
    fn test_server_message_connected_uses_camel_case_fields() {
        let msg = ServerMessage::Connected {
            board: Board::default(),
            chat_history: vec![],
            nickname: "Ana".into(),
            color: "blue".into(),
            room_name: "Friday".into(),
            game: "Ocarina of Time".into(),
            game_slug: "oot".into(),
            new_generation_mode: GenerationMode::Balanced,
            race_status: RaceLinkStatus::Disconnected,
            race: None,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["action"], "connected");
        assert_eq!(value["roomName"], "Friday");
        assert_eq!(value["gameSlug"], "oot");
        assert_eq!(value["newGenerationMode"], "SRLv5");
        assert_eq!(value["raceStatus"], "disconnected");
        assert!(value["chatHistory"].as_array().unwrap().is_empty());
    }
}
