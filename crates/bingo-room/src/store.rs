//! Persistence seams for rooms.
//!
//! Rooms never wait on storage. Everything a room writes goes through a
//! [`StoreWriter`], a cloneable handle to a background task that forwards
//! writes to a [`RoomStore`] in order and logs failures. Reads happen
//! outside the room:
//!
//! - At startup the server loads every stored room ([`RoomStore::load_rooms`])
//!   and rebuilds it from its history.
//! - Board regeneration asks a [`GoalSource`] for the game's goal pool from
//!   a spawned task.
//!
//! # History
//!
//! Every player-visible change is appended as a [`HistoryRecord`]: a kind
//! tag, a JSON payload, and a timestamp. Replaying a room's records in
//! order against its stored board reproduces its identities, markers, and
//! chat log.
//!
//! ```text
//! {"room":12,"kind":"MARK","payload":{"uuid":"…","row":2,"col":3,
//!  "color":"red","goal":"Beat the boss"},"createdAt":"2026-10-19T12:00:00Z"}
//! ```

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use uuid::Uuid;

use bingo_generator::Goal;
use bingo_protocol::{Board, GenerationMode, RoomId};

use crate::config::RoomStatus;
use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Room metadata
// ---------------------------------------------------------------------------

/// A room's row id in the external store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StorageId(i64);

impl StorageId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for StorageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything about a room except its players and board contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMetadata {
    /// Public slug, used in connection paths.
    pub id: RoomId,
    pub storage_id: StorageId,
    pub name: String,
    pub game: String,
    pub game_slug: String,
    /// Checked when a room token is requested.
    pub password: String,
    /// Mode used for the next `newCard` without an explicit mode.
    pub generation_mode: GenerationMode,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last time anything happened in the room.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// When the stored board was generated. Markers recorded before this
    /// belong to an older board.
    #[serde(with = "time::serde::rfc3339")]
    pub board_generated_at: OffsetDateTime,
    #[serde(default)]
    pub status: RoomStatus,
    #[serde(default)]
    pub race_url: Option<String>,
}

impl RoomMetadata {
    /// Metadata for a room created now.
    pub fn new(
        id: RoomId,
        storage_id: StorageId,
        name: impl Into<String>,
        game: impl Into<String>,
        game_slug: impl Into<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            storage_id,
            name: name.into(),
            game: game.into(),
            game_slug: game_slug.into(),
            password: String::new(),
            generation_mode: GenerationMode::default(),
            created_at: now,
            updated_at: now,
            board_generated_at: now,
            status: RoomStatus::Active,
            race_url: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_generation_mode(mut self, mode: GenerationMode) -> Self {
        self.generation_mode = mode;
        self
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Kind tag of a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HistoryKind {
    Join,
    Leave,
    Mark,
    Unmark,
    Chat,
    ChangeColor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPayload {
    pub uuid: Uuid,
    pub nickname: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeavePayload {
    pub uuid: Uuid,
}

/// Payload of both MARK and UNMARK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPayload {
    pub uuid: Uuid,
    pub row: u8,
    pub col: u8,
    pub color: String,
    #[serde(default)]
    pub goal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub uuid: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeColorPayload {
    pub uuid: Uuid,
    pub color: String,
}

/// A typed history entry, before it is stamped and stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEntry {
    Join(JoinPayload),
    Leave(LeavePayload),
    Mark(MarkPayload),
    Unmark(MarkPayload),
    Chat(ChatPayload),
    ChangeColor(ChangeColorPayload),
}

impl HistoryEntry {
    pub fn kind(&self) -> HistoryKind {
        match self {
            Self::Join(_) => HistoryKind::Join,
            Self::Leave(_) => HistoryKind::Leave,
            Self::Mark(_) => HistoryKind::Mark,
            Self::Unmark(_) => HistoryKind::Unmark,
            Self::Chat(_) => HistoryKind::Chat,
            Self::ChangeColor(_) => HistoryKind::ChangeColor,
        }
    }

    /// Stamps the entry for storage.
    pub fn into_record(
        self,
        room: StorageId,
        created_at: OffsetDateTime,
    ) -> Result<HistoryRecord, StoreError> {
        let kind = self.kind();
        let payload = match self {
            Self::Join(p) => serde_json::to_value(p)?,
            Self::Leave(p) => serde_json::to_value(p)?,
            Self::Mark(p) | Self::Unmark(p) => serde_json::to_value(p)?,
            Self::Chat(p) => serde_json::to_value(p)?,
            Self::ChangeColor(p) => serde_json::to_value(p)?,
        };
        Ok(HistoryRecord {
            room,
            kind,
            payload,
            created_at,
        })
    }
}

/// One stored history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub room: StorageId,
    pub kind: HistoryKind,
    pub payload: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl HistoryRecord {
    /// Decodes the payload according to the record's kind.
    ///
    /// # Errors
    /// [`StoreError::Payload`] when the payload doesn't match the kind.
    pub fn entry(&self) -> Result<HistoryEntry, StoreError> {
        let payload = self.payload.clone();
        Ok(match self.kind {
            HistoryKind::Join => HistoryEntry::Join(serde_json::from_value(payload)?),
            HistoryKind::Leave => {
                HistoryEntry::Leave(serde_json::from_value(payload)?)
            }
            HistoryKind::Mark => HistoryEntry::Mark(serde_json::from_value(payload)?),
            HistoryKind::Unmark => {
                HistoryEntry::Unmark(serde_json::from_value(payload)?)
            }
            HistoryKind::Chat => HistoryEntry::Chat(serde_json::from_value(payload)?),
            HistoryKind::ChangeColor => {
                HistoryEntry::ChangeColor(serde_json::from_value(payload)?)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Store traits
// ---------------------------------------------------------------------------

/// A room as loaded from storage.
#[derive(Debug, Clone)]
pub struct StoredRoom {
    pub meta: RoomMetadata,
    pub board: Board,
    /// Ordered oldest first.
    pub history: Vec<HistoryRecord>,
}

/// The external room store.
///
/// Futures are boxed and `'static` so implementations can be shared as
/// `Arc<dyn RoomStore>` and driven from spawned tasks.
pub trait RoomStore: Send + Sync + 'static {
    /// Stores a newly opened room.
    fn create_room(
        &self,
        meta: RoomMetadata,
        board: Board,
    ) -> BoxFuture<'static, Result<(), StoreError>>;

    fn append_history(
        &self,
        record: HistoryRecord,
    ) -> BoxFuture<'static, Result<(), StoreError>>;

    /// Replaces a room's board after regeneration.
    fn save_board(
        &self,
        room: StorageId,
        board: Board,
        mode: GenerationMode,
        generated_at: OffsetDateTime,
    ) -> BoxFuture<'static, Result<(), StoreError>>;

    fn mark_inactive(
        &self,
        room: StorageId,
    ) -> BoxFuture<'static, Result<(), StoreError>>;

    /// Flags an inactive room as active again after new activity.
    fn mark_active(
        &self,
        room: StorageId,
    ) -> BoxFuture<'static, Result<(), StoreError>>;

    /// Every stored room, with its board and history.
    fn load_rooms(&self) -> BoxFuture<'static, Result<Vec<StoredRoom>, StoreError>>;
}

/// Supplies goal pools for board generation.
pub trait GoalSource: Send + Sync + 'static {
    fn goals(
        &self,
        game_slug: &str,
    ) -> BoxFuture<'static, Result<Vec<Goal>, StoreError>>;
}

// ---------------------------------------------------------------------------
// StoreWriter
// ---------------------------------------------------------------------------

enum StoreOp {
    Create(Box<(RoomMetadata, Board)>),
    History(HistoryRecord),
    Board {
        room: StorageId,
        board: Board,
        mode: GenerationMode,
        generated_at: OffsetDateTime,
    },
    Inactive(StorageId),
    Active(StorageId),
}

/// Fire-and-forget handle for room writes.
///
/// Writes are applied in the order they were queued. Failures are logged
/// and never reach the room.
#[derive(Clone)]
pub struct StoreWriter {
    tx: mpsc::UnboundedSender<StoreOp>,
}

impl StoreWriter {
    /// Spawns the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(store: Arc<dyn RoomStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store, rx));
        Self { tx }
    }

    pub fn create_room(&self, meta: RoomMetadata, board: Board) {
        self.queue(StoreOp::Create(Box::new((meta, board))));
    }

    pub fn append(&self, record: HistoryRecord) {
        self.queue(StoreOp::History(record));
    }

    pub fn save_board(
        &self,
        room: StorageId,
        board: Board,
        mode: GenerationMode,
        generated_at: OffsetDateTime,
    ) {
        self.queue(StoreOp::Board {
            room,
            board,
            mode,
            generated_at,
        });
    }

    pub fn mark_inactive(&self, room: StorageId) {
        self.queue(StoreOp::Inactive(room));
    }

    pub fn mark_active(&self, room: StorageId) {
        self.queue(StoreOp::Active(room));
    }

    fn queue(&self, op: StoreOp) {
        if self.tx.send(op).is_err() {
            tracing::warn!("store writer stopped, dropping write");
        }
    }
}

async fn run_writer(
    store: Arc<dyn RoomStore>,
    mut rx: mpsc::UnboundedReceiver<StoreOp>,
) {
    while let Some(op) = rx.recv().await {
        let (what, result) = match op {
            StoreOp::Create(room) => {
                let (meta, board) = *room;
                ("create", store.create_room(meta, board).await)
            }
            StoreOp::History(record) => {
                ("history", store.append_history(record).await)
            }
            StoreOp::Board {
                room,
                board,
                mode,
                generated_at,
            } => (
                "board",
                store.save_board(room, board, mode, generated_at).await,
            ),
            StoreOp::Inactive(room) => ("inactive", store.mark_inactive(room).await),
            StoreOp::Active(room) => ("active", store.mark_active(room).await),
        };
        if let Err(e) = result {
            tracing::warn!(write = what, error = %e, "store write failed");
        }
    }
    tracing::debug!("store writer finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn uuid() -> Uuid {
        Uuid::from_u128(0x1234)
    }

    #[test]
    fn test_history_kind_wire_names() {
        assert_eq!(
            serde_json::to_value(HistoryKind::ChangeColor).unwrap(),
            json!("CHANGECOLOR")
        );
        assert_eq!(serde_json::to_value(HistoryKind::Join).unwrap(), json!("JOIN"));
    }

    #[test]
    fn test_history_record_typed_entry() {
        let entry = HistoryEntry::Mark(MarkPayload {
            uuid: uuid(),
            row: 2,
            col: 3,
            color: "red".into(),
            goal: "Beat the boss".into(),
        });
        let record = entry
            .clone()
            .into_record(StorageId::new(12), datetime!(2026-10-19 12:00 UTC))
            .unwrap();
        assert_eq!(record.kind, HistoryKind::Mark);
        assert_eq!(record.payload["row"], json!(2));
        assert_eq!(record.entry().unwrap(), entry);
    }

    #[test]
    fn test_history_record_json_shape() {
        let record = HistoryEntry::Leave(LeavePayload { uuid: uuid() })
            .into_record(StorageId::new(3), datetime!(2026-10-19 12:00 UTC))
            .unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["room"], json!(3));
        assert_eq!(value["kind"], json!("LEAVE"));
        assert_eq!(value["createdAt"], json!("2026-10-19T12:00:00Z"));
    }

    #[test]
    fn test_history_record_mismatched_payload() {
        let record = HistoryRecord {
            room: StorageId::new(1),
            kind: HistoryKind::Chat,
            payload: json!({"uuid": uuid()}),
            created_at: datetime!(2026-10-19 12:00 UTC),
        };
        assert!(matches!(record.entry(), Err(StoreError::Payload(_))));
    }

    #[test]
    fn test_room_metadata_builders() {
        let meta = RoomMetadata::new(
            RoomId::new("happy-otter"),
            StorageId::new(1),
            "Friday race",
            "Ocarina of Time",
            "oot",
        )
        .with_password("hunter2")
        .with_generation_mode(GenerationMode::Balanced);
        assert_eq!(meta.password, "hunter2");
        assert_eq!(meta.generation_mode, GenerationMode::Balanced);
        assert!(meta.status.is_active());
        assert_eq!(meta.race_url, None);
    }
}
