//! Bingo rooms: state, handlers, history, and the registry.
//!
//! A [`Room`] holds one shared 5×5 board, the players in it, their chat
//! log, and an optional link to an external race. Players act on the room
//! through [`ClientAction`](bingo_protocol::ClientAction)s, which
//! [`Room::handle_action`] turns into zero or one [`Response`] plus any
//! narrative chat lines.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: every room, keyed by slug. Owned by one task.
//! - [`Room`]: a single room's state machine.
//! - [`RoomContext`]: collaborators shared by rooms (store writer, goal
//!   source, race service, event sink).
//! - [`RoomStore`] / [`GoalSource`]: the persistence seams.
//! - [`HistoryRecord`]: one persisted, replayable action.
//! - [`MemoryStore`]: an in-memory store for tests and local runs.
//!
//! # Flow
//!
//! ```text
//! dispatcher ──→ RoomRegistry::get_mut ──→ Room::handle_action ──→ Response
//!                                             │
//!                                             ├─→ StoreWriter (history, background)
//!                                             └─→ tokio::spawn (newCard, race I/O)
//!                                                    │
//! dispatcher ←── EventSink(RoomEvent) ←──────────────┘
//!      └──→ RoomRegistry::apply_event
//! ```

mod config;
mod error;
mod memory;
mod registry;
mod room;
mod store;

pub use config::{RoomConfig, RoomStatus};
pub use error::{RoomError, StoreError};
pub use memory::MemoryStore;
pub use registry::RoomRegistry;
pub use room::{
    EventSink, Outbound, PlayerConnection, Response, Room, RoomContext, RoomEvent,
    RoomEventKind,
};
pub use store::{
    ChangeColorPayload, ChatPayload, GoalSource, HistoryEntry, HistoryKind,
    HistoryRecord, JoinPayload, LeavePayload, MarkPayload, RoomMetadata, RoomStore,
    StorageId, StoreWriter, StoredRoom,
};
