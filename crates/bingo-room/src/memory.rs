//! In-memory [`RoomStore`], [`GoalSource`], and [`RaceLinks`].
//!
//! Used by tests and by the standalone server when no database is
//! configured. All state sits behind one `std::sync::Mutex`; futures are
//! already resolved when returned.

use std::collections::HashMap;
use std::sync::Mutex;

use futures_util::future::{self, BoxFuture};
use time::OffsetDateTime;

use bingo_generator::Goal;
use bingo_protocol::{Board, GenerationMode, RoomId};
use bingo_race::{RaceError, RaceLinks};

use crate::config::RoomStatus;
use crate::error::StoreError;
use crate::store::{
    GoalSource, HistoryRecord, RoomMetadata, RoomStore, StorageId, StoredRoom,
};

#[derive(Default)]
struct Inner {
    rooms: HashMap<StorageId, (RoomMetadata, Board)>,
    history: Vec<HistoryRecord>,
    goals: HashMap<String, Vec<Goal>>,
}

impl Inner {
    fn room_by_slug(&mut self, id: &RoomId) -> Option<&mut RoomMetadata> {
        self.rooms
            .values_mut()
            .map(|(meta, _)| meta)
            .find(|meta| &meta.id == id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a room so that [`RoomStore::load_rooms`] returns it.
    pub fn insert_room(&self, meta: RoomMetadata, board: Board) {
        self.lock().rooms.insert(meta.storage_id, (meta, board));
    }

    /// Sets the goal pool for a game.
    pub fn set_goals(&self, game_slug: impl Into<String>, goals: Vec<Goal>) {
        self.lock().goals.insert(game_slug.into(), goals);
    }

    /// History for one room, oldest first.
    pub fn history(&self, room: StorageId) -> Vec<HistoryRecord> {
        self.lock()
            .history
            .iter()
            .filter(|record| record.room == room)
            .cloned()
            .collect()
    }

    pub fn room(&self, room: StorageId) -> Option<(RoomMetadata, Board)> {
        self.lock().rooms.get(&room).cloned()
    }

    fn set_status(&self, room: StorageId, status: RoomStatus) -> Result<(), StoreError> {
        match self.lock().rooms.get_mut(&room) {
            Some((meta, _)) => {
                meta.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("room {room}"))),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-write.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RoomStore for MemoryStore {
    fn create_room(
        &self,
        meta: RoomMetadata,
        board: Board,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        self.insert_room(meta, board);
        Box::pin(future::ready(Ok(())))
    }

    fn append_history(
        &self,
        record: HistoryRecord,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        self.lock().history.push(record);
        Box::pin(future::ready(Ok(())))
    }

    fn save_board(
        &self,
        room: StorageId,
        board: Board,
        mode: GenerationMode,
        generated_at: OffsetDateTime,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        let result = match self.lock().rooms.get_mut(&room) {
            Some((meta, stored)) => {
                *stored = board;
                meta.generation_mode = mode;
                meta.board_generated_at = generated_at;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("room {room}"))),
        };
        Box::pin(future::ready(result))
    }

    fn mark_inactive(
        &self,
        room: StorageId,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        Box::pin(future::ready(self.set_status(room, RoomStatus::Inactive)))
    }

    fn mark_active(
        &self,
        room: StorageId,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        Box::pin(future::ready(self.set_status(room, RoomStatus::Active)))
    }

    fn load_rooms(&self) -> BoxFuture<'static, Result<Vec<StoredRoom>, StoreError>> {
        let inner = self.lock();
        let mut rooms: Vec<StoredRoom> = inner
            .rooms
            .values()
            .map(|(meta, board)| StoredRoom {
                meta: meta.clone(),
                board: board.clone(),
                history: inner
                    .history
                    .iter()
                    .filter(|record| record.room == meta.storage_id)
                    .cloned()
                    .collect(),
            })
            .collect();
        rooms.sort_by_key(|room| room.meta.storage_id);
        Box::pin(future::ready(Ok(rooms)))
    }
}

impl GoalSource for MemoryStore {
    fn goals(
        &self,
        game_slug: &str,
    ) -> BoxFuture<'static, Result<Vec<Goal>, StoreError>> {
        let result = self
            .lock()
            .goals
            .get(game_slug)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("goals for {game_slug}")));
        Box::pin(future::ready(result))
    }
}

impl RaceLinks for MemoryStore {
    fn linked(
        &self,
        room: &RoomId,
        url: &str,
    ) -> BoxFuture<'static, Result<(), RaceError>> {
        let result = match self.lock().room_by_slug(room) {
            Some(meta) => {
                meta.race_url = Some(url.to_owned());
                Ok(())
            }
            None => Err(RaceError::Persistence(format!("room {room} not stored"))),
        };
        Box::pin(future::ready(result))
    }

    fn unlinked(&self, room: &RoomId) -> BoxFuture<'static, Result<(), RaceError>> {
        if let Some(meta) = self.lock().room_by_slug(room) {
            meta.race_url = None;
        }
        Box::pin(future::ready(Ok(())))
    }
}
