//! Room registry: every room the server knows about.
//!
//! The registry is a plain map owned by the dispatcher task. It never
//! removes rooms; an idle room is only flagged inactive by
//! [`RoomRegistry::sweep`].

use std::collections::HashMap;
use std::time::Duration;

use time::OffsetDateTime;

use bingo_protocol::{Board, RoomId};

use crate::error::RoomError;
use crate::room::{Room, RoomContext, RoomEvent};
use crate::store::{RoomMetadata, StoredRoom};

pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    ctx: RoomContext,
}

impl RoomRegistry {
    pub fn new(ctx: RoomContext) -> Self {
        Self {
            rooms: HashMap::new(),
            ctx,
        }
    }

    /// The context handed to every room.
    pub fn context(&self) -> &RoomContext {
        &self.ctx
    }

    /// Registers a freshly created room.
    ///
    /// # Errors
    /// [`RoomError::AlreadyExists`] if the slug is taken.
    pub fn open(
        &mut self,
        meta: RoomMetadata,
        board: Board,
    ) -> Result<&mut Room, RoomError> {
        let id = meta.id.clone();
        if self.rooms.contains_key(&id) {
            return Err(RoomError::AlreadyExists(id));
        }
        tracing::info!(room_id = %id, name = %meta.name, game = %meta.game_slug, "room opened");
        let room = Room::new(meta, board, self.ctx.clone());
        Ok(self.rooms.entry(id).or_insert(room))
    }

    /// Rebuilds stored rooms and reopens their race sockets. Rooms whose
    /// slug is already registered are skipped. Returns how many were
    /// added.
    pub fn rehydrate(&mut self, stored: Vec<StoredRoom>) -> usize {
        let mut added = 0;
        for StoredRoom {
            meta,
            board,
            history,
        } in stored
        {
            if self.rooms.contains_key(&meta.id) {
                tracing::warn!(room_id = %meta.id, "duplicate stored room skipped");
                continue;
            }
            let id = meta.id.clone();
            let mut room = Room::rehydrate(meta, board, &history, self.ctx.clone());
            if room.status().is_active() {
                room.resume_race();
            }
            tracing::debug!(room_id = %id, records = history.len(), "room rehydrated");
            self.rooms.insert(id, room);
            added += 1;
        }
        tracing::info!(rooms = added, "rooms rehydrated");
        added
    }

    pub fn get(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn get_mut(&mut self, id: &RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(id)
    }

    pub fn contains(&self, id: &RoomId) -> bool {
        self.rooms.contains_key(id)
    }

    /// Routes completed background work to its room. Returns `false`
    /// if the room is unknown.
    pub fn apply_event(&mut self, event: RoomEvent) -> bool {
        match self.rooms.get_mut(&event.room) {
            Some(room) => {
                room.apply_event(event.kind);
                true
            }
            None => {
                tracing::debug!(room_id = %event.room, "event for unknown room dropped");
                false
            }
        }
    }

    /// Flags every active room that is idle past `threshold`. Returns the
    /// rooms that became inactive.
    pub fn sweep(&mut self, now: OffsetDateTime, threshold: Duration) -> Vec<RoomId> {
        self.sweep_with(|room| room.is_idle(now, threshold))
    }

    /// Like [`sweep`](Self::sweep) with a custom idleness predicate.
    pub fn sweep_with(&mut self, mut idle: impl FnMut(&Room) -> bool) -> Vec<RoomId> {
        let mut swept = Vec::new();
        for (id, room) in &mut self.rooms {
            if room.status().is_active() && idle(room) && room.mark_inactive() {
                swept.push(id.clone());
            }
        }
        if !swept.is_empty() {
            tracing::info!(rooms = swept.len(), "inactive rooms swept");
        }
        swept
    }

    /// Refreshes every linked race. Returns how many refreshes started.
    pub fn refresh_races(&mut self) -> usize {
        self.rooms
            .values_mut()
            .filter(|room| room.race().is_some_and(|race| race.url().is_some()))
            .filter_map(|room| room.refresh_race().ok())
            .count()
    }

    pub fn room_ids(&self) -> impl Iterator<Item = &RoomId> {
        self.rooms.keys()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
