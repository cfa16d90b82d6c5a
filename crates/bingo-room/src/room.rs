//! A single bingo room: board, players, chat, and race link.
//!
//! A [`Room`] is plain synchronous state. It is owned by the
//! [`RoomRegistry`](crate::RoomRegistry), which is owned by the server's
//! dispatcher task, so handlers run one at a time without locks.
//!
//! Anything that has to wait (goal fetches, history writes, race I/O)
//! runs in a spawned task. Results come back as [`RoomEvent`]s through
//! the room's [`EventSink`] and are applied with
//! [`Room::apply_event`].
//!
//! # Delivery
//!
//! Players are reached through [`PlayerConnection`]s, one per connected
//! uuid, each wrapping the sending half of a connection's outbound
//! channel:
//!
//! ```text
//! handler ──→ Response::Reply ─────→ caller only
//!         └─→ Response::Broadcast ─→ every open connection
//! narrative chat lines ────────────→ every open connection
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use uuid::Uuid;

use bingo_generator::Goal;
use bingo_protocol::{
    Board, Cell, ChatMessage, ClientAction, GenerationMode, Identity,
    RaceLinkStatus, RoomId, ServerMessage,
};
use bingo_race::{
    Notifier, RaceError, RaceEvent, RaceLinks, RaceService, RaceSidecar,
    RaceState,
};
use bingo_transport::{CloseReason, ConnectionId};

use crate::config::{RoomConfig, RoomStatus};
use crate::error::RoomError;
use crate::store::{
    ChangeColorPayload, ChatPayload, GoalSource, HistoryEntry, HistoryRecord,
    JoinPayload, LeavePayload, MarkPayload, RoomMetadata, StoreWriter,
};

// ---------------------------------------------------------------------------
// Outbound delivery
// ---------------------------------------------------------------------------

/// Something a connection's writer task should do.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A message shared by every recipient of a broadcast.
    Message(Arc<ServerMessage>),
    /// A raw text frame (the `pong` reply).
    Text(String),
    /// Close the connection.
    Close(CloseReason),
}

/// The live transport handle for one player.
#[derive(Debug, Clone)]
pub struct PlayerConnection {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<Outbound>,
}

impl PlayerConnection {
    pub fn new(id: ConnectionId, sender: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { id, sender }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues an outbound item. Returns `false` if the writer is gone.
    pub fn send(&self, outbound: Outbound) -> bool {
        self.sender.send(outbound).is_ok()
    }

    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// The result of a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Sent to the caller only.
    Reply(ServerMessage),
    /// Sent to every open connection.
    Broadcast(ServerMessage),
}

// ---------------------------------------------------------------------------
// Events and context
// ---------------------------------------------------------------------------

/// Completed background work, addressed to a room.
pub struct RoomEvent {
    pub room: RoomId,
    pub kind: RoomEventKind,
}

pub enum RoomEventKind {
    /// A `newCard` finished. `Err` carries the reason for the log.
    BoardGenerated {
        mode: GenerationMode,
        result: Result<Vec<Goal>, String>,
    },
    Race(RaceEvent),
}

/// Where rooms post [`RoomEvent`]s. The server maps these into its own
/// event queue.
pub type EventSink = Arc<dyn Fn(RoomEvent) + Send + Sync>;

/// Collaborators shared by every room.
#[derive(Clone)]
pub struct RoomContext {
    pub store: StoreWriter,
    pub goals: Arc<dyn GoalSource>,
    pub races: Arc<dyn RaceService>,
    pub race_links: Arc<dyn RaceLinks>,
    pub events: EventSink,
    pub config: RoomConfig,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

pub struct Room {
    meta: RoomMetadata,
    board: Board,
    identities: HashMap<Uuid, Identity>,
    connections: HashMap<Uuid, PlayerConnection>,
    chat: Vec<ChatMessage>,
    race: Option<RaceSidecar>,
    ctx: RoomContext,
}

impl Room {
    /// A freshly created room with no players.
    pub fn new(meta: RoomMetadata, board: Board, ctx: RoomContext) -> Self {
        Self {
            meta,
            board,
            identities: HashMap::new(),
            connections: HashMap::new(),
            chat: Vec::new(),
            race: None,
            ctx,
        }
    }

    /// Rebuilds a room from its stored board and ordered history.
    ///
    /// Identities, chat log, and cell markers are replayed. Nothing is
    /// written back to the store. Marker records older than the stored
    /// board belong to a previous board and only contribute chat lines.
    /// A persisted race link is restored but its socket is not opened;
    /// see [`resume_race`](Self::resume_race).
    pub fn rehydrate(
        meta: RoomMetadata,
        board: Board,
        history: &[HistoryRecord],
        ctx: RoomContext,
    ) -> Self {
        let mut room = Self::new(meta, board, ctx);
        for record in history {
            match record.entry() {
                Ok(entry) => {
                    let current = record.created_at >= room.meta.board_generated_at;
                    room.replay(entry, current);
                }
                Err(e) => {
                    tracing::debug!(
                        room_id = %room.meta.id,
                        kind = ?record.kind,
                        error = %e,
                        "skipping unreadable history record"
                    );
                }
            }
            if record.created_at > room.meta.updated_at {
                room.meta.updated_at = record.created_at;
            }
        }

        if let Some(url) = room.meta.race_url.clone() {
            if let Err(e) = room.sidecar().restore(url) {
                tracing::warn!(room_id = %room.meta.id, error = %e, "race link not restored");
            }
        }
        room
    }

    fn replay(&mut self, entry: HistoryEntry, current_board: bool) {
        match entry {
            HistoryEntry::Join(p) => {
                let identity = Identity {
                    nickname: p.nickname,
                    color: p.color,
                };
                self.chat.push(joined_line(&identity));
                self.identities.insert(p.uuid, identity);
            }
            HistoryEntry::Leave(p) => {
                if let Some(identity) = self.identities.remove(&p.uuid) {
                    self.chat.push(left_line(&identity));
                }
            }
            HistoryEntry::Mark(p) => {
                if current_board {
                    if let Some(cell) = self.board.cell_mut(p.row.into(), p.col.into()) {
                        cell.mark(&p.color);
                    }
                }
                if let Some(identity) = self.identities.get(&p.uuid) {
                    self.chat.push(marker_line(identity, &p, true));
                }
            }
            HistoryEntry::Unmark(p) => {
                if current_board {
                    if let Some(cell) = self.board.cell_mut(p.row.into(), p.col.into()) {
                        cell.unmark(&p.color);
                    }
                }
                if let Some(identity) = self.identities.get(&p.uuid) {
                    self.chat.push(marker_line(identity, &p, false));
                }
            }
            HistoryEntry::Chat(p) => {
                if let Some(identity) = self.identities.get(&p.uuid) {
                    self.chat.push(chat_line(identity, &p.message));
                }
            }
            HistoryEntry::ChangeColor(p) => {
                if let Some(identity) = self.identities.get_mut(&p.uuid) {
                    let line = color_line(identity, &p.color);
                    identity.color = p.color;
                    self.chat.push(line);
                }
            }
        }
    }

    // -- Accessors ---------------------------------------------------------

    pub fn id(&self) -> &RoomId {
        &self.meta.id
    }

    pub fn meta(&self) -> &RoomMetadata {
        &self.meta
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn chat_history(&self) -> &[ChatMessage] {
        &self.chat
    }

    pub fn identity(&self, uuid: &Uuid) -> Option<&Identity> {
        self.identities.get(uuid)
    }

    pub fn player_count(&self) -> usize {
        self.identities.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_connected(&self, uuid: &Uuid) -> bool {
        self.connections.contains_key(uuid)
    }

    pub fn status(&self) -> RoomStatus {
        self.meta.status
    }

    pub fn race(&self) -> Option<&RaceSidecar> {
        self.race.as_ref()
    }

    pub fn race_status(&self) -> RaceLinkStatus {
        self.race
            .as_ref()
            .map_or(RaceLinkStatus::Disconnected, RaceSidecar::link_status)
    }

    /// Checks a join password.
    pub fn password_matches(&self, password: &str) -> bool {
        self.meta.password == password
    }

    // -- Actions -----------------------------------------------------------

    /// Handles one authorized action from `uuid`, arriving on `caller`.
    pub fn handle_action(
        &mut self,
        uuid: Uuid,
        action: ClientAction,
        caller: &PlayerConnection,
    ) -> Option<Response> {
        if let ClientAction::Join { nickname } = action {
            return self.join(uuid, nickname, caller);
        }
        let Some(identity) = self.identities.get(&uuid).cloned() else {
            return Some(Response::Reply(ServerMessage::Unauthorized));
        };
        if let ClientAction::Mark { row, col } | ClientAction::Unmark { row, col } = action {
            // Malformed cells are dropped without counting as activity.
            let (row, col) = (row?, col?);
            self.board.cell(row.into(), col.into())?;
        }
        self.touch();

        match action {
            ClientAction::Join { .. } => None,
            ClientAction::Leave => self.leave(uuid),
            ClientAction::Mark { row, col } => {
                self.mark(uuid, &identity, row?, col?)
            }
            ClientAction::Unmark { row, col } => {
                self.unmark(uuid, &identity, row?, col?)
            }
            ClientAction::Chat { message } => self.chat(uuid, &identity, message),
            ClientAction::ChangeColor { color } => {
                self.change_color(uuid, color)
            }
            ClientAction::NewCard { generation_mode } => {
                self.new_card(generation_mode)
            }
        }
    }

    fn join(
        &mut self,
        uuid: Uuid,
        nickname: Option<String>,
        caller: &PlayerConnection,
    ) -> Option<Response> {
        let identity = match self.identities.get(&uuid) {
            Some(identity) => identity.clone(),
            None => {
                let Some(nickname) =
                    nickname.filter(|nickname| !nickname.trim().is_empty())
                else {
                    return Some(Response::Reply(ServerMessage::Unauthorized));
                };
                let identity = Identity {
                    nickname,
                    color: self.ctx.config.default_color.clone(),
                };
                self.record(HistoryEntry::Join(JoinPayload {
                    uuid,
                    nickname: identity.nickname.clone(),
                    color: identity.color.clone(),
                }));
                // Broadcast before registering so the joiner only sees the
                // line inside its snapshot.
                self.narrate(joined_line(&identity));
                self.identities.insert(uuid, identity.clone());
                identity
            }
        };
        self.touch();

        // A connection speaks for one player at a time.
        self.connections
            .retain(|other, connection| *other == uuid || connection.id() != caller.id());

        if let Some(previous) = self.connections.insert(uuid, caller.clone()) {
            tracing::debug!(
                room_id = %self.meta.id,
                %uuid,
                old = %previous.id(),
                new = %caller.id(),
                "connection replaced"
            );
        }
        tracing::info!(room_id = %self.meta.id, %uuid, nickname = %identity.nickname, "player joined");
        Some(Response::Reply(self.connected(&identity)))
    }

    fn leave(&mut self, uuid: Uuid) -> Option<Response> {
        let identity = self.identities.remove(&uuid)?;
        self.connections.remove(&uuid);
        self.record(HistoryEntry::Leave(LeavePayload { uuid }));
        self.narrate(left_line(&identity));
        tracing::info!(room_id = %self.meta.id, %uuid, "player left");
        Some(Response::Reply(ServerMessage::Disconnected))
    }

    fn mark(
        &mut self,
        uuid: Uuid,
        identity: &Identity,
        row: u8,
        col: u8,
    ) -> Option<Response> {
        let cell = self.board.cell_mut(row.into(), col.into())?;
        if !cell.mark(&identity.color) {
            return None;
        }
        let cell = cell.clone();
        let payload = MarkPayload {
            uuid,
            row,
            col,
            color: identity.color.clone(),
            goal: cell.goal.clone(),
        };
        self.narrate(marker_line(identity, &payload, true));
        self.record(HistoryEntry::Mark(payload));
        Some(Response::Broadcast(ServerMessage::CellUpdate { row, col, cell }))
    }

    fn unmark(
        &mut self,
        uuid: Uuid,
        identity: &Identity,
        row: u8,
        col: u8,
    ) -> Option<Response> {
        let cell = self.board.cell_mut(row.into(), col.into())?;
        if !cell.unmark(&identity.color) {
            return None;
        }
        let cell = cell.clone();
        let payload = MarkPayload {
            uuid,
            row,
            col,
            color: identity.color.clone(),
            goal: cell.goal.clone(),
        };
        self.narrate(marker_line(identity, &payload, false));
        self.record(HistoryEntry::Unmark(payload));
        Some(Response::Broadcast(ServerMessage::CellUpdate { row, col, cell }))
    }

    fn chat(
        &mut self,
        uuid: Uuid,
        identity: &Identity,
        message: Option<String>,
    ) -> Option<Response> {
        let message = message.filter(|message| !message.trim().is_empty())?;
        let line = chat_line(identity, &message);
        self.chat.push(line.clone());
        self.record(HistoryEntry::Chat(ChatPayload { uuid, message }));
        Some(Response::Broadcast(ServerMessage::Chat { message: line }))
    }

    fn change_color(&mut self, uuid: Uuid, color: Option<String>) -> Option<Response> {
        let color = color.filter(|color| !color.trim().is_empty())?;
        let identity = self.identities.get_mut(&uuid)?;
        if identity.color == color {
            return None;
        }
        let line = color_line(identity, &color);
        identity.color = color.clone();
        self.record(HistoryEntry::ChangeColor(ChangeColorPayload { uuid, color }));
        self.narrate(line);
        None
    }

    /// Starts regenerating the board. The result arrives later as
    /// [`RoomEventKind::BoardGenerated`].
    fn new_card(&mut self, mode: Option<GenerationMode>) -> Option<Response> {
        let mode = mode.unwrap_or(self.meta.generation_mode);
        let goals = Arc::clone(&self.ctx.goals);
        let events = Arc::clone(&self.ctx.events);
        let room = self.meta.id.clone();
        let game_slug = self.meta.game_slug.clone();
        tracing::debug!(room_id = %room, %mode, "generating board");

        tokio::spawn(async move {
            let result = match goals.goals(&game_slug).await {
                Ok(pool) => {
                    bingo_generator::generate(&pool, mode).map_err(|e| e.to_string())
                }
                Err(e) => Err(e.to_string()),
            };
            events(RoomEvent {
                room,
                kind: RoomEventKind::BoardGenerated { mode, result },
            });
        });
        None
    }

    // -- Background results ------------------------------------------------

    /// Applies completed background work to the room.
    pub fn apply_event(&mut self, kind: RoomEventKind) {
        match kind {
            RoomEventKind::BoardGenerated {
                mode,
                result: Ok(goals),
            } => match Board::from_cells(goals.into_iter().map(Cell::from)) {
                Ok(board) => self.replace_board(board, mode),
                Err(e) => {
                    tracing::warn!(room_id = %self.meta.id, error = %e, "generated board rejected");
                }
            },
            RoomEventKind::BoardGenerated {
                mode,
                result: Err(reason),
            } => {
                tracing::warn!(room_id = %self.meta.id, %mode, %reason, "board generation failed");
            }
            RoomEventKind::Race(event) => {
                let Some(race) = self.race.as_mut() else {
                    return;
                };
                let notice = race.handle_event(event);
                if race.state() == RaceState::Disconnected {
                    self.meta.race_url = None;
                }
                if let Some(notice) = notice {
                    self.broadcast(notice.into_message());
                }
            }
        }
    }

    fn replace_board(&mut self, board: Board, mode: GenerationMode) {
        let now = OffsetDateTime::now_utc();
        self.board = board;
        self.meta.generation_mode = mode;
        self.meta.board_generated_at = now;
        self.touch();
        self.ctx
            .store
            .save_board(self.meta.storage_id, self.board.clone(), mode, now);
        tracing::info!(room_id = %self.meta.id, %mode, "board regenerated");
        self.broadcast(ServerMessage::SyncBoard {
            board: self.board.clone(),
        });
    }

    // -- Race link ---------------------------------------------------------

    /// Links a race and starts opening its socket.
    ///
    /// # Errors
    /// [`RoomError::Race`] when the room is already linked.
    pub fn link_race(&mut self, url: &str) -> Result<(), RoomError> {
        let race = self.sidecar();
        race.connect(url)?;
        race.connect_socket()?;
        let notice = race.notice();
        self.meta.race_url = Some(url.to_owned());
        self.touch();
        self.broadcast(notice.into_message());
        Ok(())
    }

    /// Joins a player's race account to the linked race.
    ///
    /// # Errors
    /// [`RoomError::Race`] unless the race socket is live.
    pub fn join_race(&mut self, token: &str) -> Result<(), RoomError> {
        self.race.as_ref().ok_or(RaceError::NotLive)?.join_user(token)?;
        self.touch();
        Ok(())
    }

    /// Re-fetches the linked race in the background.
    ///
    /// # Errors
    /// [`RoomError::Race`] when no race is linked.
    pub fn refresh_race(&mut self) -> Result<(), RoomError> {
        self.race.as_mut().ok_or(RaceError::NotLinked)?.refresh()?;
        Ok(())
    }

    /// Drops the race link. Returns `false` if there was none.
    pub fn unlink_race(&mut self) -> bool {
        let Some(race) = self.race.as_mut() else {
            return false;
        };
        if !race.disconnect() {
            return false;
        }
        let notice = race.notice();
        self.meta.race_url = None;
        self.touch();
        self.broadcast(notice.into_message());
        true
    }

    /// Opens the socket for a link restored by [`rehydrate`](Self::rehydrate).
    pub fn resume_race(&mut self) -> bool {
        match self.race.as_mut() {
            Some(race) if race.state() == RaceState::Linked => {
                race.connect_socket().is_ok()
            }
            _ => false,
        }
    }

    fn sidecar(&mut self) -> &mut RaceSidecar {
        let room = self.meta.id.clone();
        let events = Arc::clone(&self.ctx.events);
        let races = Arc::clone(&self.ctx.races);
        let links = Arc::clone(&self.ctx.race_links);
        self.race.get_or_insert_with(|| {
            let notify: Notifier = {
                let room = room.clone();
                Arc::new(move |event| {
                    events(RoomEvent {
                        room: room.clone(),
                        kind: RoomEventKind::Race(event),
                    })
                })
            };
            RaceSidecar::new(room, races, links, notify)
        })
    }

    // -- Connections and activity -----------------------------------------

    /// Forgets a closed transport, unless the player already reconnected
    /// on a newer one. Returns whether an entry was removed.
    pub fn disconnect(&mut self, uuid: &Uuid, connection: ConnectionId) -> bool {
        match self.connections.get(uuid) {
            Some(current) if current.id() == connection => {
                self.connections.remove(uuid);
                tracing::debug!(room_id = %self.meta.id, %uuid, "connection closed");
                true
            }
            _ => false,
        }
    }

    /// No live connections and nothing happened within `threshold`.
    pub fn is_idle(&self, now: OffsetDateTime, threshold: Duration) -> bool {
        self.connections.values().all(|c| !c.is_open())
            && now - self.meta.updated_at >= threshold
    }

    /// Flags the room inactive, drops its race link, and tells the
    /// store. Returns `false` if it already was inactive.
    pub fn mark_inactive(&mut self) -> bool {
        if self.meta.status == RoomStatus::Inactive {
            return false;
        }
        self.meta.status = RoomStatus::Inactive;
        if let Some(race) = self.race.as_mut() {
            race.disconnect();
        }
        self.meta.race_url = None;
        self.ctx.store.mark_inactive(self.meta.storage_id);
        tracing::info!(room_id = %self.meta.id, "room marked inactive");
        true
    }

    fn touch(&mut self) {
        self.meta.updated_at = OffsetDateTime::now_utc();
        if self.meta.status == RoomStatus::Inactive {
            tracing::info!(room_id = %self.meta.id, "room reactivated");
            self.meta.status = RoomStatus::Active;
            self.ctx.store.mark_active(self.meta.storage_id);
        }
    }

    // -- Delivery ----------------------------------------------------------

    /// Sends a handler's response where it belongs.
    pub fn deliver(&self, caller: &PlayerConnection, response: Response) {
        match response {
            Response::Reply(message) => {
                caller.send(Outbound::Message(Arc::new(message)));
            }
            Response::Broadcast(message) => self.broadcast(message),
        }
    }

    /// Sends a message to every open connection.
    pub fn broadcast(&self, message: ServerMessage) {
        let message = Arc::new(message);
        for connection in self.connections.values() {
            connection.send(Outbound::Message(Arc::clone(&message)));
        }
    }

    /// Appends a chat line to the log and broadcasts it.
    fn narrate(&mut self, line: ChatMessage) {
        self.chat.push(line.clone());
        self.broadcast(ServerMessage::Chat { message: line });
    }

    fn record(&self, entry: HistoryEntry) {
        match entry.into_record(self.meta.storage_id, OffsetDateTime::now_utc()) {
            Ok(record) => self.ctx.store.append(record),
            Err(e) => {
                tracing::warn!(room_id = %self.meta.id, error = %e, "history entry dropped");
            }
        }
    }

    fn connected(&self, identity: &Identity) -> ServerMessage {
        ServerMessage::Connected {
            board: self.board.clone(),
            chat_history: self.chat.clone(),
            nickname: identity.nickname.clone(),
            color: identity.color.clone(),
            room_name: self.meta.name.clone(),
            game: self.meta.game.clone(),
            game_slug: self.meta.game_slug.clone(),
            new_generation_mode: self.meta.generation_mode,
            race_status: self.race_status(),
            race: self.race.as_ref().and_then(|r| r.snapshot().cloned()),
        }
    }
}

// ---------------------------------------------------------------------------
// Chat lines
// ---------------------------------------------------------------------------

fn joined_line(identity: &Identity) -> ChatMessage {
    ChatMessage::from_player(identity).text(" has joined.")
}

fn left_line(identity: &Identity) -> ChatMessage {
    ChatMessage::from_player(identity).text(" has left.")
}

fn marker_line(identity: &Identity, payload: &MarkPayload, marked: bool) -> ChatMessage {
    let verb = if marked { "marked" } else { "unmarked" };
    ChatMessage::from_player(identity).text(format!(" {verb} \"{}\".", payload.goal))
}

fn chat_line(identity: &Identity, message: &str) -> ChatMessage {
    ChatMessage::from_player(identity).text(format!(": {message}"))
}

fn color_line(identity: &Identity, color: &str) -> ChatMessage {
    ChatMessage::from_player(identity)
        .text(" changed color to ")
        .colored(color, color)
        .text(".")
}
