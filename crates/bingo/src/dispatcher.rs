//! The dispatcher: one task that owns every room.
//!
//! All room state lives in a [`RoomRegistry`] that only this task
//! touches. Everything else talks to it through one unbounded queue of
//! [`DispatchEvent`]s:
//!
//! ```text
//! connection readers ──┐
//! join timers ─────────┤
//! room background work ┼──→ mpsc ──→ Dispatcher ──→ Outbound ──→ writers
//! ServerHandle ────────┘              (registry, tokens, connections)
//! ```
//!
//! Because events are handled one at a time, broadcasts follow queue
//! order and rooms need no locks.

use std::collections::HashMap;

use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use bingo_auth::TokenAuthority;
use bingo_protocol::{
    Board, ClientAction, ClientFrame, Codec, PING, PONG, RoomId, ServerMessage,
};
use bingo_room::{
    Outbound, PlayerConnection, Response, RoomError, RoomEvent, RoomMetadata,
    RoomRegistry,
};
use bingo_transport::{CloseReason, ConnectionId, room_slug_from_target};

use crate::actions::{
    ActionRequest, ActionResponse, RaceAction, STATUS_CONFLICT, STATUS_FORBIDDEN,
    STATUS_NOT_FOUND, STATUS_UNAUTHORIZED,
};
use crate::{BingoError, ServerConfig};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A token handed to a player who passed a room's password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub uuid: Uuid,
    pub token: String,
}

pub(crate) enum DispatchEvent {
    /// A transport finished its upgrade.
    Opened {
        conn_id: ConnectionId,
        target: String,
        outbound: mpsc::UnboundedSender<Outbound>,
    },
    Frame {
        conn_id: ConnectionId,
        text: String,
    },
    Closed {
        conn_id: ConnectionId,
    },
    JoinTimeout {
        conn_id: ConnectionId,
    },
    Room(RoomEvent),
    Action {
        request: ActionRequest,
        reply: oneshot::Sender<ActionResponse>,
    },
    CreateRoom {
        meta: RoomMetadata,
        board: Board,
        reply: oneshot::Sender<Result<RoomId, RoomError>>,
    },
    IssueToken {
        room: RoomId,
        password: String,
        reply: oneshot::Sender<Result<IssuedToken, BingoError>>,
    },
}

// ---------------------------------------------------------------------------
// Connection table
// ---------------------------------------------------------------------------

enum ConnectionState {
    /// Waiting for a valid `join`.
    Pending,
    Joined { room: RoomId, uuid: Uuid },
}

struct ConnectionEntry {
    handle: PlayerConnection,
    state: ConnectionState,
    join_timer: Option<JoinHandle<()>>,
}

impl ConnectionEntry {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.join_timer.take() {
            timer.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub(crate) struct Dispatcher<A: TokenAuthority, C: Codec> {
    registry: RoomRegistry,
    auth: A,
    codec: C,
    config: ServerConfig,
    connections: HashMap<ConnectionId, ConnectionEntry>,
    /// Used to schedule join timeouts back onto our own queue.
    events: mpsc::UnboundedSender<DispatchEvent>,
}

impl<A: TokenAuthority, C: Codec> Dispatcher<A, C> {
    pub(crate) fn new(
        registry: RoomRegistry,
        auth: A,
        codec: C,
        config: ServerConfig,
        events: mpsc::UnboundedSender<DispatchEvent>,
    ) -> Self {
        Self {
            registry,
            auth,
            codec,
            config,
            connections: HashMap::new(),
            events,
        }
    }

    /// Processes events and timers until every sender is gone.
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<DispatchEvent>) {
        let mut sweep = ticker(self.config.sweep_interval);
        let mut race_refresh = ticker(self.config.race_refresh_interval);
        tracing::info!(rooms = self.registry.len(), "dispatcher running");

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                _ = sweep.tick() => self.sweep(),
                _ = race_refresh.tick() => {
                    let refreshed = self.registry.refresh_races();
                    if refreshed > 0 {
                        tracing::debug!(races = refreshed, "race refresh started");
                    }
                }
            }
        }
        tracing::info!("dispatcher stopped");
    }

    pub(crate) fn handle(&mut self, event: DispatchEvent) {
        match event {
            DispatchEvent::Opened {
                conn_id,
                target,
                outbound,
            } => self.on_opened(conn_id, &target, outbound),
            DispatchEvent::Frame { conn_id, text } => self.on_frame(conn_id, &text),
            DispatchEvent::Closed { conn_id } => self.on_closed(conn_id),
            DispatchEvent::JoinTimeout { conn_id } => self.on_join_timeout(conn_id),
            DispatchEvent::Room(event) => {
                self.registry.apply_event(event);
            }
            DispatchEvent::Action { request, reply } => {
                let _ = reply.send(self.on_action(request));
            }
            DispatchEvent::CreateRoom { meta, board, reply } => {
                let _ = reply.send(self.create_room(meta, board));
            }
            DispatchEvent::IssueToken {
                room,
                password,
                reply,
            } => {
                let _ = reply.send(self.issue_token(room, &password));
            }
        }
    }

    // -- Connections -------------------------------------------------------

    fn on_opened(
        &mut self,
        conn_id: ConnectionId,
        target: &str,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) {
        let handle = PlayerConnection::new(conn_id, outbound);
        let known = room_slug_from_target(target)
            .is_some_and(|slug| self.registry.contains(&RoomId::new(slug)));
        if !known {
            tracing::debug!(%conn_id, %target, "connection for unknown room");
            handle.send(Outbound::Close(CloseReason::room_not_found()));
            return;
        }

        let events = self.events.clone();
        let timeout = self.config.join_timeout;
        let join_timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(DispatchEvent::JoinTimeout { conn_id });
        });
        self.connections.insert(
            conn_id,
            ConnectionEntry {
                handle,
                state: ConnectionState::Pending,
                join_timer: Some(join_timer),
            },
        );
        tracing::debug!(%conn_id, %target, "connection pending join");
    }

    fn on_join_timeout(&mut self, conn_id: ConnectionId) {
        let pending = matches!(
            self.connections.get(&conn_id),
            Some(ConnectionEntry {
                state: ConnectionState::Pending,
                ..
            })
        );
        if !pending {
            return;
        }
        if let Some(entry) = self.connections.remove(&conn_id) {
            tracing::info!(%conn_id, "join timed out");
            entry
                .handle
                .send(Outbound::Message(ServerMessage::Unauthorized.into()));
            entry.handle.send(Outbound::Close(CloseReason::unauthorized()));
        }
    }

    fn on_closed(&mut self, conn_id: ConnectionId) {
        let Some(mut entry) = self.connections.remove(&conn_id) else {
            return;
        };
        entry.cancel_timer();
        if let ConnectionState::Joined { room, uuid } = entry.state {
            if let Some(room) = self.registry.get_mut(&room) {
                room.disconnect(&uuid, conn_id);
            }
        }
        tracing::debug!(%conn_id, "connection closed");
    }

    fn on_frame(&mut self, conn_id: ConnectionId, text: &str) {
        let Some(entry) = self.connections.get_mut(&conn_id) else {
            return;
        };
        if text == PING {
            entry.handle.send(Outbound::Text(PONG.into()));
            return;
        }

        let frame: ClientFrame = match self.codec.decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                // A bad token still earns `unauthorized`, even when the
                // action doesn't decode.
                let rejected = self.codec.decode::<TokenOnly>(text).is_ok_and(|frame| {
                    !frame
                        .auth_token
                        .is_some_and(|token| self.auth.verify(&token).is_ok())
                });
                if rejected {
                    reply_unauthorized(&entry.handle);
                } else {
                    tracing::debug!(%conn_id, error = %e, "dropping undecodable frame");
                }
                return;
            }
        };
        let Some(token) = frame.auth_token else {
            reply_unauthorized(&entry.handle);
            return;
        };
        let claims = match self.auth.verify(&token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "rejected token");
                reply_unauthorized(&entry.handle);
                return;
            }
        };
        let Some(room) = self.registry.get_mut(&claims.room) else {
            reply_unauthorized(&entry.handle);
            return;
        };

        let action_name = frame.action.name();
        let joining = matches!(frame.action, ClientAction::Join { .. });
        let leaving = matches!(frame.action, ClientAction::Leave);
        tracing::debug!(%conn_id, room_id = %claims.room, action = action_name, "action");

        let response = room.handle_action(claims.uuid, frame.action, &entry.handle);
        let joined = joining
            && matches!(
                response,
                Some(Response::Reply(ServerMessage::Connected { .. }))
            );
        let left = leaving
            && matches!(response, Some(Response::Reply(ServerMessage::Disconnected)));
        if let Some(response) = response {
            room.deliver(&entry.handle, response);
        }

        if joined {
            entry.cancel_timer();
            entry.state = ConnectionState::Joined {
                room: claims.room,
                uuid: claims.uuid,
            };
        } else if left {
            self.auth.revoke(&token);
            entry.handle.send(Outbound::Close(CloseReason::normal("left room")));
            entry.cancel_timer();
            self.connections.remove(&conn_id);
        }
    }

    // -- Action surface ----------------------------------------------------

    fn on_action(&mut self, request: ActionRequest) -> ActionResponse {
        let action = match RaceAction::parse(&request.action, request.payload) {
            Ok(action) => action,
            Err(response) => return response,
        };
        let claims = match self.auth.verify(&request.auth_token) {
            Ok(claims) => claims,
            Err(e) => return ActionResponse::error(STATUS_UNAUTHORIZED, e.to_string()),
        };
        let Some(room) = self.registry.get_mut(&request.room) else {
            return ActionResponse::error(
                STATUS_NOT_FOUND,
                format!("room {} not found", request.room),
            );
        };
        if claims.room != request.room {
            return ActionResponse::error(STATUS_FORBIDDEN, "token is for another room");
        }
        if room.identity(&claims.uuid).is_none() {
            return ActionResponse::error(STATUS_UNAUTHORIZED, "player has not joined");
        }

        tracing::info!(room_id = %request.room, action = %request.action, "race action");
        let result = match action {
            RaceAction::Create { url } => room.link_race(&url),
            RaceAction::Join { token } => room.join_race(&token),
            RaceAction::Refresh => room.refresh_race(),
            RaceAction::Disconnect => {
                room.unlink_race();
                Ok(())
            }
        };
        match result {
            Ok(()) => ActionResponse::accepted(),
            Err(e) => ActionResponse::error(STATUS_CONFLICT, e.to_string()),
        }
    }

    fn create_room(&mut self, meta: RoomMetadata, board: Board) -> Result<RoomId, RoomError> {
        let stored = (meta.clone(), board.clone());
        let id = self.registry.open(meta, board)?.id().clone();
        self.registry
            .context()
            .store
            .create_room(stored.0, stored.1);
        Ok(id)
    }

    fn issue_token(&mut self, id: RoomId, password: &str) -> Result<IssuedToken, BingoError> {
        let room = self
            .registry
            .get(&id)
            .ok_or_else(|| RoomError::NotFound(id.clone()))?;
        if !room.password_matches(password) {
            return Err(BingoError::WrongPassword(id));
        }
        let uuid = Uuid::new_v4();
        let token = self.auth.issue(uuid, &id)?;
        Ok(IssuedToken { uuid, token })
    }

    // -- Timers ------------------------------------------------------------

    fn sweep(&mut self) {
        self.registry.sweep(
            OffsetDateTime::now_utc(),
            self.config.inactivity_threshold,
        );
        let purged = self.auth.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "expired revocations purged");
        }
    }
}

/// The token of a frame whose action didn't decode.
#[derive(Deserialize)]
struct TokenOnly {
    #[serde(rename = "authToken", default)]
    auth_token: Option<String>,
}

fn reply_unauthorized(handle: &PlayerConnection) {
    handle.send(Outbound::Message(ServerMessage::Unauthorized.into()));
}

/// An interval whose first tick is one period from now.
fn ticker(period: std::time::Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bingo_auth::{HmacTokenAuthority, TokenConfig};
    use bingo_protocol::{Cell, JsonCodec};
    use bingo_race::{HttpRaceConfig, HttpRaceService, RaceLinks, RaceService};
    use bingo_room::{
        EventSink, GoalSource, MemoryStore, RoomContext, RoomStore, StorageId,
        StoreWriter,
    };
    use serde_json::json;

    use super::*;

    const ROOM: &str = "happy-otter";

    struct Harness {
        dispatcher: Dispatcher<HmacTokenAuthority, JsonCodec>,
        rx: mpsc::UnboundedReceiver<DispatchEvent>,
        store: Arc<MemoryStore>,
        next_id: u64,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let store = Arc::new(MemoryStore::new());
            let sink_tx = tx.clone();
            let sink: EventSink = Arc::new(move |event| {
                let _ = sink_tx.send(DispatchEvent::Room(event));
            });
            let ctx = RoomContext {
                store: StoreWriter::spawn(Arc::clone(&store) as Arc<dyn RoomStore>),
                goals: Arc::clone(&store) as Arc<dyn GoalSource>,
                races: Arc::new(HttpRaceService::new(HttpRaceConfig::default()))
                    as Arc<dyn RaceService>,
                race_links: Arc::clone(&store) as Arc<dyn RaceLinks>,
                events: sink,
                config: Default::default(),
            };
            let mut registry = RoomRegistry::new(ctx);
            let meta = RoomMetadata::new(
                RoomId::new(ROOM),
                StorageId::new(1),
                "Friday race",
                "Ocarina of Time",
                "oot",
            )
            .with_password("hunter2");
            let board =
                Board::from_cells((0..25).map(|i| Cell::new(format!("Goal {i}"), None)))
                    .unwrap();
            registry.open(meta, board).unwrap();

            let auth =
                HmacTokenAuthority::new(b"test-secret", TokenConfig::default()).unwrap();
            let dispatcher =
                Dispatcher::new(registry, auth, JsonCodec, ServerConfig::default(), tx);
            Self {
                dispatcher,
                rx,
                store,
                next_id: 1,
            }
        }

        fn open(&mut self, target: &str) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
            let conn_id = ConnectionId::new(self.next_id);
            self.next_id += 1;
            let (outbound, rx) = mpsc::unbounded_channel();
            self.dispatcher.handle(DispatchEvent::Opened {
                conn_id,
                target: target.into(),
                outbound,
            });
            (conn_id, rx)
        }

        fn token(&mut self) -> IssuedToken {
            self.dispatcher
                .issue_token(RoomId::new(ROOM), "hunter2")
                .unwrap()
        }

        fn frame(&mut self, conn_id: ConnectionId, value: serde_json::Value) {
            self.dispatcher.handle(DispatchEvent::Frame {
                conn_id,
                text: value.to_string(),
            });
        }

        /// Handles queued events (join timeouts, room events).
        fn pump(&mut self) {
            while let Ok(event) = self.rx.try_recv() {
                self.dispatcher.handle(event);
            }
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    fn is_message(item: &Outbound, expected: &ServerMessage) -> bool {
        matches!(item, Outbound::Message(message) if message.as_ref() == expected)
    }

    fn is_connected(item: &Outbound) -> bool {
        matches!(item, Outbound::Message(message) if matches!(**message, ServerMessage::Connected { .. }))
    }

    fn join(token: &str, nickname: &str) -> serde_json::Value {
        json!({"action": "join", "nickname": nickname, "authToken": token})
    }

    // -- Upgrade -----------------------------------------------------------

    #[tokio::test]
    async fn test_unknown_room_closes_with_4004() {
        let mut h = Harness::new();
        let (_, mut rx) = h.open("/socket/no-such-room");
        let items = drain(&mut rx);
        assert!(matches!(
            items.as_slice(),
            [Outbound::Close(reason)] if reason.code == 4004
        ));
        assert!(h.dispatcher.connections.is_empty());
    }

    // -- Join timeout ------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_join_timeout_sends_unauthorized_and_closes() {
        let mut h = Harness::new();
        let (_, mut rx) = h.open("/socket/happy-otter");

        tokio::time::sleep(Duration::from_millis(1100)).await;
        h.pump();

        let items = drain(&mut rx);
        assert_eq!(items.len(), 2);
        assert!(is_message(&items[0], &ServerMessage::Unauthorized));
        assert!(matches!(&items[1], Outbound::Close(reason) if reason.code == 4001));
        assert!(h.dispatcher.connections.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_before_timeout_cancels_timer() {
        let mut h = Harness::new();
        let (conn_id, mut rx) = h.open("/socket/happy-otter");
        let issued = h.token();

        tokio::time::sleep(Duration::from_millis(900)).await;
        h.pump();
        h.frame(conn_id, join(&issued.token, "Ana"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        h.pump();

        let items = drain(&mut rx);
        assert_eq!(items.len(), 1);
        assert!(is_connected(&items[0]));
        assert!(matches!(
            h.dispatcher.connections[&conn_id].state,
            ConnectionState::Joined { .. }
        ));
    }

    // -- Frames ------------------------------------------------------------

    #[tokio::test]
    async fn test_ping_answered_with_pong() {
        let mut h = Harness::new();
        let (conn_id, mut rx) = h.open("/socket/happy-otter");
        h.dispatcher.handle(DispatchEvent::Frame {
            conn_id,
            text: "ping".into(),
        });
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [Outbound::Text(text)] if text == "pong"
        ));
    }

    #[tokio::test]
    async fn test_bad_tokens_are_unauthorized() {
        let mut h = Harness::new();
        let (conn_id, mut rx) = h.open("/socket/happy-otter");

        h.frame(conn_id, json!({"action": "join", "nickname": "Ana"}));
        h.frame(conn_id, join("not-a-token", "Ana"));
        let items = drain(&mut rx);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| is_message(i, &ServerMessage::Unauthorized)));
    }

    #[tokio::test]
    async fn test_undecodable_frame_with_valid_token_is_dropped() {
        let mut h = Harness::new();
        let (conn_id, mut rx) = h.open("/socket/happy-otter");
        let issued = h.token();
        h.dispatcher.handle(DispatchEvent::Frame {
            conn_id,
            text: "not json at all".into(),
        });
        h.frame(conn_id, json!({"action": "fly", "authToken": issued.token}));
        h.frame(conn_id, json!({"action": "mark", "row": "one", "authToken": issued.token}));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_frame_with_bad_token_is_unauthorized() {
        let mut h = Harness::new();
        let (conn_id, mut rx) = h.open("/socket/happy-otter");
        h.frame(conn_id, json!({"action": "fly", "authToken": "forged"}));
        h.frame(conn_id, json!({"action": "fly"}));
        let items = drain(&mut rx);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| matches!(
            item,
            Outbound::Message(message) if **message == ServerMessage::Unauthorized
        )));
    }

    #[tokio::test]
    async fn test_leave_revokes_token_and_closes() {
        let mut h = Harness::new();
        let (conn_id, mut rx) = h.open("/socket/happy-otter");
        let issued = h.token();
        h.frame(conn_id, join(&issued.token, "Ana"));
        drain(&mut rx);

        h.frame(conn_id, json!({"action": "leave", "authToken": issued.token}));
        let items = drain(&mut rx);
        assert!(is_message(&items[0], &ServerMessage::Disconnected));
        assert!(matches!(&items[1], Outbound::Close(reason) if reason.code == 1000));
        assert!(h.dispatcher.auth.verify(&issued.token).is_err());

        // A new connection presenting the revoked token gets nowhere.
        let (conn_id, mut rx) = h.open("/socket/happy-otter");
        h.frame(conn_id, join(&issued.token, "Ana"));
        assert!(is_message(&drain(&mut rx)[0], &ServerMessage::Unauthorized));
    }

    #[tokio::test]
    async fn test_transport_close_keeps_newer_connection() {
        let mut h = Harness::new();
        let issued = h.token();
        let (old, _old_rx) = h.open("/socket/happy-otter");
        h.frame(old, join(&issued.token, "Ana"));
        let (new, mut new_rx) = h.open("/socket/happy-otter");
        h.frame(new, json!({"action": "join", "authToken": issued.token}));
        assert!(is_connected(&drain(&mut new_rx)[0]));

        h.dispatcher.handle(DispatchEvent::Closed { conn_id: old });
        let room = h.dispatcher.registry.get(&RoomId::new(ROOM)).unwrap();
        assert!(room.is_connected(&issued.uuid));

        h.dispatcher.handle(DispatchEvent::Closed { conn_id: new });
        let room = h.dispatcher.registry.get(&RoomId::new(ROOM)).unwrap();
        assert!(!room.is_connected(&issued.uuid));
        assert!(room.identity(&issued.uuid).is_some());
    }

    // -- Tokens ------------------------------------------------------------

    #[tokio::test]
    async fn test_issue_token_checks_room_and_password() {
        let mut h = Harness::new();
        assert!(matches!(
            h.dispatcher.issue_token(RoomId::new(ROOM), "wrong"),
            Err(BingoError::WrongPassword(_))
        ));
        assert!(matches!(
            h.dispatcher.issue_token(RoomId::new("elsewhere"), "hunter2"),
            Err(BingoError::Room(RoomError::NotFound(_)))
        ));
        let issued = h.token();
        let claims = h.dispatcher.auth.verify(&issued.token).unwrap();
        assert_eq!(claims.uuid, issued.uuid);
        assert_eq!(claims.room, RoomId::new(ROOM));
    }

    // -- Action surface ----------------------------------------------------

    fn request(room: &str, action: &str, token: &str) -> ActionRequest {
        ActionRequest {
            room: RoomId::new(room),
            action: action.into(),
            auth_token: token.into(),
            payload: None,
        }
    }

    #[tokio::test]
    async fn test_action_status_codes() {
        let mut h = Harness::new();
        let issued = h.token();

        let unknown = h.dispatcher.on_action(request(ROOM, "race/fly", &issued.token));
        assert_eq!(unknown.status, 400);

        let bad_token = h.dispatcher.on_action(request(ROOM, "race/refresh", "nope"));
        assert_eq!(bad_token.status, 401);

        let no_room = h
            .dispatcher
            .on_action(request("elsewhere", "race/refresh", &issued.token));
        assert_eq!(no_room.status, 404);

        // Valid token, but the player never joined.
        let not_joined = h.dispatcher.on_action(request(ROOM, "race/refresh", &issued.token));
        assert_eq!(not_joined.status, 401);

        let (conn_id, _rx) = h.open("/socket/happy-otter");
        h.frame(conn_id, join(&issued.token, "Ana"));
        let not_linked = h.dispatcher.on_action(request(ROOM, "race/refresh", &issued.token));
        assert_eq!(not_linked.status, 409);
        let not_live = h.dispatcher.on_action(ActionRequest {
            payload: Some(json!({"token": "oauth"})),
            ..request(ROOM, "race/join", &issued.token)
        });
        assert_eq!(not_live.status, 409);

        let disconnect = h
            .dispatcher
            .on_action(request(ROOM, "race/disconnect", &issued.token));
        assert_eq!(disconnect.status, 202);
    }

    #[tokio::test]
    async fn test_action_token_for_other_room_is_forbidden() {
        let mut h = Harness::new();
        let meta = RoomMetadata::new(
            RoomId::new("quiet-heron"),
            StorageId::new(2),
            "Other",
            "Game",
            "game",
        );
        h.dispatcher
            .registry
            .open(meta, Board::default())
            .unwrap();
        let issued = h.token();
        let response = h
            .dispatcher
            .on_action(request("quiet-heron", "race/refresh", &issued.token));
        assert_eq!(response.status, 403);
    }

    #[tokio::test]
    async fn test_create_room_registers_and_persists() {
        let mut h = Harness::new();
        let meta = RoomMetadata::new(
            RoomId::new("quiet-heron"),
            StorageId::new(2),
            "Sunday",
            "Ocarina of Time",
            "oot",
        );
        let (reply, rx) = oneshot::channel();
        h.dispatcher.handle(DispatchEvent::CreateRoom {
            meta: meta.clone(),
            board: Board::default(),
            reply,
        });
        assert_eq!(rx.await.unwrap().unwrap(), RoomId::new("quiet-heron"));
        tokio::task::yield_now().await;
        assert!(h.store.room(StorageId::new(2)).is_some());

        let (reply, rx) = oneshot::channel();
        h.dispatcher.handle(DispatchEvent::CreateRoom {
            meta,
            board: Board::default(),
            reply,
        });
        assert!(matches!(
            rx.await.unwrap(),
            Err(RoomError::AlreadyExists(_))
        ));

        let (conn_id, mut rx) = h.open("/socket/quiet-heron");
        assert!(drain(&mut rx).is_empty());
        assert!(h.dispatcher.connections.contains_key(&conn_id));
    }
}
