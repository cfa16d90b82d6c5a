//! Integration tests for the bingo server over real WebSocket connections.

use std::sync::Arc;
use std::time::Duration;

use bingo::prelude::*;
use bingo_protocol::RaceSnapshot;
use bingo_race::{RaceConnection, RaceError, RaceService};
use futures_util::future::{self, BoxFuture};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

const ROOM: &str = "happy-otter";
const PASSWORD: &str = "hunter2";

// =========================================================================
// Helpers
// =========================================================================

/// A race service whose requests never complete, so a linked race stays
/// linked.
struct StalledRaces;

impl RaceService for StalledRaces {
    fn fetch_race(&self, _url: &str) -> BoxFuture<'static, Result<RaceSnapshot, RaceError>> {
        Box::pin(future::pending())
    }

    fn open_socket(
        &self,
        _race: &RaceSnapshot,
    ) -> BoxFuture<'static, Result<RaceConnection, RaceError>> {
        Box::pin(future::pending())
    }
}

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    addr: String,
    handle: ServerHandle,
    store: Arc<MemoryStore>,
}

fn goal_pool() -> Vec<Goal> {
    (0..30).map(|i| Goal::new(format!("Goal {i}"))).collect()
}

/// Starts a server on a random port with one room, `happy-otter`.
async fn start_server(config: ServerConfig) -> TestServer {
    launch(BingoServer::builder().config(config)).await
}

async fn launch(builder: BingoServerBuilder) -> TestServer {
    let store = Arc::new(MemoryStore::new());
    store.set_goals("oot", goal_pool());

    let server = builder
        .bind("127.0.0.1:0")
        .token_secret(b"integration-secret")
        .memory_store(Arc::clone(&store))
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let handle = server.handle();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    let meta = RoomMetadata::new(
        RoomId::new(ROOM),
        StorageId::new(1),
        "Friday race",
        "Ocarina of Time",
        "oot",
    )
    .with_password(PASSWORD);
    handle
        .create_room(meta, &goal_pool())
        .await
        .expect("room should be created");

    TestServer {
        addr,
        handle,
        store,
    }
}

async fn connect(addr: &str, room: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/socket/{room}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, frame: Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("send");
}

/// Next text frame as JSON.
async fn recv(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("recv error");
        match msg {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("valid json");
            }
            Message::Close(frame) => panic!("unexpected close: {frame:?}"),
            _ => continue,
        }
    }
}

/// Skips messages until one with the given `action` arrives.
async fn recv_action(ws: &mut ClientWs, action: &str) -> Value {
    loop {
        let value = recv(ws).await;
        if value["action"] == action {
            return value;
        }
    }
}

/// Waits for a close frame and returns its code.
async fn recv_close(ws: &mut ClientWs) -> u16 {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for close");
        match msg {
            Some(Ok(Message::Close(Some(frame)))) => return u16::from(frame.code),
            Some(Ok(_)) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}

/// Issues a token and joins with it, returning the `connected` snapshot.
async fn join(server: &TestServer, ws: &mut ClientWs, nickname: &str) -> (String, Value) {
    let issued = server
        .handle
        .issue_token(RoomId::new(ROOM), PASSWORD)
        .await
        .expect("token");
    send(
        ws,
        json!({"action": "join", "authToken": issued.token, "nickname": nickname}),
    )
    .await;
    let connected = recv_action(ws, "connected").await;
    (issued.token, connected)
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_unknown_room_closes_with_4004() {
    let server = start_server(ServerConfig::default()).await;
    let mut ws = connect(&server.addr, "no-such-room").await;
    assert_eq!(recv_close(&mut ws).await, 4004);
}

#[tokio::test]
async fn test_join_receives_snapshot() {
    let server = start_server(ServerConfig::default()).await;
    let mut ws = connect(&server.addr, ROOM).await;

    let (_, connected) = join(&server, &mut ws, "Ana").await;
    assert_eq!(connected["nickname"], "Ana");
    assert_eq!(connected["color"], "blue");
    assert_eq!(connected["roomName"], "Friday race");
    assert_eq!(connected["gameSlug"], "oot");
    assert_eq!(connected["board"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_silent_connection_times_out_with_4001() {
    let config = ServerConfig {
        join_timeout: Duration::from_millis(100),
        ..ServerConfig::default()
    };
    let server = start_server(config).await;
    let mut ws = connect(&server.addr, ROOM).await;

    assert_eq!(recv(&mut ws).await, json!({"action": "unauthorized"}));
    assert_eq!(recv_close(&mut ws).await, 4001);
}

#[tokio::test]
async fn test_ping_pong() {
    let server = start_server(ServerConfig::default()).await;
    let mut ws = connect(&server.addr, ROOM).await;

    ws.send(Message::Text("ping".into())).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply, Message::Text("pong".into()));
}

#[tokio::test]
async fn test_mark_is_broadcast_to_every_player() {
    let server = start_server(ServerConfig::default()).await;
    let mut ana = connect(&server.addr, ROOM).await;
    let mut ben = connect(&server.addr, ROOM).await;

    let (ana_token, _) = join(&server, &mut ana, "Ana").await;
    join(&server, &mut ben, "Ben").await;

    send(
        &mut ana,
        json!({"action": "mark", "authToken": ana_token, "row": 1, "col": 3}),
    )
    .await;

    for ws in [&mut ana, &mut ben] {
        let update = recv_action(ws, "cellUpdate").await;
        assert_eq!(update["row"], 1);
        assert_eq!(update["col"], 3);
        assert_eq!(update["cell"]["colors"], json!(["blue"]));
    }
}

#[tokio::test]
async fn test_leave_disconnects_and_closes() {
    let server = start_server(ServerConfig::default()).await;
    let mut ws = connect(&server.addr, ROOM).await;
    let (token, _) = join(&server, &mut ws, "Ana").await;

    send(&mut ws, json!({"action": "leave", "authToken": token})).await;
    assert_eq!(
        recv_action(&mut ws, "disconnected").await,
        json!({"action": "disconnected"})
    );
    assert_eq!(recv_close(&mut ws).await, 1000);
}

#[tokio::test]
async fn test_new_card_replaces_board() {
    let server = start_server(ServerConfig::default()).await;
    let mut ws = connect(&server.addr, ROOM).await;
    let (token, _) = join(&server, &mut ws, "Ana").await;

    send(
        &mut ws,
        json!({"action": "newCard", "authToken": token, "generationMode": "RANDOM"}),
    )
    .await;
    let sync = recv_action(&mut ws, "syncBoard").await;
    assert_eq!(sync["board"].as_array().unwrap().len(), 5);

    // The regenerated board reaches the store in the background.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let (_, stored) = server.store.room(StorageId::new(1)).expect("stored room");
    assert_eq!(serde_json::to_value(&stored).unwrap(), sync["board"]);
}

#[tokio::test]
async fn test_race_actions_through_handle() {
    let server = start_server(ServerConfig::default()).await;
    let issued = server
        .handle
        .issue_token(RoomId::new(ROOM), PASSWORD)
        .await
        .unwrap();

    let request = |action: &str, token: &str| ActionRequest {
        room: RoomId::new(ROOM),
        action: action.into(),
        auth_token: token.into(),
        payload: None,
    };

    // Not joined yet.
    let response = server.handle.action(request("race/refresh", &issued.token)).await;
    assert_eq!(response.status, 401);

    let mut ws = connect(&server.addr, ROOM).await;
    send(
        &mut ws,
        json!({"action": "join", "authToken": issued.token, "nickname": "Ana"}),
    )
    .await;
    recv_action(&mut ws, "connected").await;

    let response = server.handle.action(request("race/refresh", &issued.token)).await;
    assert_eq!(response.status, 409);

    let response = server.handle.action(request("race/disconnect", &issued.token)).await;
    assert!(response.is_success());

    let response = server.handle.action(request("race/fly", &issued.token)).await;
    assert_eq!(response.status, 400);

    let response = server.handle.action(request("race/refresh", "forged")).await;
    assert_eq!(response.status, 401);
}

#[tokio::test]
async fn test_create_room_and_issue_token_errors() {
    let server = start_server(ServerConfig::default()).await;

    let duplicate = RoomMetadata::new(
        RoomId::new(ROOM),
        StorageId::new(2),
        "Again",
        "Ocarina of Time",
        "oot",
    );
    assert!(matches!(
        server.handle.create_room(duplicate, &goal_pool()).await,
        Err(BingoError::Room(_))
    ));

    let empty = RoomMetadata::new(
        RoomId::new("quiet-heron"),
        StorageId::new(3),
        "Empty",
        "Ocarina of Time",
        "oot",
    );
    assert!(matches!(
        server.handle.create_room(empty, &[]).await,
        Err(BingoError::Generator(_))
    ));

    assert!(matches!(
        server.handle.issue_token(RoomId::new(ROOM), "wrong").await,
        Err(BingoError::WrongPassword(_))
    ));
    assert!(matches!(
        server.handle.issue_token(RoomId::new("nowhere"), PASSWORD).await,
        Err(BingoError::Room(_))
    ));
}

#[tokio::test]
async fn test_race_link_persists_in_supplied_store() {
    let server = launch(BingoServer::builder().races(Arc::new(StalledRaces))).await;
    let mut ws = connect(&server.addr, ROOM).await;
    let (token, _) = join(&server, &mut ws, "Ana").await;

    let response = server
        .handle
        .action(ActionRequest {
            room: RoomId::new(ROOM),
            action: "race/create".into(),
            auth_token: token,
            payload: Some(json!({"url": "https://races.example/oot/brave-tingle-1234"})),
        })
        .await;
    assert!(response.is_success());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let (meta, _) = server.store.room(StorageId::new(1)).expect("stored room");
    assert_eq!(
        meta.race_url.as_deref(),
        Some("https://races.example/oot/brave-tingle-1234")
    );
}
