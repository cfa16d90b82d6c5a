//! `BingoServer` builder, accept loop, and handle.
//!
//! This is the entry point for running a bingo server. It ties together
//! all the layers: transport → handler → dispatcher → rooms.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use bingo_auth::HmacTokenAuthority;
use bingo_generator::Goal;
use bingo_protocol::{Board, Cell, Codec, JsonCodec, RoomId};
use bingo_race::{HttpRaceConfig, HttpRaceService, RaceLinks, RaceService};
use bingo_room::{
    EventSink, GoalSource, MemoryStore, RoomContext, RoomMetadata, RoomRegistry,
    RoomStore, StoreWriter,
};
use bingo_transport::{Transport, WebSocketTransport};

use crate::actions::{ActionRequest, ActionResponse};
use crate::dispatcher::{DispatchEvent, Dispatcher, IssuedToken};
use crate::handler::handle_connection;
use crate::{BingoError, ServerConfig};

/// Builder for configuring and starting a bingo server.
///
/// Collaborators that aren't set default to an in-memory store (for
/// rooms, goals, and race links) and an unauthenticated HTTP race
/// service.
///
/// # Example
///
/// ```rust,no_run
/// # async fn start() -> Result<(), bingo::BingoError> {
/// use bingo::BingoServer;
///
/// let server = BingoServer::builder()
///     .bind("0.0.0.0:8080")
///     .token_secret(b"change me")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct BingoServerBuilder {
    config: ServerConfig,
    token_secret: Option<Vec<u8>>,
    store: Option<Arc<dyn RoomStore>>,
    goals: Option<Arc<dyn GoalSource>>,
    races: Option<Arc<dyn RaceService>>,
    race_links: Option<Arc<dyn RaceLinks>>,
}

impl BingoServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            token_secret: None,
            store: None,
            goals: None,
            races: None,
            race_links: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Replaces the whole configuration. Call before [`bind`](Self::bind).
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Key for signing room tokens. Without one a random key is used and
    /// tokens don't survive a restart.
    pub fn token_secret(mut self, secret: &[u8]) -> Self {
        self.token_secret = Some(secret.to_vec());
        self
    }

    /// Uses one in-memory store for rooms, goal pools, and race links.
    pub fn memory_store(self, store: Arc<MemoryStore>) -> Self {
        self.store(store.clone())
            .goals(store.clone())
            .race_links(store)
    }

    /// Room store. Set [`race_links`](Self::race_links) alongside it, or
    /// race links are only kept in memory.
    pub fn store(mut self, store: Arc<dyn RoomStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn goals(mut self, goals: Arc<dyn GoalSource>) -> Self {
        self.goals = Some(goals);
        self
    }

    pub fn races(mut self, races: Arc<dyn RaceService>) -> Self {
        self.races = Some(races);
        self
    }

    pub fn race_links(mut self, links: Arc<dyn RaceLinks>) -> Self {
        self.race_links = Some(links);
        self
    }

    /// Binds the listener, loads stored rooms, and starts the dispatcher.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<BingoServer<JsonCodec>, BingoError> {
        if self.store.is_some() && self.race_links.is_none() {
            tracing::warn!("room store set without race links, race links won't persist");
        }
        let memory = Arc::new(MemoryStore::new());
        let store = self
            .store
            .unwrap_or_else(|| Arc::clone(&memory) as Arc<dyn RoomStore>);
        let goals = self
            .goals
            .unwrap_or_else(|| Arc::clone(&memory) as Arc<dyn GoalSource>);
        let race_links = self
            .race_links
            .unwrap_or_else(|| Arc::clone(&memory) as Arc<dyn RaceLinks>);
        let races = self.races.unwrap_or_else(|| {
            Arc::new(HttpRaceService::new(HttpRaceConfig::default())) as Arc<dyn RaceService>
        });

        let auth = match &self.token_secret {
            Some(secret) => HmacTokenAuthority::new(secret, self.config.token.clone())?,
            None => {
                tracing::warn!("no token secret configured, using a random key");
                HmacTokenAuthority::with_random_key(self.config.token.clone())?
            }
        };

        let stored = store.load_rooms().await?;
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let (events, rx) = mpsc::unbounded_channel();
        let sink: EventSink = {
            let events = events.clone();
            Arc::new(move |event| {
                let _ = events.send(DispatchEvent::Room(event));
            })
        };
        let ctx = RoomContext {
            store: StoreWriter::spawn(store),
            goals,
            races,
            race_links,
            events: sink,
            config: self.config.room.clone(),
        };
        let mut registry = RoomRegistry::new(ctx);
        registry.rehydrate(stored);

        let codec = JsonCodec;
        let dispatcher =
            Dispatcher::new(registry, auth, codec, self.config, events.clone());
        tokio::spawn(dispatcher.run(rx));

        Ok(BingoServer {
            transport,
            handle: ServerHandle { events },
            codec,
        })
    }
}

impl Default for BingoServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bingo server, bound and ready to accept connections.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct BingoServer<C: Codec> {
    transport: WebSocketTransport,
    handle: ServerHandle,
    codec: C,
}

impl BingoServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> BingoServerBuilder {
        BingoServerBuilder::new()
    }
}

impl<C: Codec + Clone> BingoServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle for creating rooms, issuing tokens, and race actions.
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Runs the accept loop, spawning a handler task for each
    /// connection. Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), BingoError> {
        tracing::info!("bingo server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let events = self.handle.events.clone();
                    let codec = self.codec.clone();
                    tokio::spawn(handle_connection(conn, events, codec));
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Cloneable handle to a running server's dispatcher.
#[derive(Clone)]
pub struct ServerHandle {
    events: mpsc::UnboundedSender<DispatchEvent>,
}

impl ServerHandle {
    /// Runs a race action against a room.
    pub async fn action(&self, request: ActionRequest) -> ActionResponse {
        let (reply, rx) = oneshot::channel();
        if self
            .events
            .send(DispatchEvent::Action { request, reply })
            .is_err()
        {
            return ActionResponse::error(503, "server is shutting down");
        }
        rx.await
            .unwrap_or_else(|_| ActionResponse::error(503, "server is shutting down"))
    }

    /// Generates a board from `goals` in the room's generation mode and
    /// registers the room.
    pub async fn create_room(
        &self,
        meta: RoomMetadata,
        goals: &[Goal],
    ) -> Result<RoomId, BingoError> {
        let picked = bingo_generator::generate(goals, meta.generation_mode)?;
        let board = Board::from_cells(picked.into_iter().map(Cell::from))?;
        let (reply, rx) = oneshot::channel();
        self.send(DispatchEvent::CreateRoom { meta, board, reply })?;
        Ok(rx.await.map_err(|_| BingoError::Stopped)??)
    }

    /// Issues a token for a new player if `password` matches the room's.
    pub async fn issue_token(
        &self,
        room: RoomId,
        password: impl Into<String>,
    ) -> Result<IssuedToken, BingoError> {
        let (reply, rx) = oneshot::channel();
        self.send(DispatchEvent::IssueToken {
            room,
            password: password.into(),
            reply,
        })?;
        rx.await.map_err(|_| BingoError::Stopped)?
    }

    fn send(&self, event: DispatchEvent) -> Result<(), BingoError> {
        self.events.send(event).map_err(|_| BingoError::Stopped)
    }
}
