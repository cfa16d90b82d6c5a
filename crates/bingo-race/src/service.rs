//! Collaborator traits for the race sidecar, and the socket handle.
//!
//! The sidecar never performs I/O itself. It asks a [`RaceService`] for
//! race data and sockets and tells a [`RaceLinks`] when its link changes.
//! Both return boxed `'static` futures, so the sidecar can move them into
//! spawned tasks and the traits stay object-safe.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

use bingo_protocol::{RaceControl, RaceSnapshot, RoomId};

use crate::RaceError;

/// How long a socket probe waits for the service's pong.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Talks to the external race service.
pub trait RaceService: Send + Sync + 'static {
    /// Fetches the current race document for a race page URL.
    fn fetch_race(
        &self,
        url: &str,
    ) -> BoxFuture<'static, Result<RaceSnapshot, RaceError>>;

    /// Opens the authenticated push socket for a race.
    fn open_socket(
        &self,
        race: &RaceSnapshot,
    ) -> BoxFuture<'static, Result<RaceConnection, RaceError>>;
}

/// Persists which race a room is linked to.
pub trait RaceLinks: Send + Sync + 'static {
    fn linked(
        &self,
        room: &RoomId,
        url: &str,
    ) -> BoxFuture<'static, Result<(), RaceError>>;

    fn unlinked(&self, room: &RoomId) -> BoxFuture<'static, Result<(), RaceError>>;
}

/// An open push socket: a handle for writing plus the stream of race
/// documents the service pushes. The stream ends when the socket closes.
pub struct RaceConnection {
    pub socket: RaceSocket,
    pub pushes: mpsc::UnboundedReceiver<RaceSnapshot>,
}

/// Commands accepted by a socket driver task.
#[derive(Debug)]
pub enum SocketCommand {
    /// Write a text frame.
    Send(String),
    /// Check liveness; answer on the sender once the service responds.
    Probe(oneshot::Sender<()>),
    Close,
}

/// Cloneable handle to a socket driver task.
#[derive(Debug, Clone)]
pub struct RaceSocket {
    commands: mpsc::UnboundedSender<SocketCommand>,
}

impl RaceSocket {
    /// Creates a handle and the command queue its driver task consumes.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SocketCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { commands: tx }, rx)
    }

    /// Queues a control frame.
    pub fn send(&self, control: &RaceControl) -> Result<(), RaceError> {
        let text = serde_json::to_string(control).map_err(RaceError::Encode)?;
        self.commands
            .send(SocketCommand::Send(text))
            .map_err(|_| RaceError::Closed)
    }

    /// Round-trips a liveness check through the driver.
    pub async fn probe(&self) -> Result<(), RaceError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SocketCommand::Probe(tx))
            .map_err(|_| RaceError::Closed)?;
        tokio::time::timeout(PROBE_TIMEOUT, rx)
            .await
            .map_err(|_| RaceError::ProbeTimeout)?
            .map_err(|_| RaceError::Closed)
    }

    /// Asks the driver to close the socket. A no-op if it's already gone.
    pub fn close(&self) {
        let _ = self.commands.send(SocketCommand::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
