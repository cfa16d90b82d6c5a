//! The race sidecar: one room's link to an external race.
//!
//! # State machine
//!
//! ```text
//!                connect(url)            SocketOpened
//! Disconnected ──────────────→ Linked ──────────────→ Live
//!      ↑                         ↑ ↑                    │
//!      │                         │ └── SocketClosed ────┤
//!      │                         └──── ProbeFailed ─────┤
//!      └──── disconnect() / Gone / Unreachable / cancelled race
//! ```
//!
//! # Threading
//!
//! The sidecar lives inside its room and is only touched from the
//! dispatcher task. Everything that waits (HTTP fetch, socket open, the
//! push stream, probes) runs in a spawned task that reports back through
//! the [`Notifier`] as a [`RaceEvent`]. The dispatcher routes the event
//! to [`RaceSidecar::handle_event`], which is where state changes.
//!
//! Each socket attempt gets a new generation number, and `disconnect()`
//! bumps it too. Events carry the generation they were spawned under, so
//! results of an abandoned attempt are dropped instead of resurrecting a
//! link the room has moved on from.

use std::sync::Arc;

use bingo_protocol::{
    RaceControl, RaceLinkStatus, RaceSnapshot, RoomId, ServerMessage,
};

use crate::{RaceConnection, RaceError, RaceLinks, RaceService, RaceSocket};

/// Where a sidecar is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceState {
    /// No race associated.
    Disconnected,
    /// A race URL is known, but no socket is open.
    Linked,
    /// An authenticated socket to the race is open.
    Live,
}

/// Results of spawned sidecar work, delivered back to the dispatcher.
#[derive(Debug)]
pub enum RaceEvent {
    /// Race data fetched and the push socket opened.
    SocketOpened {
        generation: u64,
        snapshot: RaceSnapshot,
        socket: RaceSocket,
    },
    /// Fetching the race or opening the socket failed.
    Unreachable { generation: u64, reason: String },
    /// The service pushed a race document.
    Push {
        generation: u64,
        snapshot: RaceSnapshot,
    },
    /// The push stream ended.
    SocketClosed { generation: u64 },
    /// A refresh fetched data and the socket answered its probe.
    Refreshed {
        generation: u64,
        snapshot: RaceSnapshot,
    },
    /// A refresh fetched data but there is no healthy socket.
    ProbeFailed {
        generation: u64,
        snapshot: RaceSnapshot,
    },
    /// A refresh couldn't fetch the race: it's gone.
    Gone { generation: u64, reason: String },
}

impl RaceEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::SocketOpened { generation, .. }
            | Self::Unreachable { generation, .. }
            | Self::Push { generation, .. }
            | Self::SocketClosed { generation }
            | Self::Refreshed { generation, .. }
            | Self::ProbeFailed { generation, .. }
            | Self::Gone { generation, .. } => *generation,
        }
    }
}

/// Callback used by spawned tasks to hand events back to the dispatcher.
pub type Notifier = Arc<dyn Fn(RaceEvent) + Send + Sync>;

/// Something the room should tell its players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceNotice {
    pub status: RaceLinkStatus,
    pub race: Option<RaceSnapshot>,
}

impl RaceNotice {
    pub fn into_message(self) -> ServerMessage {
        ServerMessage::RaceUpdate {
            status: self.status,
            race: self.race,
        }
    }
}

/// A room's link to an external race.
pub struct RaceSidecar {
    room: RoomId,
    state: RaceState,
    url: Option<String>,
    snapshot: Option<RaceSnapshot>,
    socket: Option<RaceSocket>,
    generation: u64,
    service: Arc<dyn RaceService>,
    links: Arc<dyn RaceLinks>,
    notify: Notifier,
}

impl RaceSidecar {
    pub fn new(
        room: RoomId,
        service: Arc<dyn RaceService>,
        links: Arc<dyn RaceLinks>,
        notify: Notifier,
    ) -> Self {
        Self {
            room,
            state: RaceState::Disconnected,
            url: None,
            snapshot: None,
            socket: None,
            generation: 0,
            service,
            links,
            notify,
        }
    }

    pub fn state(&self) -> RaceState {
        self.state
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// The newest accepted race document.
    pub fn snapshot(&self) -> Option<&RaceSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn link_status(&self) -> RaceLinkStatus {
        match self.state {
            RaceState::Disconnected => RaceLinkStatus::Disconnected,
            RaceState::Linked => RaceLinkStatus::Linked,
            RaceState::Live => RaceLinkStatus::Live,
        }
    }

    /// The current status and snapshot, as players should see them.
    pub fn notice(&self) -> RaceNotice {
        RaceNotice {
            status: self.link_status(),
            race: self.snapshot.clone(),
        }
    }

    /// Associates a race URL. Disconnected → Linked.
    ///
    /// # Errors
    /// [`RaceError::AlreadyLinked`] unless Disconnected.
    pub fn connect(&mut self, url: impl Into<String>) -> Result<(), RaceError> {
        if self.state != RaceState::Disconnected {
            return Err(RaceError::AlreadyLinked);
        }
        let url = url.into();
        tracing::info!(room_id = %self.room, %url, "race linked");

        let links = Arc::clone(&self.links);
        let room = self.room.clone();
        let persisted = url.clone();
        tokio::spawn(async move {
            if let Err(e) = links.linked(&room, &persisted).await {
                tracing::warn!(room_id = %room, error = %e, "failed to record race link");
            }
        });

        self.url = Some(url);
        self.state = RaceState::Linked;
        Ok(())
    }

    /// Re-associates a URL that was already persisted, e.g. when a room
    /// is rebuilt from storage. Disconnected → Linked, without telling
    /// [`RaceLinks`].
    ///
    /// # Errors
    /// [`RaceError::AlreadyLinked`] unless Disconnected.
    pub fn restore(&mut self, url: impl Into<String>) -> Result<(), RaceError> {
        if self.state != RaceState::Disconnected {
            return Err(RaceError::AlreadyLinked);
        }
        self.url = Some(url.into());
        self.state = RaceState::Linked;
        Ok(())
    }

    /// Fetches the race and opens its push socket in the background.
    ///
    /// Completion arrives as [`RaceEvent::SocketOpened`] or
    /// [`RaceEvent::Unreachable`]; pushes follow as [`RaceEvent::Push`]
    /// until [`RaceEvent::SocketClosed`].
    ///
    /// # Errors
    /// [`RaceError::NotLinked`] when no URL is known.
    pub fn connect_socket(&mut self) -> Result<(), RaceError> {
        let url = self.url.clone().ok_or(RaceError::NotLinked)?;
        self.generation += 1;
        let generation = self.generation;
        let service = Arc::clone(&self.service);
        let notify = Arc::clone(&self.notify);
        tracing::debug!(room_id = %self.room, generation, "opening race socket");

        tokio::spawn(async move {
            let snapshot = match service.fetch_race(&url).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    notify(RaceEvent::Unreachable {
                        generation,
                        reason: e.to_string(),
                    });
                    return;
                }
            };

            let RaceConnection { socket, mut pushes } =
                match service.open_socket(&snapshot).await {
                    Ok(connection) => connection,
                    Err(e) => {
                        notify(RaceEvent::Unreachable {
                            generation,
                            reason: e.to_string(),
                        });
                        return;
                    }
                };

            notify(RaceEvent::SocketOpened {
                generation,
                snapshot,
                socket,
            });
            while let Some(snapshot) = pushes.recv().await {
                notify(RaceEvent::Push {
                    generation,
                    snapshot,
                });
            }
            notify(RaceEvent::SocketClosed { generation });
        });
        Ok(())
    }

    /// Drops the link: closes the socket, forgets the URL and snapshot,
    /// and tells [`RaceLinks`]. Returns `false` if already disconnected.
    pub fn disconnect(&mut self) -> bool {
        if self.state == RaceState::Disconnected {
            return false;
        }
        self.generation += 1;
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        self.url = None;
        self.snapshot = None;
        self.state = RaceState::Disconnected;
        tracing::info!(room_id = %self.room, "race unlinked");

        let links = Arc::clone(&self.links);
        let room = self.room.clone();
        tokio::spawn(async move {
            if let Err(e) = links.unlinked(&room).await {
                tracing::warn!(room_id = %room, error = %e, "failed to record race unlink");
            }
        });
        true
    }

    /// Re-fetches the race in the background and probes the socket.
    ///
    /// A failed fetch means the race is gone and ends the link. A healthy
    /// socket is kept; otherwise the socket is reopened.
    ///
    /// # Errors
    /// [`RaceError::NotLinked`] when no URL is known.
    pub fn refresh(&mut self) -> Result<(), RaceError> {
        let url = self.url.clone().ok_or(RaceError::NotLinked)?;
        let generation = self.generation;
        let socket = self.socket.clone();
        let service = Arc::clone(&self.service);
        let notify = Arc::clone(&self.notify);

        tokio::spawn(async move {
            let snapshot = match service.fetch_race(&url).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    notify(RaceEvent::Gone {
                        generation,
                        reason: e.to_string(),
                    });
                    return;
                }
            };
            let healthy = match &socket {
                Some(socket) => socket.probe().await.is_ok(),
                None => false,
            };
            notify(if healthy {
                RaceEvent::Refreshed {
                    generation,
                    snapshot,
                }
            } else {
                RaceEvent::ProbeFailed {
                    generation,
                    snapshot,
                }
            });
        });
        Ok(())
    }

    /// Authenticates a player's race account on the live socket and joins
    /// them to the race.
    ///
    /// # Errors
    /// [`RaceError::NotLive`] unless Live; nothing is sent.
    pub fn join_user(&self, token: &str) -> Result<(), RaceError> {
        let socket = match (&self.state, &self.socket) {
            (RaceState::Live, Some(socket)) => socket,
            _ => return Err(RaceError::NotLive),
        };
        socket.send(&RaceControl::Authenticate {
            oauth_token: token.to_owned(),
        })?;
        socket.send(&RaceControl::Join)
    }

    /// Applies the result of spawned work. Returns what to broadcast.
    pub fn handle_event(&mut self, event: RaceEvent) -> Option<RaceNotice> {
        if event.generation() != self.generation
            || self.state == RaceState::Disconnected
        {
            tracing::debug!(
                room_id = %self.room,
                event_generation = event.generation(),
                generation = self.generation,
                "dropping stale race event"
            );
            if let RaceEvent::SocketOpened { socket, .. } = event {
                socket.close();
            }
            return None;
        }

        match event {
            RaceEvent::SocketOpened {
                snapshot, socket, ..
            } => {
                if let Some(old) = self.socket.replace(socket) {
                    old.close();
                }
                self.state = RaceState::Live;
                tracing::info!(room_id = %self.room, "race socket live");
                // The status changed even if the snapshot is not newer.
                Some(self.apply(snapshot).unwrap_or_else(|| self.notice()))
            }
            RaceEvent::Unreachable { reason, .. } => {
                tracing::warn!(room_id = %self.room, %reason, "race service unreachable");
                self.disconnect();
                Some(RaceNotice {
                    status: RaceLinkStatus::Unreachable,
                    race: None,
                })
            }
            RaceEvent::Push { snapshot, .. }
            | RaceEvent::Refreshed { snapshot, .. } => self.apply(snapshot),
            RaceEvent::SocketClosed { .. } => {
                self.socket = None;
                self.state = RaceState::Linked;
                tracing::info!(room_id = %self.room, "race socket closed");
                Some(self.notice())
            }
            RaceEvent::ProbeFailed { snapshot, .. } => {
                let applied = self.apply(snapshot);
                if self.state == RaceState::Disconnected {
                    return applied;
                }
                tracing::info!(room_id = %self.room, "race socket unhealthy, reconnecting");
                if let Some(socket) = self.socket.take() {
                    socket.close();
                }
                self.state = RaceState::Linked;
                if let Err(e) = self.connect_socket() {
                    tracing::warn!(room_id = %self.room, error = %e, "race reconnect failed");
                }
                Some(self.notice())
            }
            RaceEvent::Gone { reason, .. } => {
                tracing::info!(room_id = %self.room, %reason, "race gone");
                self.disconnect();
                Some(self.notice())
            }
        }
    }

    /// Caches a snapshot if it's newer than the cached one. A cancelled
    /// race ends the link.
    fn apply(&mut self, snapshot: RaceSnapshot) -> Option<RaceNotice> {
        if snapshot.is_cancelled() {
            tracing::info!(room_id = %self.room, version = snapshot.version, "race cancelled");
            self.disconnect();
            return Some(RaceNotice {
                status: RaceLinkStatus::Disconnected,
                race: Some(snapshot),
            });
        }
        if let Some(cached) = &self.snapshot {
            if snapshot.version <= cached.version {
                tracing::debug!(
                    room_id = %self.room,
                    version = snapshot.version,
                    cached = cached.version,
                    "ignoring race snapshot that isn't newer"
                );
                return None;
            }
        }
        self.snapshot = Some(snapshot);
        Some(self.notice())
    }
}
