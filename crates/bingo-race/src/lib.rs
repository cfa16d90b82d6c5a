//! Race integration for bingo rooms.
//!
//! A room can be linked to a race on an external race-coordination
//! service. The [`RaceSidecar`] owns that link: it fetches the race,
//! keeps an authenticated push socket open, relays newer race documents
//! to the room, and tears everything down when the race is cancelled or
//! disappears.
//!
//! - [`RaceService`]: fetching races and opening sockets. Production
//!   implementation: [`HttpRaceService`].
//! - [`RaceLinks`]: persisting which race a room is linked to.
//! - [`RaceSocket`]: a cloneable handle to one socket's driver task.

mod error;
mod http;
mod service;
mod sidecar;

pub use error::RaceError;
pub use http::{HttpRaceConfig, HttpRaceService};
pub use service::{
    PROBE_TIMEOUT, RaceConnection, RaceLinks, RaceService, RaceSocket,
    SocketCommand,
};
pub use sidecar::{Notifier, RaceEvent, RaceNotice, RaceSidecar, RaceState};
