//! # Bingo
//!
//! Live multiplayer bingo rooms over WebSocket.
//!
//! Players connect to `/socket/<room>`, join with a signed room token,
//! and share one 5×5 board: marking cells, chatting, regenerating the
//! card, and following a linked race on an external race service.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bingo::prelude::*;
//!
//! # async fn start() -> Result<(), BingoError> {
//! let server = BingoServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .token_secret(b"change me")
//!     .build()
//!     .await?;
//!
//! let handle = server.handle();
//! let goals: Vec<Goal> = (0..30).map(|i| Goal::new(format!("Goal {i}"))).collect();
//! let meta = RoomMetadata::new(
//!     RoomId::new("happy-otter"),
//!     StorageId::new(1),
//!     "Friday race",
//!     "Ocarina of Time",
//!     "oot",
//! )
//! .with_password("hunter2");
//! let room = handle.create_room(meta, &goals).await?;
//! let issued = handle.issue_token(room, "hunter2").await?;
//! println!("join with {}", issued.token);
//!
//! server.run().await
//! # }
//! ```

mod actions;
mod config;
mod dispatcher;
mod error;
mod handler;
mod server;

pub use actions::{
    ActionRequest, ActionResponse, STATUS_ACCEPTED, STATUS_BAD_REQUEST,
    STATUS_CONFLICT, STATUS_FORBIDDEN, STATUS_NOT_FOUND, STATUS_UNAUTHORIZED,
};
pub use config::ServerConfig;
pub use dispatcher::IssuedToken;
pub use error::BingoError;
pub use server::{BingoServer, BingoServerBuilder, ServerHandle};

/// Everything needed to run a server and talk to it.
pub mod prelude {
    pub use crate::{
        ActionRequest, ActionResponse, BingoError, BingoServer, BingoServerBuilder,
        IssuedToken, ServerConfig, ServerHandle,
    };
    pub use bingo_auth::TokenConfig;
    pub use bingo_generator::Goal;
    pub use bingo_protocol::{
        Board, Cell, ChatMessage, ClientAction, ClientFrame, GenerationMode,
        RaceLinkStatus, RoomId, ServerMessage,
    };
    pub use bingo_race::{HttpRaceConfig, HttpRaceService};
    pub use bingo_room::{
        GoalSource, MemoryStore, RoomConfig, RoomMetadata, RoomStore, StorageId,
    };
}
