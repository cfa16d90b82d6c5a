//! Standalone bingo server.
//!
//! Reads its settings from the environment (a `.env` file is honored):
//!
//! | Variable             | Default            |                                   |
//! |----------------------|--------------------|-----------------------------------|
//! | `BINGO_BIND`         | `127.0.0.1:8080`   | listen address                    |
//! | `BINGO_TOKEN_SECRET` | random             | room token signing key            |
//! | `BINGO_GOALS`        | none               | JSON goal list for the demo room  |
//! | `BINGO_GAME`         | `demo`             | game slug the goals belong to     |
//! | `BINGO_ROOM`         | `demo-room`        | slug of the demo room             |
//! | `BINGO_PASSWORD`     | empty              | demo room password                |
//! | `RACE_SOCKET_BASE`   | empty              | race service push socket base     |
//! | `RACE_ACCESS_TOKEN`  | empty              | race service bearer token         |
//!
//! Rooms live in memory only. When `BINGO_GOALS` is set a demo room is
//! opened and a token for it is logged.

use std::error::Error;
use std::sync::Arc;

use bingo::prelude::*;
use bingo_race::RaceService;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_or(key: &str, default: &str) -> String {
    dotenv::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bingo=info,bingo_room=info,bingo_race=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Arc::new(MemoryStore::new());
    let races = HttpRaceService::new(HttpRaceConfig {
        socket_base: env_or("RACE_SOCKET_BASE", ""),
        access_token: env_or("RACE_ACCESS_TOKEN", ""),
    });

    let mut builder = BingoServer::builder()
        .bind(&env_or("BINGO_BIND", "127.0.0.1:8080"))
        .memory_store(store.clone())
        .races(Arc::new(races) as Arc<dyn RaceService>);
    if let Ok(secret) = dotenv::var("BINGO_TOKEN_SECRET") {
        builder = builder.token_secret(secret.as_bytes());
    }
    let server = builder.build().await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    if let Ok(path) = dotenv::var("BINGO_GOALS") {
        let goals: Vec<Goal> = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        let game = env_or("BINGO_GAME", "demo");
        store.set_goals(game.clone(), goals.clone());

        let password = env_or("BINGO_PASSWORD", "");
        let meta = RoomMetadata::new(
            RoomId::new(env_or("BINGO_ROOM", "demo-room")),
            StorageId::new(1),
            "Demo room",
            game.clone(),
            game,
        )
        .with_password(password.clone());
        let handle = server.handle();
        let room = handle.create_room(meta, &goals).await?;
        let issued = handle.issue_token(room.clone(), password).await?;
        tracing::info!(%room, uuid = %issued.uuid, token = %issued.token, "demo room ready");
    }

    server.run().await?;
    Ok(())
}
