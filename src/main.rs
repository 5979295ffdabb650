use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use roomsync_core::room::DEFAULT_ROOM_VALUE;
use roomsync_core::RoomId;
use roomsync_server::{JwtAuthenticator, Settings};
use roomsync_store::rooms::{SEED_ACTOR, SEED_ROOM_ID};
use roomsync_store::{Database, MemoryStateStore, RoomStateRepo, SqliteStateStore, StateStore};

#[derive(Parser)]
#[command(name = "roomsync", version, about = "Real-time room state sync server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the WebSocket server.
    Serve {
        /// Settings file (defaults to ~/.roomsync/settings.json).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override `server.port`.
        #[arg(long)]
        port: Option<u16>,
        /// Keep room state in memory instead of SQLite.
        #[arg(long)]
        in_memory: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            config,
            port,
            in_memory,
        } => {
            let mut settings = roomsync_server::load_settings(config.as_deref())?;
            if let Some(port) = port {
                settings.server.port = port;
            }
            settings.store.in_memory |= in_memory;
            serve(settings).await
        }
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    roomsync_telemetry::init_telemetry(&settings.telemetry)?;
    settings.validate()?;

    let store = open_store(&settings).await?;
    let authenticator = Arc::new(JwtAuthenticator::new(&settings.auth));

    let handle = roomsync_server::start(&settings.server, &settings.auth, store, authenticator)
        .await
        .with_context(|| format!("failed to bind {}:{}", settings.server.host, settings.server.port))?;

    tracing::info!(addr = %handle.local_addr(), "roomsync ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn StateStore>> {
    if settings.store.in_memory {
        let store = MemoryStateStore::new();
        if settings.store.seed_demo_room {
            let room = RoomId::parse(SEED_ROOM_ID)?;
            store.upsert(&room, DEFAULT_ROOM_VALUE, SEED_ACTOR).await?;
        }
        tracing::info!("using in-memory store");
        return Ok(Arc::new(store));
    }

    let db = Database::open(&settings.store.path)
        .with_context(|| format!("failed to open {}", settings.store.path.display()))?;
    if settings.store.seed_demo_room {
        let seeded = RoomStateRepo::new(db.clone()).seed_defaults()?;
        tracing::debug!(seeded, "demo room seed");
    }
    Ok(Arc::new(SqliteStateStore::new(db)))
}
