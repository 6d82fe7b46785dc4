//! PC28 game server
//!
//! Runs the round scheduler, the broadcast hub and the HTTP/WebSocket API in
//! one process.

use clap::Parser;
use pc28::api::{shutdown_signal, ApiServer, AppState};
use pc28::config::{validate, ConfigLoader, StorageBackend};
use pc28::game_store::{MemoryStore, RocksStore, RoundStore};
use pc28::games::draw::RandomDraw;
use pc28::games::placement::WagerDesk;
use pc28::hub::Hub;
use pc28::metrics::GameMetrics;
use pc28::scheduler::RoundScheduler;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pc28")]
#[command(about = "PC28 round scheduler and game API", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// API server host
    #[arg(long)]
    host: Option<String>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Database directory
    #[arg(long)]
    data_dir: Option<String>,

    /// Keep everything in memory (state is lost on exit)
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pc28=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(dir) = args.data_dir {
        config.storage.data_directory = dir;
    }
    if args.memory {
        config.storage.backend = StorageBackend::Memory;
    }
    validate(&config)?;

    let store: Arc<dyn RoundStore> = match config.storage.backend {
        StorageBackend::Memory => {
            info!("using in-memory store");
            Arc::new(MemoryStore::new())
        }
        StorageBackend::Rocksdb => {
            info!("opening database: {}", config.storage.data_directory);
            Arc::new(RocksStore::open(&config.storage.data_directory)?)
        }
    };

    let metrics = GameMetrics::new()?;
    let (hub, hub_handle) = Hub::start(&config.hub, metrics.clone());

    let scheduler = Arc::new(RoundScheduler::new(
        store.clone(),
        Arc::new(RandomDraw),
        hub.clone(),
        config.game.clone(),
        metrics.clone(),
    ));
    let scheduler_handle = scheduler.spawn();

    let state = Arc::new(AppState {
        store: store.clone(),
        desk: WagerDesk::new(store.clone(), metrics.clone())
            .with_opening_balance(config.storage.opening_balance()?),
        hub,
        metrics,
    });

    let served = ApiServer::new(config.api.clone(), state)
        .run(shutdown_signal())
        .await;

    // Stop producing events before closing subscriber streams
    scheduler_handle.stop().await;
    hub_handle.shutdown().await;

    served?;
    info!("shutdown complete");
    Ok(())
}
