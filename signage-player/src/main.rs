mod config;
mod playback;
mod playlist;
mod poller;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::playlist::PlaylistCache;
use crate::poller::{Poller, ServerClient};

#[derive(Clone)]
pub struct PlayerState {
    pub config: Arc<Config>,
    pub cache: Arc<RwLock<PlaylistCache>>,
    pub client: Arc<ServerClient>,
}

#[derive(Parser)]
#[command(version, author = "SIGNAGE AUTHORS", about = "Signage Player\nLicensed under AGPLv3", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "player-config.toml")]
    config: String,

    /// Generate a default configuration template to stdout
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.generate_config {
        println!("{}", Config::default_template());
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signage_player=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load(&cli.config)?;
    tracing::info!(
        "Loaded configuration for device {} (server {})",
        config.device_id,
        config.server_base()
    );

    let client = ServerClient::new(config.server_base())?;

    // Create player state
    let state = PlayerState {
        config: Arc::new(config),
        cache: Arc::new(RwLock::new(PlaylistCache::new())),
        client: Arc::new(client),
    };

    tokio::spawn(playback::run(state.clone()));

    let mut poller = Poller::new(state);
    poller.run().await?;

    Ok(())
}
