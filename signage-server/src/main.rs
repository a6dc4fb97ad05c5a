mod api;
mod config;
mod db;
mod error;
mod models;
mod schedule;
mod schema;
mod services;
mod storage;
mod store;

use anyhow::Result;
use chrono_tz::Tz;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::playlist_service::PlaylistSettings;
use crate::storage::{FileStore, LocalFileStore};
use crate::store::RuleStore;

#[derive(Clone)]
pub struct AppState {
    pub store: RuleStore,
    pub files: Arc<dyn FileStore>,
    pub config: Arc<Config>,
    /// Base address for playable media URLs, resolved once at startup.
    pub base_url: Arc<str>,
    pub timezone: Tz,
}

impl AppState {
    pub fn new(store: RuleStore, files: Arc<dyn FileStore>, config: Config) -> Result<Self> {
        let timezone = config.timezone()?;
        let base_url: Arc<str> = Arc::from(config.public_base_url());
        Ok(Self {
            store,
            files,
            config: Arc::new(config),
            base_url,
            timezone,
        })
    }

    pub fn playlist_settings(&self) -> PlaylistSettings<'_> {
        PlaylistSettings {
            base_url: &self.base_url,
            default_duration: self.config.playlist.default_display_duration,
        }
    }
}

use clap::Parser;

#[derive(Parser)]
#[command(version, author = "SIGNAGE AUTHORS", about = "Signage Server\nLicensed under AGPLv3\nCreated by SIGNAGE AUTHORS", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Generate a default configuration template to stdout
    #[arg(long)]
    generate_config: bool,

    /// Insert the SPOOF001/SPOOF002 test devices if they are missing
    #[arg(long)]
    seed_test_devices: bool,
}

fn run_onboarding() -> Result<Config> {
    use dialoguer::{theme::ColorfulTheme, Input};

    println!("Welcome to Signage Server!");
    println!("It looks like you don't have a configuration file yet.");
    println!("Let's get you set up.\n");

    let host: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Server Host")
        .default("0.0.0.0".to_string())
        .interact_text()?;

    let port: u16 = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Server Port")
        .default(5000)
        .interact_text()?;

    let db_url: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Database file")
        .default("signage.db".to_string())
        .interact_text()?;

    let upload_dir: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Upload directory")
        .default("uploads".to_string())
        .interact_text()?;

    let timezone: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Facility timezone (IANA name)")
        .default("UTC".to_string())
        .validate_with(|tz: &String| -> Result<(), String> {
            tz.parse::<Tz>().map(|_| ()).map_err(|e| e.to_string())
        })
        .interact_text()?;

    let config_content = format!(
        r#"[server]
host = "{}"
port = {}

[server.https]
enabled = false
cert_path = "certs/cert.pem"
key_path = "certs/key.pem"

[database]
url = "{}"

[storage]
upload_dir = "{}"
max_upload_mb = 500

[playlist]
timezone = "{}"
default_display_duration = 10

[devices]
sweep_interval_secs = 30

[logging]
level = "info"
"#,
        host, port, db_url, upload_dir, timezone
    );

    println!("\nGenerating configuration file: server-config.toml");
    std::fs::write("server-config.toml", &config_content)?;
    println!("Configuration saved successfully!");
    println!("----------------------------------------\n");

    Config::parse(&config_content)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI args
    let cli = Cli::parse();

    if cli.generate_config {
        println!("{}", Config::default_template());
        return Ok(());
    }

    // Determine config path
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| "server-config.toml".to_string());

    // Only onboard when no path was given and someone is at the terminal
    if std::fs::metadata(&config_path).is_err() && cli.config.is_none() && console::user_attended()
    {
        if let Err(e) = run_onboarding() {
            eprintln!("Onboarding failed: {}", e);
            std::process::exit(1);
        }
    }

    if std::fs::metadata(&config_path).is_err() {
        eprintln!("Error: Configuration file '{}' not found.", config_path);
        eprintln!("Run with --generate-config to see a template.");
        std::process::exit(1);
    }

    // Load configuration
    let config = Config::load(&config_path)?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "signage_server={},tower_http=debug",
                    config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Loaded configuration from {}", config_path);

    // Setup database
    let db_pool = db::create_pool(&config.database.url)?;
    db::run_migrations(&mut db_pool.get()?)?;
    let store = RuleStore::new(db_pool);
    tracing::info!("Database initialized");

    if cli.seed_test_devices {
        let seeded =
            services::device_registry::seed_test_devices(&store, chrono::Utc::now().naive_utc())?;
        tracing::info!("Seeded {} test devices", seeded);
    }

    let files = LocalFileStore::new(&config.storage.upload_dir)?;
    tracing::info!("Storing uploads in {:?}", files.root());

    // Create app state
    let state = AppState::new(store, Arc::new(files), config.clone())?;
    tracing::info!(
        "Serving media from {} (schedule timezone {})",
        state.base_url,
        state.timezone
    );

    // Spawn device liveness sweep
    tokio::spawn(services::device_monitor::run(
        state.store.clone(),
        config.devices.stale_after_secs,
        config.devices.sweep_interval_secs,
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Build router, serving the admin UI when one is configured
    let mut app = api::app(state);
    if let Some(static_path) = &config.server.ui_path {
        tracing::info!("Using configured UI path: {}", static_path);
        app = app.fallback_service(
            ServeDir::new(static_path)
                .not_found_service(ServeFile::new(format!("{}/index.html", static_path))),
        );
    }

    // Start server
    let listener_address: SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid host/port: {}", e))?;

    if let Some(https_config) = &config.server.https {
        if https_config.enabled {
            use axum_server::tls_rustls::RustlsConfig;

            tracing::info!("Starting server in HTTPS mode on {}", addr);

            // Validate cert paths
            if !std::path::Path::new(&https_config.cert_path).exists() {
                anyhow::bail!("Certificate file not found: {}", https_config.cert_path);
            }
            if !std::path::Path::new(&https_config.key_path).exists() {
                anyhow::bail!("Key file not found: {}", https_config.key_path);
            }

            let tls_config =
                RustlsConfig::from_pem_file(&https_config.cert_path, &https_config.key_path)
                    .await?;

            axum_server::bind_rustls(listener_address, tls_config)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await?;

            return Ok(());
        }
    }

    // Default HTTP mode
    let listener = tokio::net::TcpListener::bind(listener_address).await?;
    tracing::info!("Server listening on {} (HTTP)", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
