use anyhow::Result;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::UdpSocket;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub playlist: PlaylistConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base for playable media URLs. Detected from the outward-facing
    /// interface when unset.
    pub public_url: Option<String>,
    pub https: Option<HttpsConfig>,
    pub ui_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpsConfig {
    pub enabled: bool,
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

fn default_max_upload_mb() -> usize {
    500
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistConfig {
    /// IANA zone in which "now" is evaluated for schedule rules.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_display_duration")]
    pub default_display_duration: i32,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_display_duration() -> i32 {
    crate::schedule::DEFAULT_DISPLAY_DURATION
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            default_display_duration: default_display_duration(),
        }
    }
}

/// One year.
const MAX_STALE_AFTER_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesConfig {
    /// Devices silent for longer than this are flagged inactive. Unset
    /// disables the sweep.
    pub stale_after_secs: Option<u64>,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    30
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: None,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.timezone()?;
        if let Some(secs) = config.devices.stale_after_secs {
            if secs == 0 || secs > MAX_STALE_AFTER_SECS {
                anyhow::bail!(
                    "devices.stale_after_secs must be between 1 and {}, got {}",
                    MAX_STALE_AFTER_SECS,
                    secs
                );
            }
        }
        if config.playlist.default_display_duration <= 0 {
            anyhow::bail!(
                "playlist.default_display_duration must be positive, got {}",
                config.playlist.default_display_duration
            );
        }
        Ok(config)
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.playlist
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid playlist.timezone: {}", e))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.storage.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Base address devices use to fetch media, without a trailing slash.
    pub fn public_base_url(&self) -> String {
        if let Some(url) = self.server.public_url.as_deref().filter(|u| !u.is_empty()) {
            return url.trim_end_matches('/').to_string();
        }

        let scheme = match &self.server.https {
            Some(https) if https.enabled => "https",
            _ => "http",
        };
        format!("{}://{}:{}", scheme, detect_local_ip(), self.server.port)
    }

    pub fn default_template() -> &'static str {
        r#"[server]
host = "0.0.0.0"
port = 5000

# Optional: Base URL devices use to download media.
# Detected from the outward-facing network interface when unset.
# public_url = "http://192.168.1.10:5000"

[server.https]
enabled = false
cert_path = "certs/cert.pem"
key_path = "certs/key.pem"

# Optional: Path to the admin UI directory.
# ui_path = "./static"

[database]
# Path of the SQLite database file.
url = "signage.db"

[storage]
upload_dir = "uploads"
max_upload_mb = 500

[playlist]
# Schedule rules are evaluated against the wall clock of this zone.
timezone = "UTC"
default_display_duration = 10

[devices]
# Mark devices inactive after this many seconds without a playlist poll.
# stale_after_secs = 300
sweep_interval_secs = 30

[logging]
level = "info"
"#
    }
}

/// Address of the interface that routes to the internet, found by
/// connecting a UDP socket (no packets are sent). Falls back to `localhost`.
pub fn detect_local_ip() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|e| {
            tracing::warn!("Could not detect local address, using localhost: {}", e);
            "localhost".to_string()
        })
}
