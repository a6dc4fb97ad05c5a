use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device_id: String,
    pub server_url: String,
    pub poll_interval_secs: u64,
    /// Upper bound on playlist age even when the content version is unchanged.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    pub app_version: String,
    #[serde(default = "default_report_analytics")]
    pub report_analytics: bool,
}

fn default_refresh_interval() -> u64 {
    300
}

fn default_report_analytics() -> bool {
    true
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        if config.device_id.trim().is_empty() {
            anyhow::bail!("device_id must not be empty");
        }
        Ok(config)
    }

    pub fn server_base(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    pub fn default_template() -> &'static str {
        r#"device_id = "SPOOF001"
server_url = "http://127.0.0.1:5000"
poll_interval_secs = 30
refresh_interval_secs = 300
app_version = "1.0"
report_analytics = true
"#
    }
}
