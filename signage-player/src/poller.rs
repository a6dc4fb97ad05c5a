use anyhow::Result;
use std::time::Duration;
use tokio::time::sleep;

use crate::playlist::{LastUpdate, PlaybackReport, PlaylistResponse};
use crate::PlayerState;

const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Doubling retry delay, capped, reset after a successful exchange.
#[derive(Debug, Clone)]
pub struct Backoff {
    delay: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            delay: INITIAL_BACKOFF,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let current = self.delay;
        self.delay = (self.delay * 2).min(MAX_BACKOFF);
        current
    }

    pub fn reset(&mut self) {
        self.delay = INITIAL_BACKOFF;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP side of the player: staleness check, playlist fetch, analytics.
pub struct ServerClient {
    http: reqwest::Client,
    base: String,
}

impl ServerClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub async fn last_update(&self) -> Result<LastUpdate> {
        let url = format!("{}/api/system/last-update", self.base);
        Ok(self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    pub async fn fetch_playlist(&self, device_id: &str, app_version: &str) -> Result<PlaylistResponse> {
        let url = format!("{}/api/playlist/{}", self.base, device_id);
        Ok(self
            .http
            .get(&url)
            .query(&[("app_version", app_version)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    pub async fn report_playback(&self, report: &PlaybackReport) -> Result<()> {
        let url = format!("{}/api/analytics", self.base);
        self.http
            .post(&url)
            .json(report)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

pub struct Poller {
    state: PlayerState,
}

impl Poller {
    pub fn new(state: PlayerState) -> Self {
        Self { state }
    }

    pub async fn run(&mut self) -> Result<()> {
        let poll_interval = Duration::from_secs(self.state.config.poll_interval_secs.max(1));
        let mut backoff = Backoff::new();

        loop {
            match self.sync().await {
                Ok(()) => {
                    backoff.reset();
                    sleep(poll_interval).await;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::error!("Sync with server failed: {}", e);
                    tracing::info!("Retrying in {:?}, playing from cache meanwhile", delay);
                    sleep(delay).await;
                }
            }
        }
    }

    /// Fetches the playlist when the server's content version moved or the
    /// cached copy aged out. Each fetch doubles as the device's check-in.
    async fn sync(&mut self) -> Result<()> {
        let update = self.state.client.last_update().await?;
        let max_age = Duration::from_secs(self.state.config.refresh_interval_secs);

        let refresh = self
            .state
            .cache
            .read()
            .await
            .needs_refresh(update.version, max_age);
        if !refresh {
            tracing::debug!(
                "Content version {} unchanged since {}",
                update.version,
                update.last_update
            );
            return Ok(());
        }

        let response = self
            .state
            .client
            .fetch_playlist(&self.state.config.device_id, &self.state.config.app_version)
            .await?;

        tracing::info!(
            "Playlist updated to version {} with {} entries",
            response.version,
            response.playlist.len()
        );
        self.state.cache.write().await.replace(response);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut backoff = Backoff::new();
        let delays: Vec<u64> = (0..8).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 160, 300, 300]);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_client_trims_base() {
        let client = ServerClient::new("http://127.0.0.1:5000/").unwrap();
        assert_eq!(client.base, "http://127.0.0.1:5000");
    }
}
