use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub media_id: i32,
    pub filename: String,
    pub file_type: String,
    pub display_duration: i32,
    pub play_order: Option<i32>,
    pub url: String,
}

/// The parts of the server's playlist response the player acts on.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistResponse {
    pub version: u64,
    pub playlist: Vec<PlaylistEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastUpdate {
    pub version: u64,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybackReport {
    pub device_id: String,
    pub media_id: Option<i32>,
    pub filename: String,
    pub file_type: String,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub planned_duration: Option<i32>,
    pub actual_duration: Option<i32>,
    pub completed: bool,
}

/// Last playlist fetched from the server. Playback keeps rotating through it
/// while the server is unreachable.
#[derive(Debug, Clone, Default)]
pub struct PlaylistCache {
    version: Option<u64>,
    entries: Vec<PlaylistEntry>,
    cursor: usize,
    fetched_at: Option<Instant>,
}

impl PlaylistCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True before the first fetch and whenever the server reports a
    /// different content version.
    pub fn is_stale(&self, server_version: u64) -> bool {
        self.version != Some(server_version)
    }

    /// Time windows open and close without a content change, so the
    /// playlist is also refetched once it is older than `max_age`.
    pub fn needs_refresh(&self, server_version: u64, max_age: Duration) -> bool {
        self.is_stale(server_version)
            || self.fetched_at.map_or(true, |at| at.elapsed() >= max_age)
    }

    /// Swaps in a freshly resolved playlist. Rotation restarts from the top
    /// only when the sequence of media actually changed.
    pub fn replace(&mut self, response: PlaylistResponse) {
        let same_sequence = self.entries.len() == response.playlist.len()
            && self
                .entries
                .iter()
                .zip(&response.playlist)
                .all(|(a, b)| a.media_id == b.media_id);

        if !same_sequence {
            self.cursor = 0;
        }
        self.version = Some(response.version);
        self.entries = response.playlist;
        self.fetched_at = Some(Instant::now());
    }

    /// Next entry in rotation, wrapping at the end.
    pub fn next_entry(&mut self) -> Option<PlaylistEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let index = self.cursor % self.entries.len();
        self.cursor = (index + 1) % self.entries.len();
        self.entries.get(index).cloned()
    }
}
