use chrono::Utc;
use std::time::Duration;
use tokio::time::sleep;

use crate::playlist::{PlaybackReport, PlaylistEntry};
use crate::PlayerState;

const IDLE_WAIT: Duration = Duration::from_secs(5);

/// Rotates through the cached playlist forever. There is no renderer here,
/// each entry simply occupies its display duration before the next one.
pub async fn run(state: PlayerState) {
    loop {
        let next = state.cache.write().await.next_entry();
        let Some(entry) = next else {
            tracing::debug!("Playlist empty, idling");
            sleep(IDLE_WAIT).await;
            continue;
        };

        let report = play_entry(&state, &entry).await;

        if state.config.report_analytics {
            if let Err(e) = state.client.report_playback(&report).await {
                tracing::warn!("Failed to report playback of {}: {}", entry.filename, e);
            }
        }
    }
}

async fn play_entry(state: &PlayerState, entry: &PlaylistEntry) -> PlaybackReport {
    let planned = entry.display_duration.max(1);
    tracing::info!(
        "Playing {} ({}) for {}s from {}",
        entry.filename,
        entry.file_type,
        planned,
        entry.url
    );

    let started_at = Utc::now().naive_utc();
    sleep(Duration::from_secs(planned as u64)).await;
    let ended_at = Utc::now().naive_utc();

    build_report(&state.config.device_id, entry, started_at, ended_at)
}

fn build_report(
    device_id: &str,
    entry: &PlaylistEntry,
    started_at: chrono::NaiveDateTime,
    ended_at: chrono::NaiveDateTime,
) -> PlaybackReport {
    let actual = (ended_at - started_at).num_seconds().max(0) as i32;
    PlaybackReport {
        device_id: device_id.to_string(),
        media_id: Some(entry.media_id),
        filename: entry.filename.clone(),
        file_type: entry.file_type.clone(),
        started_at,
        ended_at: Some(ended_at),
        planned_duration: Some(entry.display_duration),
        actual_duration: Some(actual),
        completed: actual >= entry.display_duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry() -> PlaylistEntry {
        PlaylistEntry {
            media_id: 9,
            filename: "promo.mp4".into(),
            file_type: "video".into(),
            display_duration: 30,
            play_order: Some(1),
            url: "http://server/uploads/promo.mp4".into(),
        }
    }

    #[test]
    fn test_full_play_is_completed() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 11)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let report = build_report("DEV1", &entry(), start, start + chrono::Duration::seconds(30));

        assert_eq!(report.actual_duration, Some(30));
        assert_eq!(report.planned_duration, Some(30));
        assert!(report.completed);
        assert_eq!(report.media_id, Some(9));
    }

    #[test]
    fn test_cut_short_play_is_incomplete() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 11)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let report = build_report("DEV1", &entry(), start, start + chrono::Duration::seconds(12));

        assert_eq!(report.actual_duration, Some(12));
        assert!(!report.completed);
    }

    #[test]
    fn test_report_serializes_for_server() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 11)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let report = build_report("DEV1", &entry(), start, start);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["device_id"], "DEV1");
        assert_eq!(value["file_type"], "video");
        assert_eq!(value["started_at"], "2025-06-11T10:00:00");
    }
}
