use diesel::prelude::*;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{MediaKind, NewPlaybackEvent};
use crate::store::RuleStore;

fn validate(event: &NewPlaybackEvent) -> ServiceResult<()> {
    if event.device_id.trim().is_empty() {
        return Err(ServiceError::validation("device_id is required"));
    }
    if event.filename.trim().is_empty() {
        return Err(ServiceError::validation("filename is required"));
    }
    if MediaKind::parse(&event.file_type).is_none() {
        return Err(ServiceError::validation(format!(
            "unknown file_type '{}'",
            event.file_type
        )));
    }
    if let Some(ended_at) = event.ended_at {
        if ended_at < event.started_at {
            return Err(ServiceError::validation("ended_at precedes started_at"));
        }
    }
    if event.planned_duration.is_some_and(|d| d < 0) || event.actual_duration.is_some_and(|d| d < 0)
    {
        return Err(ServiceError::validation("durations must not be negative"));
    }
    Ok(())
}

/// Appends one playback event. Events are not content changes and do not
/// move the content version. A media id that no longer exists is dropped so
/// reports from players with a stale playlist are still kept.
pub fn record_playback(store: &RuleStore, mut event: NewPlaybackEvent) -> ServiceResult<i32> {
    use crate::schema::media;
    use crate::schema::playback_analytics::dsl;

    validate(&event)?;

    let id = store.write_untracked(|conn| {
        if let Some(media_id) = event.media_id {
            let known: i64 = media::table.find(media_id).count().get_result(conn)?;
            if known == 0 {
                tracing::debug!("Playback report names unknown media {}", media_id);
                event.media_id = None;
            }
        }

        Ok(diesel::insert_into(dsl::playback_analytics)
            .values(&event)
            .returning(dsl::id)
            .get_result::<i32>(conn)?)
    })?;

    tracing::debug!(
        "Recorded playback of {} on device {} (event {})",
        event.filename,
        event.device_id,
        id
    );

    Ok(id)
}
