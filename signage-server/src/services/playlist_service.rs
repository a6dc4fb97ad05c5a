use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Media, ScheduleRule};
use crate::schedule::{day_matches, time_matches, DaySet, TimeWindow};
use crate::services::device_registry;
use crate::store::RuleStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistEntry {
    pub media_id: i32,
    pub filename: String,
    pub file_type: String,
    pub display_duration: i32,
    pub play_order: Option<i32>,
    pub url: String,
}

/// Identifies the poller for the check-in that precedes every resolution.
#[derive(Debug, Clone, Copy)]
pub struct Poller<'a> {
    pub device_id: &'a str,
    pub address: Option<&'a str>,
    pub app_version: Option<&'a str>,
    pub checked_in_at: NaiveDateTime,
}

/// Server-wide settings applied while turning rules into playlist entries.
#[derive(Debug, Clone, Copy)]
pub struct PlaylistSettings<'a> {
    /// Base for playable media URLs.
    pub base_url: &'a str,
    /// Display duration for rules stored without one.
    pub default_duration: i32,
}

pub fn media_url(base_url: &str, filename: &str) -> String {
    format!("{}/uploads/{}", base_url.trim_end_matches('/'), filename)
}

/// Records the poller's check-in, then resolves its playlist at `as_of`
/// (facility-local time). The check-in commits on its own, so it is recorded
/// exactly once even if resolution fails afterwards.
pub fn checkin_and_resolve(
    store: &RuleStore,
    poller: Poller<'_>,
    as_of: NaiveDateTime,
    settings: PlaylistSettings<'_>,
) -> ServiceResult<Vec<PlaylistEntry>> {
    device_registry::checkin(
        store,
        poller.device_id,
        poller.address,
        poller.app_version,
        poller.checked_in_at,
    )?;

    resolve(store, poller.device_id, as_of, settings)
}

pub fn resolve(
    store: &RuleStore,
    device_id: &str,
    as_of: NaiveDateTime,
    settings: PlaylistSettings<'_>,
) -> ServiceResult<Vec<PlaylistEntry>> {
    if device_id.trim().is_empty() {
        return Err(ServiceError::validation("device_id is required"));
    }

    let candidates = store.read(|conn| fetch_candidates(conn, device_id, as_of.date()))?;
    let playlist = select_playable(candidates, as_of, settings);

    tracing::debug!(
        "Resolved {} playlist entries for device {} at {}",
        playlist.len(),
        device_id,
        as_of
    );

    Ok(playlist)
}

/// Live rules of the device whose date bounds admit `today`.
pub(crate) fn fetch_candidates(
    conn: &mut SqliteConnection,
    device_id: &str,
    today: NaiveDate,
) -> ServiceResult<Vec<(ScheduleRule, Media)>> {
    use crate::schema::device_content::dsl as dc;
    use crate::schema::media;

    let rows = dc::device_content
        .inner_join(media::table)
        .filter(dc::device_id.eq(device_id))
        .filter(dc::is_active.eq(true))
        .filter(dc::start_date.is_null().or(dc::start_date.le(today)))
        .filter(dc::end_date.is_null().or(dc::end_date.ge(today)))
        .order((dc::play_order.asc(), dc::created_at.asc(), dc::id.asc()))
        .select((ScheduleRule::as_select(), Media::as_select()))
        .load::<(ScheduleRule, Media)>(conn)?;

    Ok(rows)
}

/// Stable playlist order: play order (absent first), then creation time.
/// Rule id breaks exact ties.
pub fn order_rules(rules: &mut [(ScheduleRule, Media)]) {
    rules.sort_by(|(a, _), (b, _)| {
        a.play_order
            .cmp(&b.play_order)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub fn date_matches(rule: &ScheduleRule, today: NaiveDate) -> bool {
    rule.start_date.map_or(true, |start| start <= today)
        && rule.end_date.map_or(true, |end| end >= today)
}

/// Complete in-memory predicate for one rule, including the liveness and
/// date bounds that [`fetch_candidates`] also filters on in SQL.
pub fn rule_is_playable(rule: &ScheduleRule, at: NaiveDateTime) -> bool {
    let days = DaySet::from_stored(rule.days_of_week.as_deref());
    let window = TimeWindow::from_bounds(rule.start_time, rule.end_time);

    rule.is_active
        && date_matches(rule, at.date())
        && day_matches(&days, at)
        && time_matches(window.as_ref(), at)
}

pub fn select_playable(
    mut candidates: Vec<(ScheduleRule, Media)>,
    as_of: NaiveDateTime,
    settings: PlaylistSettings<'_>,
) -> Vec<PlaylistEntry> {
    order_rules(&mut candidates);

    candidates
        .into_iter()
        .filter(|(rule, _)| rule_is_playable(rule, as_of))
        .map(|(rule, media)| PlaylistEntry {
            media_id: media.id,
            url: media_url(settings.base_url, &media.filename),
            filename: media.filename,
            file_type: media.file_type,
            display_duration: rule.display_duration.unwrap_or(settings.default_duration),
            play_order: rule.play_order,
        })
        .collect()
}
