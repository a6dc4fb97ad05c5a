use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use std::collections::HashSet;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Media, NewScheduleRule, ScheduleRule};
use crate::schedule::{
    effective_duration, validate_duration, DaySet, RuleScope, ScheduleTemplate,
};
use crate::services::device_registry;
use crate::storage::FileStore;
use crate::store::RuleStore;

pub(crate) fn fetch_media(conn: &mut SqliteConnection, media_id: i32) -> ServiceResult<Media> {
    use crate::schema::media::dsl;

    dsl::media
        .find(media_id)
        .select(Media::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found("Media", media_id))
}

fn has_active_pair(
    conn: &mut SqliteConnection,
    device_id: &str,
    media_id: i32,
) -> ServiceResult<bool> {
    use crate::schema::device_content::dsl as dc;

    let count: i64 = dc::device_content
        .filter(dc::device_id.eq(device_id))
        .filter(dc::media_id.eq(media_id))
        .filter(dc::is_active.eq(true))
        .count()
        .get_result(conn)?;

    Ok(count > 0)
}

/// `max(play_order) + 1` over every rule of the device; 1 for a device
/// without rules. Must run inside the write transaction that inserts.
pub(crate) fn next_play_order(conn: &mut SqliteConnection, device_id: &str) -> ServiceResult<i32> {
    use crate::schema::device_content::dsl as dc;
    use diesel::dsl::max;

    let current: Option<i32> = dc::device_content
        .filter(dc::device_id.eq(device_id))
        .select(max(dc::play_order))
        .first(conn)?;

    Ok(current.unwrap_or(0) + 1)
}

fn insert_rule(
    conn: &mut SqliteConnection,
    device_id: &str,
    media_id: i32,
    template: &ScheduleTemplate,
    now: NaiveDateTime,
) -> ServiceResult<i32> {
    use crate::schema::device_content::dsl as dc;

    let play_order = next_play_order(conn, device_id)?;
    let rule = NewScheduleRule {
        device_id: device_id.to_string(),
        media_id,
        start_date: template.start_date,
        end_date: template.end_date,
        days_of_week: Some(template.days.to_stored()),
        display_duration: Some(template.display_duration),
        start_time: template.time_window.map(|w| w.start),
        end_time: template.time_window.map(|w| w.end),
        is_active: true,
        play_order: Some(play_order),
        created_at: now,
    };

    let id = diesel::insert_into(dc::device_content)
        .values(&rule)
        .returning(dc::id)
        .get_result::<i32>(conn)?;

    Ok(id)
}

/// Assignment with an explicit schedule, inside an existing transaction.
pub(crate) fn assign_in(
    conn: &mut SqliteConnection,
    device_id: &str,
    media: &Media,
    template: &ScheduleTemplate,
    now: NaiveDateTime,
) -> ServiceResult<i32> {
    device_registry::ensure_exists(conn, device_id)?;

    if has_active_pair(conn, device_id, media.id)? {
        return Err(ServiceError::DuplicateAssignment {
            device_id: device_id.to_string(),
            media_id: media.id,
        });
    }

    let template = template.clone().with_min_duration(media.video_duration);
    insert_rule(conn, device_id, media.id, &template, now)
}

/// Bulk assignment inside an existing transaction. Devices that already hold
/// the pair are skipped.
pub(crate) fn assign_to_all_in(
    conn: &mut SqliteConnection,
    media: &Media,
    template: &ScheduleTemplate,
    now: NaiveDateTime,
) -> ServiceResult<usize> {
    let template = template.clone().with_min_duration(media.video_duration);
    let mut created = 0;

    for device_id in device_registry::list_active_in(conn)? {
        if has_active_pair(conn, &device_id, media.id)? {
            tracing::debug!(
                "Device {} already has media {}, skipping",
                device_id,
                media.id
            );
            continue;
        }
        insert_rule(conn, &device_id, media.id, &template, now)?;
        created += 1;
    }

    Ok(created)
}

pub fn assign(
    store: &RuleStore,
    device_id: &str,
    media_id: i32,
    duration: Option<i32>,
) -> ServiceResult<i32> {
    if device_id.trim().is_empty() {
        return Err(ServiceError::validation("device_id is required"));
    }
    let template = ScheduleTemplate::unrestricted(Some(validate_duration(duration)?));
    let now = Utc::now().naive_utc();

    let rule_id = store.write(|conn| {
        let media = fetch_media(conn, media_id)?;
        assign_in(conn, device_id, &media, &template, now)
    })?;

    tracing::info!(
        "Assigned media {} to device {} (rule {})",
        media_id,
        device_id,
        rule_id
    );

    Ok(rule_id)
}

pub fn assign_to_all(
    store: &RuleStore,
    media_id: i32,
    duration: Option<i32>,
) -> ServiceResult<usize> {
    let template = ScheduleTemplate::unrestricted(Some(validate_duration(duration)?));
    let now = Utc::now().naive_utc();

    let created = store.write(|conn| {
        let media = fetch_media(conn, media_id)?;
        assign_to_all_in(conn, &media, &template, now)
    })?;

    tracing::info!(
        "Assigned media {} to {} active devices",
        media_id,
        created
    );

    Ok(created)
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::device_content, treat_none_as_null = true)]
struct ScheduleChangeset {
    days_of_week: Option<String>,
    display_duration: Option<i32>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
}

impl From<&ScheduleTemplate> for ScheduleChangeset {
    fn from(template: &ScheduleTemplate) -> Self {
        Self {
            days_of_week: Some(template.days.to_stored()),
            display_duration: Some(template.display_duration),
            start_date: template.start_date,
            end_date: template.end_date,
            start_time: template.time_window.map(|w| w.start),
            end_time: template.time_window.map(|w| w.end),
        }
    }
}

/// Overwrites the schedule of every rule of `media_id` within `scope`.
/// Returns the number of rules rewritten.
pub fn update_schedule(
    store: &RuleStore,
    media_id: i32,
    template: &ScheduleTemplate,
    scope: &RuleScope,
) -> ServiceResult<usize> {
    use crate::schema::device_content::dsl as dc;

    let updated = store.write(|conn| {
        let media = fetch_media(conn, media_id)?;
        let template = template.clone().with_min_duration(media.video_duration);
        let changes = ScheduleChangeset::from(&template);

        match scope {
            RuleScope::AllDevices => Ok(diesel::update(
                dc::device_content.filter(dc::media_id.eq(media_id)),
            )
            .set(&changes)
            .execute(conn)?),
            RuleScope::Device(device_id) => {
                let updated = diesel::update(
                    dc::device_content
                        .filter(dc::media_id.eq(media_id))
                        .filter(dc::device_id.eq(device_id)),
                )
                .set(&changes)
                .execute(conn)?;
                if updated == 0 {
                    return Err(ServiceError::not_found(
                        "Assignment",
                        format!("{}/{}", device_id, media_id),
                    ));
                }
                Ok(updated)
            }
        }
    })?;

    tracing::info!(
        "Schedule of media {} rewritten on {} rules ({:?})",
        media_id,
        updated,
        scope
    );

    Ok(updated)
}

/// Applies new play orders to the listed rules of one device. Any rule that
/// does not belong to the device aborts the whole reorder.
pub fn reorder(store: &RuleStore, device_id: &str, orders: &[(i32, i32)]) -> ServiceResult<usize> {
    use crate::schema::device_content::dsl as dc;

    if device_id.trim().is_empty() {
        return Err(ServiceError::validation("device_id is required"));
    }
    if orders.is_empty() {
        return Ok(0);
    }

    store.write(|conn| {
        device_registry::ensure_exists(conn, device_id)?;

        for &(rule_id, play_order) in orders {
            let updated = diesel::update(
                dc::device_content
                    .filter(dc::id.eq(rule_id))
                    .filter(dc::device_id.eq(device_id)),
            )
            .set(dc::play_order.eq(Some(play_order)))
            .execute(conn)?;

            if updated == 0 {
                return Err(ServiceError::not_found("Assignment", rule_id));
            }
        }
        Ok(())
    })?;

    tracing::info!("Reordered {} rules on device {}", orders.len(), device_id);

    Ok(orders.len())
}

pub fn remove(store: &RuleStore, rule_id: i32) -> ServiceResult<()> {
    use crate::schema::device_content::dsl as dc;

    store.write(|conn| {
        let deleted = diesel::delete(dc::device_content.find(rule_id)).execute(conn)?;
        if deleted == 0 {
            return Err(ServiceError::not_found("Assignment", rule_id));
        }
        Ok(())
    })?;

    tracing::info!("Removed assignment {}", rule_id);
    Ok(())
}

/// Sets liveness on the rules of `media_id` within `scope`. Reactivation
/// leaves a rule dormant when its device already holds an active rule for
/// the same media.
pub fn toggle(
    store: &RuleStore,
    media_id: i32,
    active: bool,
    scope: &RuleScope,
) -> ServiceResult<usize> {
    use crate::schema::device_content::dsl as dc;

    let changed = store.write(|conn| {
        fetch_media(conn, media_id)?;

        let mut query = dc::device_content
            .filter(dc::media_id.eq(media_id))
            .order((dc::created_at.asc(), dc::id.asc()))
            .select(ScheduleRule::as_select())
            .into_boxed();
        if let RuleScope::Device(device_id) = scope {
            query = query.filter(dc::device_id.eq(device_id.clone()));
        }
        let rules = query.load::<ScheduleRule>(conn)?;

        if !active {
            let ids: Vec<i32> = rules.iter().filter(|r| r.is_active).map(|r| r.id).collect();
            return Ok(diesel::update(dc::device_content.filter(dc::id.eq_any(ids)))
                .set(dc::is_active.eq(false))
                .execute(conn)?);
        }

        let mut live: HashSet<String> = dc::device_content
            .filter(dc::media_id.eq(media_id))
            .filter(dc::is_active.eq(true))
            .select(dc::device_id)
            .load::<String>(conn)?
            .into_iter()
            .collect();

        let mut changed = 0;
        for rule in rules.iter().filter(|r| !r.is_active) {
            if !live.insert(rule.device_id.clone()) {
                tracing::warn!(
                    "Leaving rule {} inactive: device {} already plays media {}",
                    rule.id,
                    rule.device_id,
                    media_id
                );
                continue;
            }
            changed += diesel::update(dc::device_content.find(rule.id))
                .set(dc::is_active.eq(true))
                .execute(conn)?;
        }
        Ok(changed)
    })?;

    tracing::info!(
        "Media {} {} on {} rules ({:?})",
        media_id,
        if active { "activated" } else { "deactivated" },
        changed,
        scope
    );

    Ok(changed)
}

/// Per-rule duration override. Videos keep their intrinsic length as a floor;
/// the stored value is returned.
pub fn update_rule_duration(store: &RuleStore, rule_id: i32, seconds: i32) -> ServiceResult<i32> {
    use crate::schema::device_content::dsl as dc;
    use crate::schema::media;

    let requested = validate_duration(Some(seconds))?;

    let stored = store.write(|conn| {
        let video_duration: Option<Option<i32>> = dc::device_content
            .inner_join(media::table)
            .filter(dc::id.eq(rule_id))
            .select(media::video_duration)
            .first(conn)
            .optional()?;
        let video_duration =
            video_duration.ok_or_else(|| ServiceError::not_found("Assignment", rule_id))?;

        let stored = effective_duration(requested, video_duration);
        diesel::update(dc::device_content.find(rule_id))
            .set(dc::display_duration.eq(Some(stored)))
            .execute(conn)?;
        Ok(stored)
    })?;

    tracing::info!("Assignment {} display duration set to {}s", rule_id, stored);
    Ok(stored)
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceContentItem {
    pub id: i32,
    pub media_id: i32,
    pub filename: String,
    pub original_name: String,
    pub file_type: String,
    pub display_duration: i32,
    pub play_order: i32,
    pub days_of_week: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub created_at: NaiveDateTime,
}

/// Active rules of one device in playlist order, regardless of today's
/// schedule. Rules stored without a duration report `default_duration`.
pub fn list_device_content(
    store: &RuleStore,
    device_id: &str,
    default_duration: i32,
) -> ServiceResult<Vec<DeviceContentItem>> {
    use crate::schema::device_content::dsl as dc;
    use crate::schema::media;

    let mut rows = store.read(|conn| {
        device_registry::ensure_exists(conn, device_id)?;

        Ok(dc::device_content
            .inner_join(media::table)
            .filter(dc::device_id.eq(device_id))
            .filter(dc::is_active.eq(true))
            .select((ScheduleRule::as_select(), Media::as_select()))
            .load::<(ScheduleRule, Media)>(conn)?)
    })?;

    crate::services::playlist_service::order_rules(&mut rows);

    Ok(rows
        .into_iter()
        .map(|(rule, media)| DeviceContentItem {
            id: rule.id,
            media_id: media.id,
            filename: media.filename,
            original_name: media.original_name,
            file_type: media.file_type,
            display_duration: rule.display_duration.unwrap_or(default_duration),
            play_order: rule.play_order.unwrap_or(0),
            days_of_week: DaySet::from_stored(rule.days_of_week.as_deref())
                .tokens()
                .iter()
                .map(|t| t.to_string())
                .collect(),
            start_date: rule.start_date,
            end_date: rule.end_date,
            start_time: rule.start_time,
            end_time: rule.end_time,
            created_at: rule.created_at,
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedMedia {
    pub media_id: i32,
    pub filename: String,
    pub rules_removed: usize,
    pub analytics_removed: usize,
    pub file_removed: bool,
}

/// Removes the media record with its rules and analytics, then the stored
/// file. The record deletion is authoritative; a failed file removal is only
/// logged.
pub async fn delete_media(
    store: &RuleStore,
    files: &dyn FileStore,
    media_id: i32,
) -> ServiceResult<DeletedMedia> {
    use crate::schema::device_content::dsl as dc;
    use crate::schema::media::dsl as m;
    use crate::schema::playback_analytics::dsl as pa;

    let (filename, rules_removed, analytics_removed) = store.write(|conn| {
        let media = fetch_media(conn, media_id)?;

        let rules_removed =
            diesel::delete(dc::device_content.filter(dc::media_id.eq(media_id))).execute(conn)?;
        let analytics_removed =
            diesel::delete(pa::playback_analytics.filter(pa::media_id.eq(Some(media_id))))
                .execute(conn)?;
        diesel::delete(m::media.find(media_id)).execute(conn)?;

        Ok((media.filename, rules_removed, analytics_removed))
    })?;

    let file_removed = files.delete(&filename).await;
    if !file_removed {
        tracing::warn!(
            "Media {} deleted but file {} could not be removed",
            media_id,
            filename
        );
    }

    tracing::info!(
        "Deleted media {} ({}) with {} rules and {} analytics events",
        media_id,
        filename,
        rules_removed,
        analytics_removed
    );

    Ok(DeletedMedia {
        media_id,
        filename,
        rules_removed,
        analytics_removed,
        file_removed,
    })
}
