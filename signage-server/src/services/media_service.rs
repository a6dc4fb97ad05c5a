use chrono::{NaiveDate, NaiveTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Media, MediaKind, NewMedia, ScheduleRule};
use crate::schedule::{DaySet, ScheduleRequest, ScheduleTemplate};
use crate::services::assignment_service;
use crate::storage::FileStore;
use crate::store::RuleStore;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "webm", "mkv"];

fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Media kind from the extension allow-list, confirmed against the content
/// when the bytes carry a recognizable signature.
pub fn classify(file_name: &str, bytes: &[u8]) -> ServiceResult<MediaKind> {
    let extension = extension_of(file_name);
    let kind = if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Image
    } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Video
    } else {
        return Err(ServiceError::validation(format!(
            "file type '{}' is not allowed",
            extension
        )));
    };

    if let Some(sniffed) = infer::get(bytes) {
        let mime = sniffed.mime_type();
        let sniffed_kind = if mime.starts_with("image/") {
            Some(MediaKind::Image)
        } else if mime.starts_with("video/") {
            Some(MediaKind::Video)
        } else {
            None
        };
        if sniffed_kind.is_some_and(|k| k != kind) {
            return Err(ServiceError::validation(format!(
                "content of '{}' looks like {}, not {}",
                file_name,
                mime,
                kind.as_str()
            )));
        }
    }

    Ok(kind)
}

/// Keeps ASCII letters, digits, dots, dashes and underscores. Whitespace
/// becomes an underscore and leading dots are dropped.
pub fn sanitize_filename(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("");

    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() || !cleaned.contains(|c: char| c.is_ascii_alphanumeric()) {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

fn stored_name(original_name: &str) -> String {
    let fragment = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        &fragment[..8],
        sanitize_filename(original_name)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentTarget {
    AllDevices,
    Device(String),
}

impl AssignmentTarget {
    /// `"all"` targets every active device; anything else names one device.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "" => None,
            "all" => Some(AssignmentTarget::AllDevices),
            device_id => Some(AssignmentTarget::Device(device_id.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadScheduling {
    pub target: AssignmentTarget,
    pub schedule: ScheduleRequest,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub original_name: String,
    pub bytes: Vec<u8>,
    pub origin: Option<String>,
    pub video_duration: Option<i32>,
    pub scheduling: Option<UploadScheduling>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub media: Media,
    pub assignments_created: usize,
}

/// Saves the file, then records the media and its optional schedule in one
/// transaction. A failed save records nothing; a failed insert removes the
/// saved file again.
pub async fn upload(
    store: &RuleStore,
    files: &dyn FileStore,
    request: UploadRequest,
) -> ServiceResult<UploadOutcome> {
    if request.original_name.trim().is_empty() {
        return Err(ServiceError::validation("no file selected"));
    }
    if request.bytes.is_empty() {
        return Err(ServiceError::validation("uploaded file is empty"));
    }

    let kind = classify(&request.original_name, &request.bytes)?;
    let video_duration = match (kind, request.video_duration) {
        (MediaKind::Video, Some(secs)) if secs <= 0 => {
            return Err(ServiceError::validation(format!(
                "video_duration must be positive, got {}",
                secs
            )))
        }
        (MediaKind::Video, duration) => duration,
        (MediaKind::Image, _) => None,
    };
    let scheduling = request
        .scheduling
        .as_ref()
        .map(|s| ScheduleTemplate::from_request(&s.schedule).map(|t| (s.target.clone(), t)))
        .transpose()?;

    let filename = stored_name(&request.original_name);
    let file_size = files.save(&filename, &request.bytes).await?;

    let new_media = NewMedia {
        filename: filename.clone(),
        original_name: request.original_name.clone(),
        file_type: kind.as_str().to_string(),
        file_size: file_size as i64,
        video_duration,
        uploaded_from_ip: request.origin.clone(),
    };
    let now = Utc::now().naive_utc();

    let recorded = store.write(|conn| {
        use crate::schema::media::dsl;

        let media = diesel::insert_into(dsl::media)
            .values(&new_media)
            .returning(Media::as_returning())
            .get_result::<Media>(conn)?;

        let created = match &scheduling {
            None => 0,
            Some((AssignmentTarget::AllDevices, template)) => {
                assignment_service::assign_to_all_in(conn, &media, template, now)?
            }
            Some((AssignmentTarget::Device(device_id), template)) => {
                assignment_service::assign_in(conn, device_id, &media, template, now)?;
                1
            }
        };

        Ok(UploadOutcome {
            media,
            assignments_created: created,
        })
    });

    match recorded {
        Ok(outcome) => {
            tracing::info!(
                "Uploaded {} as {} ({} bytes, {} assignments)",
                request.original_name,
                filename,
                file_size,
                outcome.assignments_created
            );
            Ok(outcome)
        }
        Err(e) => {
            if !files.delete(&filename).await {
                tracing::warn!("Could not clean up {} after failed upload", filename);
            }
            Err(e)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaSummary {
    #[serde(flatten)]
    pub media: Media,
    pub assignment_count: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaDetail {
    #[serde(flatten)]
    pub summary: MediaSummary,
    pub display_duration: Option<i32>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub days_of_week: Vec<String>,
}

fn summarize(media: Media, rules: &[ScheduleRule]) -> MediaSummary {
    MediaSummary {
        assignment_count: rules.iter().filter(|r| r.is_active).count() as i64,
        start_date: rules.iter().filter_map(|r| r.start_date).min(),
        end_date: rules.iter().filter_map(|r| r.end_date).max(),
        is_active: rules.iter().all(|r| r.is_active),
        media,
    }
}

/// Newest first, each media paired with its rules in creation order.
fn load_library(store: &RuleStore) -> ServiceResult<Vec<(Media, Vec<ScheduleRule>)>> {
    use crate::schema::device_content::dsl as dc;
    use crate::schema::media::dsl;

    store.read(|conn| {
        let media = dsl::media
            .order((dsl::created_at.desc(), dsl::id.desc()))
            .select(Media::as_select())
            .load::<Media>(conn)?;

        let mut rules: HashMap<i32, Vec<ScheduleRule>> = HashMap::new();
        for rule in dc::device_content
            .order(dc::id.asc())
            .select(ScheduleRule::as_select())
            .load::<ScheduleRule>(conn)?
        {
            rules.entry(rule.media_id).or_default().push(rule);
        }

        Ok(media
            .into_iter()
            .map(|m| {
                let rules = rules.remove(&m.id).unwrap_or_default();
                (m, rules)
            })
            .collect())
    })
}

pub fn list(store: &RuleStore) -> ServiceResult<Vec<MediaSummary>> {
    Ok(load_library(store)?
        .into_iter()
        .map(|(media, rules)| summarize(media, &rules))
        .collect())
}

/// Summaries plus the schedule of each media's first rule.
pub fn list_detailed(store: &RuleStore) -> ServiceResult<Vec<MediaDetail>> {
    Ok(load_library(store)?
        .into_iter()
        .map(|(media, rules)| {
            let first = rules.first();
            MediaDetail {
                display_duration: first.and_then(|r| r.display_duration),
                start_time: first.and_then(|r| r.start_time),
                end_time: first.and_then(|r| r.end_time),
                days_of_week: first
                    .map(|r| {
                        DaySet::from_stored(r.days_of_week.as_deref())
                            .tokens()
                            .iter()
                            .map(|t| t.to_string())
                            .collect()
                    })
                    .unwrap_or_default(),
                summary: summarize(media, &rules),
            }
        })
        .collect())
}

pub fn get(store: &RuleStore, media_id: i32) -> ServiceResult<Media> {
    store.read(|conn| assignment_service::fetch_media(conn, media_id))
}

pub fn count(store: &RuleStore) -> ServiceResult<i64> {
    use crate::schema::media::dsl;

    store.read(|conn| Ok(dsl::media.count().get_result(conn)?))
}
