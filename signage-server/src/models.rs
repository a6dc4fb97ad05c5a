use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

// Media models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::media)]
pub struct Media {
    pub id: i32,
    pub filename: String,
    pub original_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub video_duration: Option<i32>,
    pub uploaded_from_ip: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::media)]
pub struct NewMedia {
    pub filename: String,
    pub original_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub video_duration: Option<i32>,
    pub uploaded_from_ip: Option<String>,
}

// Device models
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::devices)]
pub struct Device {
    pub id: i32,
    pub device_id: String,
    pub device_name: String,
    pub custom_name: Option<String>,
    pub location: Option<String>,
    pub last_checkin: Option<NaiveDateTime>,
    pub is_active: bool,
    pub ip_address: Option<String>,
    pub app_version: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Device {
    pub fn display_name(&self) -> &str {
        match self.custom_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.device_name,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::devices)]
pub struct NewDevice {
    pub device_id: String,
    pub device_name: String,
    pub last_checkin: Option<NaiveDateTime>,
    pub is_active: bool,
    pub ip_address: Option<String>,
    pub app_version: Option<String>,
}

// Schedule rule models (one row per device <-> media assignment)
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::device_content)]
pub struct ScheduleRule {
    pub id: i32,
    pub device_id: String,
    pub media_id: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub days_of_week: Option<String>,
    pub display_duration: Option<i32>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_active: bool,
    pub play_order: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::device_content)]
pub struct NewScheduleRule {
    pub device_id: String,
    pub media_id: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub days_of_week: Option<String>,
    pub display_duration: Option<i32>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_active: bool,
    pub play_order: Option<i32>,
    pub created_at: NaiveDateTime,
}

// Playback analytics models
#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = crate::schema::playback_analytics)]
pub struct NewPlaybackEvent {
    pub device_id: String,
    pub media_id: Option<i32>,
    pub filename: String,
    pub file_type: String,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub planned_duration: Option<i32>,
    pub actual_duration: Option<i32>,
    #[serde(default)]
    pub completed: bool,
}
