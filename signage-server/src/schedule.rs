//! Temporal rule model: weekday tokens, daily time windows and the schedule
//! template written onto assignment rows.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ServiceError, ServiceResult};

pub const DEFAULT_DISPLAY_DURATION: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekdayToken {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
    All,
    Weekdays,
    Weekends,
}

impl WeekdayToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeekdayToken::Mon => "mon",
            WeekdayToken::Tue => "tue",
            WeekdayToken::Wed => "wed",
            WeekdayToken::Thu => "thu",
            WeekdayToken::Fri => "fri",
            WeekdayToken::Sat => "sat",
            WeekdayToken::Sun => "sun",
            WeekdayToken::All => "all",
            WeekdayToken::Weekdays => "weekdays",
            WeekdayToken::Weekends => "weekends",
        }
    }

    pub fn from_weekday(day: Weekday) -> Self {
        match day {
            Weekday::Mon => WeekdayToken::Mon,
            Weekday::Tue => WeekdayToken::Tue,
            Weekday::Wed => WeekdayToken::Wed,
            Weekday::Thu => WeekdayToken::Thu,
            Weekday::Fri => WeekdayToken::Fri,
            Weekday::Sat => WeekdayToken::Sat,
            Weekday::Sun => WeekdayToken::Sun,
        }
    }

    pub fn matches(&self, day: Weekday) -> bool {
        match self {
            WeekdayToken::All => true,
            WeekdayToken::Weekdays => !is_weekend(day),
            WeekdayToken::Weekends => is_weekend(day),
            literal => *literal == WeekdayToken::from_weekday(day),
        }
    }
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

impl FromStr for WeekdayToken {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mon" => Ok(WeekdayToken::Mon),
            "tue" => Ok(WeekdayToken::Tue),
            "wed" => Ok(WeekdayToken::Wed),
            "thu" => Ok(WeekdayToken::Thu),
            "fri" => Ok(WeekdayToken::Fri),
            "sat" => Ok(WeekdayToken::Sat),
            "sun" => Ok(WeekdayToken::Sun),
            "all" => Ok(WeekdayToken::All),
            "weekdays" => Ok(WeekdayToken::Weekdays),
            "weekends" => Ok(WeekdayToken::Weekends),
            other => Err(ServiceError::validation(format!(
                "unknown weekday token '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for WeekdayToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of weekday tokens attached to a rule. Absent or empty input
/// normalizes to `all`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySet(Vec<WeekdayToken>);

impl DaySet {
    pub fn all() -> Self {
        DaySet(vec![WeekdayToken::All])
    }

    /// Parses administrator input. Unknown tokens are rejected.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> ServiceResult<Self> {
        let mut parsed = Vec::with_capacity(tokens.len());
        for token in tokens {
            let token: WeekdayToken = token.as_ref().parse()?;
            if !parsed.contains(&token) {
                parsed.push(token);
            }
        }
        if parsed.is_empty() {
            return Ok(DaySet::all());
        }
        Ok(DaySet(parsed))
    }

    /// Reads the serialized list persisted on a rule row. Unknown tokens are
    /// skipped so one bad value does not take the whole playlist down.
    pub fn from_stored(raw: Option<&str>) -> Self {
        let raw = match raw.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return DaySet::all(),
        };

        let tokens: Vec<String> = match serde_json::from_str(raw) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!("Unreadable days_of_week value {:?}: {}", raw, e);
                return DaySet::all();
            }
        };

        if tokens.is_empty() {
            return DaySet::all();
        }

        let parsed = tokens
            .iter()
            .filter_map(|t| match t.parse::<WeekdayToken>() {
                Ok(token) => Some(token),
                Err(_) => {
                    tracing::warn!("Ignoring unknown weekday token {:?}", t);
                    None
                }
            })
            .collect();

        DaySet(parsed)
    }

    pub fn to_stored(&self) -> String {
        let tokens: Vec<&str> = self.0.iter().map(|t| t.as_str()).collect();
        serde_json::to_string(&tokens).unwrap_or_else(|_| "[\"all\"]".to_string())
    }

    pub fn tokens(&self) -> &[WeekdayToken] {
        &self.0
    }

    pub fn matches(&self, day: Weekday) -> bool {
        self.0.iter().any(|token| token.matches(day))
    }
}

impl Default for DaySet {
    fn default() -> Self {
        DaySet::all()
    }
}

/// Inclusive daily window. Windows that cross midnight (start > end) never
/// match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Window filtering is only active when both bounds are present.
    pub fn from_bounds(start: Option<NaiveTime>, end: Option<NaiveTime>) -> Option<Self> {
        match (start, end) {
            (Some(start), Some(end)) => Some(TimeWindow::new(start, end)),
            _ => None,
        }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }
}

pub fn day_matches(days: &DaySet, at: NaiveDateTime) -> bool {
    days.matches(at.weekday())
}

pub fn time_matches(window: Option<&TimeWindow>, at: NaiveDateTime) -> bool {
    match window {
        Some(window) => window.contains(at.time()),
        None => true,
    }
}

/// Accepts `HH:MM` (HTML time inputs) and `HH:MM:SS`.
pub fn parse_time_of_day(value: &str) -> ServiceResult<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| ServiceError::validation(format!("invalid time of day '{}'", value)))
}

pub fn parse_date(value: &str) -> ServiceResult<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ServiceError::validation(format!("invalid date '{}'", value)))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Raw schedule payload as submitted by the admin UI. Blank strings are
/// treated as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleRequest {
    #[serde(default)]
    pub days_of_week: Option<Vec<String>>,
    pub display_duration: Option<i32>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Schedule written onto rule rows. One template can be applied to every
/// rule of a media item at once, or to a single device's rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleTemplate {
    pub days: DaySet,
    pub display_duration: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub time_window: Option<TimeWindow>,
}

impl ScheduleTemplate {
    /// Every day, no date or time bounds.
    pub fn unrestricted(display_duration: Option<i32>) -> Self {
        Self {
            days: DaySet::all(),
            display_duration: display_duration.unwrap_or(DEFAULT_DISPLAY_DURATION),
            start_date: None,
            end_date: None,
            time_window: None,
        }
    }

    pub fn from_request(req: &ScheduleRequest) -> ServiceResult<Self> {
        let days = match &req.days_of_week {
            Some(tokens) => DaySet::from_tokens(tokens.as_slice())?,
            None => DaySet::all(),
        };

        let display_duration = validate_duration(req.display_duration)?;

        let start_time = non_blank(&req.start_time).map(parse_time_of_day).transpose()?;
        let end_time = non_blank(&req.end_time).map(parse_time_of_day).transpose()?;
        if start_time.is_some() != end_time.is_some() {
            return Err(ServiceError::validation(
                "start_time and end_time must be set together",
            ));
        }

        Ok(Self {
            days,
            display_duration,
            start_date: non_blank(&req.start_date).map(parse_date).transpose()?,
            end_date: non_blank(&req.end_date).map(parse_date).transpose()?,
            time_window: TimeWindow::from_bounds(start_time, end_time),
        })
    }

    /// Videos are shown for at least their intrinsic length.
    pub fn with_min_duration(mut self, video_duration: Option<i32>) -> Self {
        self.display_duration = effective_duration(self.display_duration, video_duration);
        self
    }
}

pub fn validate_duration(duration: Option<i32>) -> ServiceResult<i32> {
    match duration {
        None => Ok(DEFAULT_DISPLAY_DURATION),
        Some(secs) if secs > 0 => Ok(secs),
        Some(secs) => Err(ServiceError::validation(format!(
            "display_duration must be positive, got {}",
            secs
        ))),
    }
}

pub fn effective_duration(display_duration: i32, video_duration: Option<i32>) -> i32 {
    match video_duration {
        Some(video) if video > display_duration => video,
        _ => display_duration,
    }
}

/// Which rule rows a bulk media update touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleScope {
    AllDevices,
    Device(String),
}

impl RuleScope {
    pub fn from_device(device_id: Option<String>) -> Self {
        match device_id {
            Some(id) if !id.trim().is_empty() => RuleScope::Device(id),
            _ => RuleScope::AllDevices,
        }
    }
}
