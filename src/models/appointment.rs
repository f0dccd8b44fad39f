//! Appointment request payload and its validated, normalized form.
//!
//! The dashboard sends `start`/`end` as `{ dateTime, timeZone }`. A `dateTime`
//! carrying an offset (`Z`, `+05:30`) is taken as-is; a naive local time is
//! resolved in its `timeZone` (IANA name, default `UTC`). Both bounds end up
//! as UTC instants before anything is sent to Google or stored.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

pub const DEFAULT_TIME_ZONE: &str = "UTC";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTimeInput {
    pub date_time: Option<String>,
    pub time_zone: Option<String>,
}

/// Body of `POST /appointments`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRequest {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<EventTimeInput>,
    pub end: Option<EventTimeInput>,
    pub call_log_id: Option<String>,
}

/// A bound of the appointment after timezone resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTime {
    pub instant: DateTime<Utc>,
    pub time_zone: String,
}

impl EventTime {
    /// ISO-8601 instant with millisecond precision and a `Z` suffix.
    pub fn to_iso(&self) -> String {
        self.instant.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Appointment data that passed validation; only this type reaches Google.
#[derive(Debug, Clone)]
pub struct AppointmentDraft {
    pub summary: String,
    pub description: String,
    pub start: EventTime,
    pub end: EventTime,
    pub call_log_id: Option<Uuid>,
}

impl AppointmentRequest {
    pub fn validate(self) -> Result<AppointmentDraft, AppError> {
        let summary = self.summary.filter(|s| !s.trim().is_empty());
        let (summary, start, end) = match (summary, self.start, self.end) {
            (Some(summary), Some(start), Some(end)) => (summary, start, end),
            _ => {
                return Err(AppError::Validation(
                    "Missing required fields: summary, start, end".into(),
                ))
            }
        };

        let (start_raw, end_raw) = match (non_blank(&start.date_time), non_blank(&end.date_time)) {
            (Some(s), Some(e)) => (s, e),
            _ => {
                return Err(AppError::Validation(
                    "Both start and end must have dateTime properties".into(),
                ))
            }
        };

        let start = resolve(start_raw, start.time_zone.as_deref())?;
        let end = resolve(end_raw, end.time_zone.as_deref())?;

        if end.instant <= start.instant {
            return Err(AppError::Validation(
                "Appointment end must be after its start".into(),
            ));
        }

        let call_log_id = match non_blank(&self.call_log_id) {
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
                AppError::Validation(format!("Invalid callLogId: {}", raw))
            })?),
            None => None,
        };

        Ok(AppointmentDraft {
            summary,
            description: self.description.unwrap_or_default(),
            start,
            end,
            call_log_id,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Resolve a dashboard `dateTime` to a UTC instant.
pub fn resolve(date_time: &str, time_zone: Option<&str>) -> Result<EventTime, AppError> {
    let zone_name = time_zone
        .map(str::trim)
        .filter(|z| !z.is_empty())
        .unwrap_or(DEFAULT_TIME_ZONE);
    let zone: Tz = zone_name
        .parse()
        .map_err(|_| AppError::Validation(format!("Unknown time zone: {}", zone_name)))?;

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(date_time) {
        return Ok(EventTime {
            instant: with_offset.with_timezone(&Utc),
            time_zone: zone_name.to_string(),
        });
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(date_time, fmt).ok())
        .ok_or_else(invalid_format)?;

    let local = zone.from_local_datetime(&naive).earliest().ok_or_else(|| {
        AppError::Validation(format!(
            "{} does not exist in time zone {}",
            date_time, zone_name
        ))
    })?;

    Ok(EventTime {
        instant: local.with_timezone(&Utc),
        time_zone: zone_name.to_string(),
    })
}

fn invalid_format() -> AppError {
    AppError::Validation("Invalid date format. Use ISO 8601 format: YYYY-MM-DDTHH:mm:ss".into())
}
