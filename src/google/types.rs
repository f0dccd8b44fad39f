//! Google API wire types (subset of fields we read or write).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// Body of an `events.insert` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResource {
    pub summary: String,
    pub description: String,
    pub start: EventDateTime,
    pub end: EventDateTime,
    pub conference_data: ConferenceData,
    pub reminders: Reminders,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceData {
    pub create_request: CreateConferenceRequest,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConferenceRequest {
    pub request_id: String,
    pub conference_solution_key: ConferenceSolutionKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConferenceSolutionKey {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminders {
    pub use_default: bool,
    pub overrides: Vec<ReminderOverride>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderOverride {
    pub method: String,
    pub minutes: u32,
}

/// Event as returned by the Calendar API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: Option<String>,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<EventDateTime>,
    pub end: Option<EventDateTime>,
    pub hangout_link: Option<String>,
    pub html_link: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventList {
    #[serde(default)]
    pub items: Vec<CalendarEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListEntry {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    pub description: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Deserialize)]
pub struct CalendarList {
    #[serde(default)]
    pub items: Vec<CalendarListEntry>,
}

/// `oauth2/v2/userinfo` response.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub email: Option<String>,
    pub verified_email: Option<bool>,
    pub name: Option<String>,
}

/// Error envelope shared by the Calendar API (`error` object) and the
/// OAuth endpoints (`error` string + `error_description`).
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<serde_json::Value>,
    pub error_description: Option<String>,
}

impl ErrorBody {
    pub(crate) fn message(&self) -> Option<String> {
        if let Some(desc) = &self.error_description {
            return Some(desc.clone());
        }
        match self.error.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(obj) => obj
                .get("message")
                .and_then(|m| m.as_str())
                .map(String::from),
            _ => None,
        }
    }
}
