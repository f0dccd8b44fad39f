use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_UNKNOWN: &str = "unknown";

/// Local mirror of a calendar event created through the gateway.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub call_log_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub time_zone: String,
    pub google_event_id: Option<String>,
    pub meet_link: Option<String>,
    pub calendar_link: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub call_log_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub time_zone: String,
    pub google_event_id: Option<String>,
    pub meet_link: Option<String>,
    pub calendar_link: Option<String>,
    pub status: String,
}

impl NewBooking {
    /// Materialize the row the way the database would (fresh id and timestamp).
    pub fn into_booking(self) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            call_log_id: self.call_log_id,
            title: self.title,
            description: self.description,
            start_time: self.start_time,
            end_time: self.end_time,
            time_zone: self.time_zone,
            google_event_id: self.google_event_id,
            meet_link: self.meet_link,
            calendar_link: self.calendar_link,
            status: self.status,
            created_at: Utc::now(),
        }
    }
}
