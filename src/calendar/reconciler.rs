//! Appointment booking against Google Calendar with a local booking mirror.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::calendar::auth_flow::CalendarAuthFlow;
use crate::errors::AppError;
use crate::google::types::{
    CalendarEvent, CalendarListEntry, ConferenceData, ConferenceSolutionKey,
    CreateConferenceRequest, EventDateTime, EventResource, ReminderOverride, Reminders,
};
use crate::google::GoogleCalendarClient;
use crate::models::appointment::{AppointmentDraft, AppointmentRequest};
use crate::models::booking::{Booking, NewBooking, STATUS_CONFIRMED, STATUS_UNKNOWN};
use crate::store::BookingStore;

pub const DEFAULT_MAX_EVENTS: u32 = 15;
const MAX_EVENTS_CAP: u32 = 250;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAppointment {
    pub appointment: CalendarEvent,
    pub meet_link: Option<String>,
    pub booking: Booking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled,
    /// Google no longer knows the event; treated as success.
    AlreadyDeleted,
}

impl CancelOutcome {
    pub fn message(self) -> &'static str {
        match self {
            CancelOutcome::Cancelled => "Appointment successfully cancelled",
            CancelOutcome::AlreadyDeleted => "Appointment was already deleted",
        }
    }
}

pub struct AppointmentReconciler {
    auth: Arc<CalendarAuthFlow>,
    calendar: GoogleCalendarClient,
    bookings: Arc<dyn BookingStore>,
    calendar_id: String,
}

impl AppointmentReconciler {
    pub fn new(
        auth: Arc<CalendarAuthFlow>,
        calendar: GoogleCalendarClient,
        bookings: Arc<dyn BookingStore>,
        calendar_id: impl Into<String>,
    ) -> Self {
        Self {
            auth,
            calendar,
            bookings,
            calendar_id: calendar_id.into(),
        }
    }

    /// Validate, create the Google event, then record the booking.
    /// Every call creates a new event and a new booking row.
    pub async fn create_appointment(
        &self,
        request: AppointmentRequest,
    ) -> Result<CreatedAppointment, AppError> {
        let draft = request.validate()?;
        let token = self.auth.ensure_valid_token().await?;

        let resource = event_resource(&draft, Utc::now().timestamp_millis());
        let event = self
            .calendar
            .insert_event(&token, &self.calendar_id, &resource)
            .await?;

        let new_booking = NewBooking {
            call_log_id: draft.call_log_id,
            title: draft.summary.clone(),
            description: draft.description.clone(),
            start_time: draft.start.instant,
            end_time: draft.end.instant,
            time_zone: draft.start.time_zone.clone(),
            google_event_id: event.id.clone(),
            meet_link: event.hangout_link.clone(),
            calendar_link: event.html_link.clone(),
            status: if event.status.is_some() {
                STATUS_CONFIRMED.to_string()
            } else {
                STATUS_UNKNOWN.to_string()
            },
        };

        let booking = self.bookings.insert_booking(&new_booking).await.map_err(|e| {
            tracing::error!(
                event_id = ?event.id,
                "Google event created but booking insert failed: {}",
                e
            );
            e
        })?;

        tracing::info!(booking_id = %booking.id, event_id = ?event.id, "appointment booked");

        Ok(CreatedAppointment {
            meet_link: event.hangout_link.clone(),
            appointment: event,
            booking,
        })
    }

    /// Delete the Google event. A 404/410 from Google counts as done.
    pub async fn cancel_appointment(&self, event_id: &str) -> Result<CancelOutcome, AppError> {
        let event_id = required_event_id(event_id)?;
        let token = self.auth.ensure_valid_token().await?;

        match self
            .calendar
            .delete_event(&token, &self.calendar_id, event_id)
            .await
        {
            Ok(()) => {
                tracing::info!(event_id, "appointment cancelled");
                Ok(CancelOutcome::Cancelled)
            }
            Err(e) if e.is_external_not_found() => {
                tracing::info!(event_id, "appointment already gone from calendar");
                Ok(CancelOutcome::AlreadyDeleted)
            }
            Err(e) => Err(e),
        }
    }

    /// `None` when Google reports the event as missing.
    pub async fn get_appointment(&self, event_id: &str) -> Result<Option<CalendarEvent>, AppError> {
        let event_id = required_event_id(event_id)?;
        let token = self.auth.ensure_valid_token().await?;

        match self
            .calendar
            .get_event(&token, &self.calendar_id, event_id)
            .await
        {
            Ok(event) => Ok(Some(event)),
            Err(e) if e.is_external_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list_calendars(&self) -> Result<Vec<CalendarListEntry>, AppError> {
        let token = self.auth.ensure_valid_token().await?;
        self.calendar.list_calendars(&token).await
    }

    pub async fn list_events(
        &self,
        calendar_id: Option<&str>,
        max_results: Option<u32>,
    ) -> Result<Vec<CalendarEvent>, AppError> {
        let calendar_id = calendar_id
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.calendar_id);
        let max_results = max_results
            .unwrap_or(DEFAULT_MAX_EVENTS)
            .clamp(1, MAX_EVENTS_CAP);

        let token = self.auth.ensure_valid_token().await?;
        self.calendar
            .list_events(&token, calendar_id, Utc::now(), max_results)
            .await
    }

    pub async fn list_bookings(
        &self,
        call_log_id: Option<uuid::Uuid>,
        limit: i64,
    ) -> Result<Vec<Booking>, AppError> {
        self.bookings.list_bookings(call_log_id, limit.clamp(1, 500)).await
    }
}

fn required_event_id(event_id: &str) -> Result<&str, AppError> {
    let event_id = event_id.trim();
    if event_id.is_empty() {
        return Err(AppError::Validation("event id is required".into()));
    }
    Ok(event_id)
}

/// Google payload for a draft: normalized instants, Meet link request,
/// email reminder a day ahead and a popup 30 minutes ahead.
pub fn event_resource(draft: &AppointmentDraft, now_ms: i64) -> EventResource {
    EventResource {
        summary: draft.summary.clone(),
        description: draft.description.clone(),
        start: EventDateTime {
            date_time: Some(draft.start.to_iso()),
            date: None,
            time_zone: Some(draft.start.time_zone.clone()),
        },
        end: EventDateTime {
            date_time: Some(draft.end.to_iso()),
            date: None,
            time_zone: Some(draft.end.time_zone.clone()),
        },
        conference_data: ConferenceData {
            create_request: CreateConferenceRequest {
                request_id: format!("appointment_{}", now_ms),
                conference_solution_key: ConferenceSolutionKey {
                    kind: "hangoutsMeet".into(),
                },
            },
        },
        reminders: Reminders {
            use_default: false,
            overrides: vec![
                ReminderOverride {
                    method: "email".into(),
                    minutes: 24 * 60,
                },
                ReminderOverride {
                    method: "popup".into(),
                    minutes: 30,
                },
            ],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::appointment::EventTimeInput;

    #[test]
    fn test_event_resource_uses_normalized_instants() {
        let draft = AppointmentRequest {
            summary: Some("Demo".into()),
            description: Some("intro call".into()),
            start: Some(EventTimeInput {
                date_time: Some("2024-03-10T09:00:00".into()),
                time_zone: Some("Europe/Berlin".into()),
            }),
            end: Some(EventTimeInput {
                date_time: Some("2024-03-10T08:30:00Z".into()),
                time_zone: None,
            }),
            call_log_id: None,
        }
        .validate()
        .unwrap();

        let resource = event_resource(&draft, 1_700_000_000_000);
        assert_eq!(resource.start.date_time.as_deref(), Some("2024-03-10T08:00:00.000Z"));
        assert_eq!(resource.start.time_zone.as_deref(), Some("Europe/Berlin"));
        assert_eq!(resource.end.date_time.as_deref(), Some("2024-03-10T08:30:00.000Z"));
        assert_eq!(resource.end.time_zone.as_deref(), Some("UTC"));
        assert_eq!(
            resource.conference_data.create_request.request_id,
            "appointment_1700000000000"
        );
        let minutes: Vec<u32> = resource.reminders.overrides.iter().map(|o| o.minutes).collect();
        assert_eq!(minutes, vec![1440, 30]);
    }

    #[test]
    fn test_required_event_id() {
        assert_eq!(required_event_id("  abc ").unwrap(), "abc");
        assert!(matches!(required_event_id(" "), Err(AppError::Validation(_))));
    }
}
