use chrono::{DateTime, SecondsFormat, Utc};

use crate::config::GoogleConfig;
use crate::errors::AppError;
use crate::google::check;
use crate::google::types::{CalendarEvent, CalendarList, CalendarListEntry, EventList, EventResource};

#[derive(Clone)]
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    api_base: String,
}

impl GoogleCalendarClient {
    pub fn new(http: reqwest::Client, cfg: &GoogleConfig) -> Self {
        Self {
            http,
            api_base: cfg.calendar_api.trim_end_matches('/').to_string(),
        }
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        )
    }

    /// `events.insert` with a Meet link request; attendees get notified.
    pub async fn insert_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &EventResource,
    ) -> Result<CalendarEvent, AppError> {
        let resp = self
            .http
            .post(self.events_url(calendar_id))
            .bearer_auth(access_token)
            .query(&[("conferenceDataVersion", "1"), ("sendUpdates", "all")])
            .json(event)
            .send()
            .await?;
        let created = check(resp, "event insert").await?.json().await?;
        Ok(created)
    }

    pub async fn get_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<CalendarEvent, AppError> {
        let resp = self
            .http
            .get(self.event_url(calendar_id, event_id))
            .bearer_auth(access_token)
            .send()
            .await?;
        let event = check(resp, "event lookup").await?.json().await?;
        Ok(event)
    }

    pub async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), AppError> {
        let resp = self
            .http
            .delete(self.event_url(calendar_id, event_id))
            .bearer_auth(access_token)
            .query(&[("sendUpdates", "all")])
            .send()
            .await?;
        check(resp, "event delete").await?;
        Ok(())
    }

    /// Upcoming single events from `time_min`, ordered by start time.
    pub async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<CalendarEvent>, AppError> {
        let resp = self
            .http
            .get(self.events_url(calendar_id))
            .bearer_auth(access_token)
            .query(&[
                (
                    "timeMin",
                    time_min.to_rfc3339_opts(SecondsFormat::Millis, true),
                ),
                ("maxResults", max_results.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await?;
        let list: EventList = check(resp, "event list").await?.json().await?;
        Ok(list.items)
    }

    pub async fn list_calendars(
        &self,
        access_token: &str,
    ) -> Result<Vec<CalendarListEntry>, AppError> {
        let resp = self
            .http
            .get(format!("{}/users/me/calendarList", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await?;
        let list: CalendarList = check(resp, "calendar list").await?.json().await?;
        Ok(list.items)
    }
}
