//! Booking Gateway: Google Calendar appointment booking for the call-center
//! dashboard.
//!
//! The binary in `main.rs` wires these modules to PostgreSQL; integration
//! tests in `tests/` wire them to `MemoryStore` and a mock Google.

use std::sync::Arc;

pub mod api;
pub mod calendar;
pub mod cli;
pub mod config;
pub mod errors;
pub mod google;
pub mod models;
pub mod store;

use calendar::{AllowList, AppointmentReconciler, CalendarAuthFlow};
use google::{GoogleCalendarClient, GoogleOAuthClient};
use store::postgres::PgStore;
use store::{BookingStore, TokenStore};

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub config: config::Config,
    pub auth: Arc<CalendarAuthFlow>,
    pub appointments: AppointmentReconciler,
    /// Present when backed by PostgreSQL; used by the readiness probe.
    pub db: Option<PgStore>,
}

impl AppState {
    /// Build the Google clients once and hand them to the calendar services.
    pub fn build(
        config: config::Config,
        tokens: Arc<dyn TokenStore>,
        bookings: Arc<dyn BookingStore>,
        db: Option<PgStore>,
    ) -> anyhow::Result<Self> {
        let http = google::build_http_client(&config.google)?;
        let oauth = GoogleOAuthClient::new(http.clone(), &config.google);
        let calendar_client = GoogleCalendarClient::new(http, &config.google);

        let auth = Arc::new(CalendarAuthFlow::new(
            oauth,
            tokens,
            AllowList::new(config.allowed_emails.iter().cloned()),
        ));
        let appointments = AppointmentReconciler::new(
            auth.clone(),
            calendar_client,
            bookings,
            config.calendar_id.clone(),
        );

        Ok(Self {
            config,
            auth,
            appointments,
            db,
        })
    }
}
