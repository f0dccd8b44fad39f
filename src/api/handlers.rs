use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::calendar::{AuthStatus, CallbackOutcome, CancelOutcome, CreatedAppointment};
use crate::errors::AppError;
use crate::google::types::{CalendarEvent, CalendarListEntry};
use crate::models::appointment::AppointmentRequest;
use crate::models::booking::Booking;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

/// Envelope shared by every JSON success response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: Some(data),
        })
    }
}

#[derive(Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    /// Set by Google when the user declines consent.
    pub error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsParams {
    pub calendar_id: Option<String>,
    pub max_results: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBookingsParams {
    pub call_log_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub event_id: String,
    pub outcome: CancelOutcome,
}

// ── OAuth (public) ───────────────────────────────────────────

/// GET /api/v1/appointments/auth: send the browser to Google consent
pub async fn redirect_to_consent(
    State(state): State<Arc<AppState>>,
) -> Result<Redirect, AppError> {
    let url = state.auth.consent_url()?;
    Ok(Redirect::to(&url))
}

/// GET /api/v1/appointments/auth/initiate: consent URL as JSON
pub async fn initiate_auth(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let url = state.auth.consent_url()?;
    tracing::debug!("consent URL generated");
    Ok(Json(json!({
        "success": true,
        "url": url,
        "message": "Google Auth URL generated successfully",
    })))
}

/// GET /api/v1/appointments/redirect: Google OAuth callback
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let base = state.config.calendar_redirect_base();

    let code = match params.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => code.to_string(),
        None => {
            if let Some(err) = params.error {
                tracing::warn!(error = %err, "calendar consent declined at Google");
                return Redirect::to(&format!("{}?error={}", base, urlencoding::encode(&err)))
                    .into_response();
            }
            return (StatusCode::BAD_REQUEST, "No authorization code provided").into_response();
        }
    };

    match state.auth.handle_callback(&code).await {
        Ok(outcome) => Redirect::to(&callback_redirect(&base, &outcome)).into_response(),
        Err(AppError::MissingCode) => {
            (StatusCode::BAD_REQUEST, "No authorization code provided").into_response()
        }
        Err(e) => {
            tracing::error!("OAuth callback error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Authentication failed: {}", e.public_message()),
            )
                .into_response()
        }
    }
}

/// Dashboard URL for a finished callback.
pub fn callback_redirect(base: &str, outcome: &CallbackOutcome) -> String {
    match outcome {
        CallbackOutcome::Authorized { email } => {
            format!("{}?success=true&email={}", base, urlencoding::encode(email))
        }
        CallbackOutcome::Unauthorized { email } => {
            format!("{}?error=unauthorized&email={}", base, urlencoding::encode(email))
        }
        CallbackOutcome::NoEmail => format!("{}?error=no_email", base),
        CallbackOutcome::UserInfoFailed => format!("{}?error=userinfo_failed", base),
    }
}

// ── OAuth management (admin) ─────────────────────────────────

/// GET /api/v1/appointments/auth/status
pub async fn auth_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<AuthStatus>>, AppError> {
    let status = state.auth.status().await?;
    Ok(ApiResponse::ok(
        "Authentication status retrieved successfully",
        status,
    ))
}

/// POST /api/v1/appointments/auth/refresh: force a token refresh
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<AuthStatus>>, AppError> {
    state.auth.force_refresh().await?;
    let status = state.auth.status().await?;
    Ok(ApiResponse::ok("Access token refreshed", status))
}

/// POST /api/v1/appointments/auth/revoke: forget the stored credential
pub async fn revoke_auth(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<AuthStatus>>, AppError> {
    state.auth.revoke().await?;
    let status = state.auth.status().await?;
    Ok(ApiResponse::ok("Google Calendar disconnected", status))
}

// ── Appointments (admin) ─────────────────────────────────────

/// POST /api/v1/appointments: book a new appointment
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AppointmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AppError> {
    let Json(payload) = payload?;
    let CreatedAppointment {
        appointment,
        meet_link,
        booking,
    } = state.appointments.create_appointment(payload).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(
            "Appointment set successfully",
            json!({
                "message": "Appointment created",
                "appointment": appointment,
                "meetLink": meet_link,
                "booking": booking,
            }),
        ),
    ))
}

/// GET /api/v1/appointments/events/:id
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Response, AppError> {
    match state.appointments.get_appointment(&event_id).await? {
        Some(event) => Ok(ApiResponse::ok("Appointment retrieved successfully", event).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<CalendarEvent> {
                success: false,
                message: "Appointment not found, was it deleted?".into(),
                data: None,
            }),
        )
            .into_response()),
    }
}

/// DELETE /api/v1/appointments/events/:id
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<ApiResponse<CancelResponse>>, AppError> {
    let outcome = state.appointments.cancel_appointment(&event_id).await?;
    Ok(ApiResponse::ok(
        outcome.message(),
        CancelResponse { event_id, outcome },
    ))
}

/// GET /api/v1/appointments/calendars
pub async fn list_calendars(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<CalendarListEntry>>>, AppError> {
    let calendars = state.appointments.list_calendars().await?;
    Ok(ApiResponse::ok("Calendars retrieved successfully", calendars))
}

/// GET /api/v1/appointments/events: upcoming events
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListEventsParams>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<CalendarEvent>>>, AppError> {
    let Query(params) = params?;
    let events = state
        .appointments
        .list_events(params.calendar_id.as_deref(), params.max_results)
        .await?;
    Ok(ApiResponse::ok("Events retrieved successfully", events))
}

/// GET /api/v1/appointments/bookings: local booking records
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListBookingsParams>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<Booking>>>, AppError> {
    let Query(params) = params?;
    let bookings = state
        .appointments
        .list_bookings(params.call_log_id, params.limit.unwrap_or(50))
        .await?;
    Ok(ApiResponse::ok("Bookings retrieved successfully", bookings))
}
