//! End-to-end tests for the consent flow and appointment booking.
//!
//! Google is replaced by a wiremock server and storage by `MemoryStore`,
//! so these run without network access or PostgreSQL.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_gateway::calendar::{
    AllowList, AppointmentReconciler, CalendarAuthFlow, CallbackOutcome, CancelOutcome,
};
use booking_gateway::config::GoogleConfig;
use booking_gateway::errors::AppError;
use booking_gateway::google::{build_http_client, GoogleCalendarClient, GoogleOAuthClient};
use booking_gateway::models::appointment::{AppointmentRequest, EventTimeInput};
use booking_gateway::models::credential::Credential;
use booking_gateway::store::memory::MemoryStore;
use booking_gateway::store::TokenStore;

fn google_config(server: &MockServer) -> GoogleConfig {
    let mut cfg = GoogleConfig::with_defaults(
        "client-123",
        "secret-456",
        "http://localhost:5005/api/v1/appointments/redirect",
    );
    cfg.token_url = format!("{}/token", server.uri());
    cfg.userinfo_url = format!("{}/userinfo", server.uri());
    cfg.calendar_api = format!("{}/calendar/v3", server.uri());
    cfg.timeout_secs = 5;
    cfg
}

fn auth_flow(server: &MockServer, store: Arc<MemoryStore>) -> Arc<CalendarAuthFlow> {
    let cfg = google_config(server);
    let http = build_http_client(&cfg).unwrap();
    Arc::new(CalendarAuthFlow::new(
        GoogleOAuthClient::new(http, &cfg),
        store,
        AllowList::new(["owner@example.com"]),
    ))
}

fn reconciler(server: &MockServer, store: Arc<MemoryStore>) -> AppointmentReconciler {
    let cfg = google_config(server);
    let http = build_http_client(&cfg).unwrap();
    AppointmentReconciler::new(
        auth_flow(server, store.clone()),
        GoogleCalendarClient::new(http, &cfg),
        store,
        "primary",
    )
}

fn stored_credential(expires_in_ms: i64) -> Credential {
    Credential {
        access_token: "ya29.stored".into(),
        refresh_token: Some("1//stored-refresh".into()),
        scope: vec!["https://www.googleapis.com/auth/calendar.events".into()],
        expiry_date: Utc::now().timestamp_millis() + expires_in_ms,
    }
}

async fn mount_code_exchange(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.fresh",
            "refresh_token": "1//fresh-refresh",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/calendar.events https://www.googleapis.com/auth/userinfo.email",
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

async fn mount_userinfo(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("authorization", "Bearer ya29.fresh"))
        .respond_with(response)
        .mount(server)
        .await;
}

fn demo_request() -> AppointmentRequest {
    AppointmentRequest {
        summary: Some("Demo".into()),
        description: None,
        start: Some(EventTimeInput {
            date_time: Some("2024-01-01T10:00:00Z".into()),
            time_zone: None,
        }),
        end: Some(EventTimeInput {
            date_time: Some("2024-01-01T10:30:00Z".into()),
            time_zone: None,
        }),
        call_log_id: None,
    }
}

// ── Consent callback ─────────────────────────────────────────

#[tokio::test]
async fn test_callback_persists_allowed_identity() {
    let server = MockServer::start().await;
    mount_code_exchange(&server).await;
    mount_userinfo(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "email": "owner@example.com" })),
    )
    .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    let flow = auth_flow(&server, store.clone());

    let outcome = flow.handle_callback("abc").await.unwrap();
    assert_eq!(
        outcome,
        CallbackOutcome::Authorized {
            email: "owner@example.com".into()
        }
    );

    let saved = store.get_credential().await.unwrap().unwrap();
    assert_eq!(saved.access_token, "ya29.fresh");
    assert_eq!(saved.refresh_token.as_deref(), Some("1//fresh-refresh"));
    assert_eq!(saved.scope.len(), 2);
    assert!(!saved.is_expired());
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn test_callback_rejects_identity_not_on_allow_list() {
    let server = MockServer::start().await;
    mount_code_exchange(&server).await;
    mount_userinfo(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "email": "intruder@example.com" })),
    )
    .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    let flow = auth_flow(&server, store.clone());

    let outcome = flow.handle_callback("abc").await.unwrap();
    assert_eq!(
        outcome,
        CallbackOutcome::Unauthorized {
            email: "intruder@example.com".into()
        }
    );
    assert_eq!(store.save_count(), 0);
    assert!(store.get_credential().await.unwrap().is_none());
}

#[tokio::test]
async fn test_callback_rejection_keeps_previous_credential() {
    let server = MockServer::start().await;
    mount_code_exchange(&server).await;
    mount_userinfo(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "email": "intruder@example.com" })),
    )
    .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(60_000)).await.unwrap();
    let flow = auth_flow(&server, store.clone());

    flow.handle_callback("abc").await.unwrap();

    let kept = store.get_credential().await.unwrap().unwrap();
    assert_eq!(kept.access_token, "ya29.stored");
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn test_callback_without_email() {
    let server = MockServer::start().await;
    mount_code_exchange(&server).await;
    mount_userinfo(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "id": "1234567890" })),
    )
    .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    let flow = auth_flow(&server, store.clone());

    assert_eq!(flow.handle_callback("abc").await.unwrap(), CallbackOutcome::NoEmail);
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_callback_userinfo_failure() {
    let server = MockServer::start().await;
    mount_code_exchange(&server).await;
    mount_userinfo(
        &server,
        ResponseTemplate::new(500).set_body_json(json!({
            "error": { "code": 500, "message": "backend error" }
        })),
    )
    .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    let flow = auth_flow(&server, store.clone());

    assert_eq!(
        flow.handle_callback("abc").await.unwrap(),
        CallbackOutcome::UserInfoFailed
    );
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_callback_blank_code_never_calls_google() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    let flow = auth_flow(&server, store);

    let err = flow.handle_callback("   ").await.unwrap_err();
    assert!(matches!(err, AppError::MissingCode));
}

#[tokio::test]
async fn test_callback_rejected_code_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Bad Request"
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    let flow = auth_flow(&server, store.clone());

    let err = flow.handle_callback("stale").await.unwrap_err();
    assert!(matches!(err, AppError::ExternalService { status: Some(400), .. }));
    assert_eq!(store.save_count(), 0);
}

// ── Token refresh ────────────────────────────────────────────

#[tokio::test]
async fn test_valid_token_is_returned_without_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(3_600_000)).await.unwrap();
    let flow = auth_flow(&server, store);

    assert_eq!(flow.ensure_valid_token().await.unwrap(), "ya29.stored");
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=1%2F%2Fstored-refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "ya29.refreshed",
                    "expires_in": 3599,
                    "token_type": "Bearer"
                }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(-1_000)).await.unwrap();
    let flow = auth_flow(&server, store.clone());

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let flow = flow.clone();
            tokio::spawn(async move { flow.ensure_valid_token().await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "ya29.refreshed");
    }

    let stored = store.get_credential().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "ya29.refreshed");
    assert_eq!(stored.refresh_token.as_deref(), Some("1//stored-refresh"));
    assert!(!stored.is_expired());

    server.verify().await;
}

#[tokio::test]
async fn test_expired_without_refresh_token() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::with_privileged_account());
    let mut credential = stored_credential(-1_000);
    credential.refresh_token = None;
    store.save_credential(&credential).await.unwrap();
    let flow = auth_flow(&server, store);

    let err = flow.ensure_valid_token().await.unwrap_err();
    assert!(matches!(err, AppError::NoRefreshToken));

    let status = flow.status().await.unwrap();
    assert!(!status.authenticated);
    assert!(!status.has_refresh_token);
}

#[tokio::test]
async fn test_no_credential_at_all() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::with_privileged_account());
    let flow = auth_flow(&server, store);

    assert!(matches!(
        flow.ensure_valid_token().await.unwrap_err(),
        AppError::NotAuthenticated
    ));
    let status = flow.status().await.unwrap();
    assert!(!status.authenticated);
    assert!(status.expiry_date.is_none());
}

#[tokio::test]
async fn test_refresh_rejected_by_google_keeps_stored_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(-1_000)).await.unwrap();
    let flow = auth_flow(&server, store.clone());

    let err = flow.ensure_valid_token().await.unwrap_err();
    assert!(matches!(err, AppError::ExternalService { status: Some(400), .. }));

    let stored = store.get_credential().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "ya29.stored");
    assert_eq!(stored.refresh_token.as_deref(), Some("1//stored-refresh"));
}

#[tokio::test]
async fn test_revoke_clears_credential() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(60_000)).await.unwrap();
    let flow = auth_flow(&server, store.clone());

    assert!(flow.status().await.unwrap().authenticated);
    flow.revoke().await.unwrap();
    assert!(store.get_credential().await.unwrap().is_none());
    assert!(!flow.status().await.unwrap().authenticated);
}

async fn mount_refresh(server: &MockServer, delay: Duration) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "ya29.refreshed",
                    "expires_in": 3599,
                    "token_type": "Bearer"
                }))
                .set_delay(delay),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_token_close_to_expiry_is_refreshed() {
    let server = MockServer::start().await;
    mount_refresh(&server, Duration::ZERO).await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(30_000)).await.unwrap();
    let flow = auth_flow(&server, store.clone());

    assert_eq!(flow.ensure_valid_token().await.unwrap(), "ya29.refreshed");
    assert_eq!(
        store.get_credential().await.unwrap().unwrap().refresh_token.as_deref(),
        Some("1//stored-refresh")
    );

    server.verify().await;
}

#[tokio::test]
async fn test_consent_during_refresh_is_saved_after_it() {
    let server = MockServer::start().await;
    mount_refresh(&server, Duration::from_millis(300)).await;
    mount_code_exchange(&server).await;
    mount_userinfo(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "email": "owner@example.com" })),
    )
    .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(-1_000)).await.unwrap();
    let flow = auth_flow(&server, store.clone());

    let refresh = {
        let flow = flow.clone();
        tokio::spawn(async move { flow.ensure_valid_token().await })
    };
    // let the refresh take the lock before consent completes
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = flow.handle_callback("abc").await.unwrap();
    assert_eq!(
        outcome,
        CallbackOutcome::Authorized {
            email: "owner@example.com".into()
        }
    );
    assert_eq!(refresh.await.unwrap().unwrap(), "ya29.refreshed");

    let stored = store.get_credential().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "ya29.fresh");
    assert_eq!(stored.refresh_token.as_deref(), Some("1//fresh-refresh"));
    assert_eq!(store.save_count(), 2);

    assert_eq!(flow.ensure_valid_token().await.unwrap(), "ya29.fresh");
    server.verify().await;
}

// ── Appointments ─────────────────────────────────────────────

#[tokio::test]
async fn test_create_appointment_records_one_booking() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .and(header("authorization", "Bearer ya29.stored"))
        .and(body_string_contains("\"dateTime\":\"2024-01-01T10:00:00.000Z\""))
        .and(body_string_contains("hangoutsMeet"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "evt_demo",
            "status": "confirmed",
            "summary": "Demo",
            "hangoutLink": "https://meet.google.com/abc-defg-hij",
            "htmlLink": "https://www.google.com/calendar/event?eid=evt_demo"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(3_600_000)).await.unwrap();
    let appointments = reconciler(&server, store.clone());

    let created = appointments.create_appointment(demo_request()).await.unwrap();
    assert_eq!(created.appointment.id.as_deref(), Some("evt_demo"));
    assert_eq!(
        created.meet_link.as_deref(),
        Some("https://meet.google.com/abc-defg-hij")
    );

    let bookings = store.bookings();
    assert_eq!(bookings.len(), 1);
    let booking = &bookings[0];
    assert_eq!(booking.title, "Demo");
    assert_eq!(booking.start_time, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
    assert_eq!(booking.end_time, Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap());
    assert_eq!(booking.status, "confirmed");
    assert_eq!(booking.google_event_id.as_deref(), Some("evt_demo"));
    assert_eq!(booking.id, created.booking.id);
}

#[tokio::test]
async fn test_create_appointment_without_status_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "evt_2" })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(3_600_000)).await.unwrap();
    let appointments = reconciler(&server, store.clone());

    let created = appointments.create_appointment(demo_request()).await.unwrap();
    assert_eq!(created.booking.status, "unknown");
    assert!(created.meet_link.is_none());
}

#[tokio::test]
async fn test_invalid_appointment_makes_no_external_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(3_600_000)).await.unwrap();
    let appointments = reconciler(&server, store.clone());

    let mut request = demo_request();
    request.summary = None;
    let err = appointments.create_appointment(request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut request = demo_request();
    request.start = Some(EventTimeInput {
        date_time: Some("not-a-date".into()),
        time_zone: None,
    });
    let err = appointments.create_appointment(request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert!(store.bookings().is_empty());
}

#[tokio::test]
async fn test_failed_event_insert_records_no_booking() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "message": "Insufficient Permission" }
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(3_600_000)).await.unwrap();
    let appointments = reconciler(&server, store.clone());

    let err = appointments.create_appointment(demo_request()).await.unwrap_err();
    match err {
        AppError::ExternalService { status, message } => {
            assert_eq!(status, Some(403));
            assert!(message.contains("Insufficient Permission"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(store.bookings().is_empty());
}

#[tokio::test]
async fn test_create_appointment_without_credential() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::with_privileged_account());
    let appointments = reconciler(&server, store.clone());

    let err = appointments.create_appointment(demo_request()).await.unwrap_err();
    assert!(matches!(err, AppError::NotAuthenticated));
    assert!(store.bookings().is_empty());
}

#[tokio::test]
async fn test_cancel_appointment() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/calendar/v3/calendars/primary/events/evt_live"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/calendar/v3/calendars/primary/events/evt_gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "message": "Not Found" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/calendar/v3/calendars/primary/events/evt_deleted"))
        .respond_with(ResponseTemplate::new(410).set_body_json(json!({
            "error": { "code": 410, "message": "Resource has been deleted" }
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(3_600_000)).await.unwrap();
    let appointments = reconciler(&server, store);

    assert_eq!(
        appointments.cancel_appointment("evt_live").await.unwrap(),
        CancelOutcome::Cancelled
    );
    assert_eq!(
        appointments.cancel_appointment("evt_gone").await.unwrap(),
        CancelOutcome::AlreadyDeleted
    );
    assert_eq!(
        appointments.cancel_appointment("evt_deleted").await.unwrap(),
        CancelOutcome::AlreadyDeleted
    );
}

#[tokio::test]
async fn test_cancel_propagates_other_failures() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(3_600_000)).await.unwrap();
    let appointments = reconciler(&server, store);

    let err = appointments.cancel_appointment("evt_live").await.unwrap_err();
    assert!(matches!(err, AppError::ExternalService { status: Some(500), .. }));
}

#[tokio::test]
async fn test_get_missing_appointment_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events/evt_gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(3_600_000)).await.unwrap();
    let appointments = reconciler(&server, store);

    assert!(appointments.get_appointment("evt_gone").await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_events_uses_default_page_size() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .and(wiremock::matchers::query_param("maxResults", "15"))
        .and(wiremock::matchers::query_param("singleEvents", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": "evt_1", "summary": "First" },
                { "id": "evt_2", "summary": "Second" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_privileged_account());
    store.save_credential(&stored_credential(3_600_000)).await.unwrap();
    let appointments = reconciler(&server, store);

    let events = appointments.list_events(None, None).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].summary.as_deref(), Some("Second"));
}
