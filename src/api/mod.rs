use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use subtle::ConstantTimeEq;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod handlers;

/// Full application: health probes, the `/api/v1` API and the
/// cross-cutting layers (tracing, CORS, request id, security headers).
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .nest("/api/v1", api_router(state.clone()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
}

/// Build the appointment API router.
/// All routes are relative; the caller mounts this under `/api/v1`.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Google redirects the browser here, so these stay unauthenticated.
    let oauth = Router::new()
        .route("/appointments/auth", get(handlers::redirect_to_consent))
        .route("/appointments/auth/initiate", get(handlers::initiate_auth))
        .route("/appointments/redirect", get(handlers::oauth_callback));

    let admin = Router::new()
        .route("/appointments/auth/revoke", post(handlers::revoke_auth))
        .route("/appointments/auth/status", get(handlers::auth_status))
        .route("/appointments/auth/refresh", post(handlers::refresh_token))
        .route("/appointments", post(handlers::create_appointment))
        .route("/appointments/calendars", get(handlers::list_calendars))
        .route("/appointments/events", get(handlers::list_events))
        .route(
            "/appointments/events/:id",
            get(handlers::get_appointment).delete(handlers::cancel_appointment),
        )
        .route("/appointments/bookings", get(handlers::list_bookings))
        .route_layer(middleware::from_fn_with_state(state, admin_auth));

    oauth.merge(admin).fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    if let Some(db) = &state.db {
        db.ping().await.map_err(|e| {
            tracing::error!("readiness: database ping failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        })?;
    }
    Ok("ok")
}

/// Middleware: validates `X-Admin-Key` (or `Authorization: Bearer`) against
/// the configured admin key. Returns 401 if missing/invalid, 500 if the
/// server has no key configured.
async fn admin_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided_key = req
        .headers()
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim())
        });

    let expected = state.config.admin_key.as_deref().ok_or_else(|| {
        tracing::error!("ADMIN_KEY is not set; rejecting management request");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    match provided_key {
        Some(k) if bool::from(k.as_bytes().ct_eq(expected.as_bytes())) => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!("admin API: invalid key");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("admin API: missing X-Admin-Key header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Restrict CORS to the dashboard (DASHBOARD_ORIGIN, defaults to localhost for dev).
fn cors_layer() -> CorsLayer {
    let dashboard_origin =
        std::env::var("DASHBOARD_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            origin_str == dashboard_origin
                || origin_str.starts_with("http://localhost:")
                || origin_str.starts_with("http://127.0.0.1:")
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
            HeaderName::from_static("x-admin-key"),
            HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true)
}

/// Middleware: injects a unique X-Request-Id into every response.
async fn request_id_middleware(req: Request, next: Next) -> Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: injects security headers into every response.
async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    // OAuth redirects carry the callback email in the query string
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");

    resp
}
