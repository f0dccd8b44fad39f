use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("no authorization code provided")]
    MissingCode,

    #[error("calendar is not authenticated")]
    NotAuthenticated,

    #[error("identity endpoint returned no email")]
    NoEmailReturned,

    #[error("identity {email} is not allowed to connect the calendar")]
    UnauthorizedIdentity { email: String },

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("no active privileged account found")]
    NoPrivilegedAccount,

    #[error("external service error ({status:?}): {message}")]
    ExternalService { status: Option<u16>, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn external(status: Option<u16>, message: impl Into<String>) -> Self {
        AppError::ExternalService {
            status,
            message: message.into(),
        }
    }

    /// True when the upstream answered 404 or 410 (deleted event).
    pub fn is_external_not_found(&self) -> bool {
        matches!(
            self,
            AppError::ExternalService {
                status: Some(404) | Some(410),
                ..
            }
        )
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        let status = e.status().map(|s| s.as_u16());
        if e.is_timeout() {
            return AppError::external(status, "request to Google timed out");
        }
        AppError::external(status, e.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl AppError {
    /// Message safe to show a client. Database and internal details are
    /// replaced with a generic message.
    pub fn public_message(&self) -> String {
        self.parts().3
    }

    fn parts(&self) -> (StatusCode, &'static str, &'static str, String) {
        match self {
            AppError::Validation(m) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "validation_failed",
                m.clone(),
            ),
            AppError::MissingCode => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "missing_code",
                "no authorization code provided".to_string(),
            ),
            AppError::NotAuthenticated => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "calendar_not_authenticated",
                "not authenticated, connect Google Calendar first".to_string(),
            ),
            AppError::NoEmailReturned => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "no_email",
                "identity endpoint returned no email".to_string(),
            ),
            AppError::UnauthorizedIdentity { email } => (
                StatusCode::FORBIDDEN,
                "permission_error",
                "unauthorized",
                format!("{} is not allowed to connect the calendar", email),
            ),
            AppError::NoRefreshToken => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "authentication_error",
                "no_refresh_token",
                "no refresh token available, re-run calendar consent".to_string(),
            ),
            AppError::NoPrivilegedAccount => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "no_privileged_account",
                "no active super admin account".to_string(),
            ),
            AppError::ExternalService { message, .. } => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "external_service_error",
                message.clone(),
            ),
            AppError::Database(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal_server_error",
                "internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Database(e) => tracing::error!("Database error: {}", e),
            AppError::Internal(e) => tracing::error!("Internal error: {}", e),
            _ => {}
        }
        let (status, error_type, code, msg) = self.parts();

        let body = Json(json!({
            "success": false,
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_not_found_detection() {
        assert!(AppError::external(Some(404), "gone").is_external_not_found());
        assert!(AppError::external(Some(410), "deleted").is_external_not_found());
        assert!(!AppError::external(Some(500), "boom").is_external_not_found());
        assert!(!AppError::external(None, "network").is_external_not_found());
        assert!(!AppError::NoRefreshToken.is_external_not_found());
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AppError::MissingCode, StatusCode::BAD_REQUEST),
            (AppError::NotAuthenticated, StatusCode::UNAUTHORIZED),
            (
                AppError::UnauthorizedIdentity { email: "a@b.c".into() },
                StatusCode::FORBIDDEN,
            ),
            (AppError::NoRefreshToken, StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::external(Some(503), "down"), StatusCode::BAD_GATEWAY),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_public_message_hides_internal_details() {
        let db = AppError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(db.public_message(), "internal server error");

        let internal = AppError::Internal(anyhow::anyhow!("connect to 10.0.0.5:5432 refused"));
        assert_eq!(internal.public_message(), "internal server error");

        let upstream = AppError::external(Some(400), "token exchange failed (400): Bad Request");
        assert_eq!(
            upstream.public_message(),
            "token exchange failed (400): Bad Request"
        );
        assert_eq!(
            AppError::NoPrivilegedAccount.public_message(),
            "no active super admin account"
        );
    }
}
