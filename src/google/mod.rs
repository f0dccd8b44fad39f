//! HTTP clients for Google's OAuth and Calendar APIs.
//!
//! Both clients share one `reqwest::Client` built at startup with explicit
//! timeouts. Non-2xx responses become `AppError::ExternalService` carrying
//! the upstream status and message; nothing here retries.

use std::time::Duration;

use crate::config::GoogleConfig;
use crate::errors::AppError;

pub mod calendar;
pub mod oauth;
pub mod types;

use types::ErrorBody;

pub use calendar::GoogleCalendarClient;
pub use oauth::GoogleOAuthClient;

pub fn build_http_client(cfg: &GoogleConfig) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .use_rustls_tls()
        .pool_max_idle_per_host(8)
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .connect_timeout(Duration::from_secs(5))
        .build()?;
    Ok(client)
}

/// Pass through 2xx responses; turn anything else into `ExternalService`.
pub(crate) async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response, AppError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message())
        .unwrap_or_else(|| {
            if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                body
            }
        });

    tracing::warn!(status = status.as_u16(), "Google {} failed: {}", what, detail);
    Err(AppError::external(
        Some(status.as_u16()),
        format!("{} failed ({}): {}", what, status.as_u16(), detail),
    ))
}
