use serde::Deserialize;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
pub const GOOGLE_CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";

/// Dashboard page the OAuth callback lands on.
pub const CALENDAR_DASHBOARD_PATH: &str = "/dashboard/super-admin/outbound/calender";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub admin_key: Option<String>,
    pub frontend_url: String,
    pub google: GoogleConfig,
    /// Identities allowed to finish the consent flow.
    /// SUPER_ADMIN_EMAIL plus CALENDAR_ALLOWED_EMAILS (comma-separated).
    pub allowed_emails: Vec<String>,
    pub calendar_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub calendar_api: String,
    /// Per-request timeout for every outbound Google call.
    pub timeout_secs: u64,
}

impl GoogleConfig {
    /// Production Google endpoints with the given client credentials.
    pub fn with_defaults(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            auth_url: GOOGLE_AUTH_URL.into(),
            token_url: GOOGLE_TOKEN_URL.into(),
            userinfo_url: GOOGLE_USERINFO_URL.into(),
            calendar_api: GOOGLE_CALENDAR_API.into(),
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Full URL of the dashboard calendar page, without query string.
    pub fn calendar_redirect_base(&self) -> String {
        format!(
            "{}{}",
            self.frontend_url.trim_end_matches('/'),
            CALENDAR_DASHBOARD_PATH
        )
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let admin_key = std::env::var("ADMIN_KEY").ok().filter(|k| !k.is_empty());
    if admin_key.is_none() {
        let env_mode = std::env::var("APP_ENV")
            .or_else(|_| std::env::var("NODE_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!("ADMIN_KEY must be set when running in production");
        }
        eprintln!("⚠️  ADMIN_KEY is not set; management routes will answer 500 until it is configured.");
    }

    let mut allowed_emails = Vec::new();
    if let Ok(owner) = std::env::var("SUPER_ADMIN_EMAIL") {
        allowed_emails.push(owner);
    }
    allowed_emails.extend(split_list(
        &std::env::var("CALENDAR_ALLOWED_EMAILS").unwrap_or_default(),
    ));
    if allowed_emails.is_empty() {
        eprintln!("⚠️  SUPER_ADMIN_EMAIL is not set; no Google account can complete calendar consent.");
    }

    let google = GoogleConfig {
        client_id: std::env::var("CLIENT_ID").unwrap_or_default(),
        client_secret: std::env::var("SECRET_ID").unwrap_or_default(),
        redirect_uri: std::env::var("REDIRECT")
            .unwrap_or_else(|_| "http://localhost:5005/api/v1/appointments/redirect".into()),
        auth_url: std::env::var("GOOGLE_AUTH_URL").unwrap_or_else(|_| GOOGLE_AUTH_URL.into()),
        token_url: std::env::var("GOOGLE_TOKEN_URL").unwrap_or_else(|_| GOOGLE_TOKEN_URL.into()),
        userinfo_url: std::env::var("GOOGLE_USERINFO_URL")
            .unwrap_or_else(|_| GOOGLE_USERINFO_URL.into()),
        calendar_api: std::env::var("GOOGLE_CALENDAR_API")
            .unwrap_or_else(|_| GOOGLE_CALENDAR_API.into()),
        timeout_secs: std::env::var("GOOGLE_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30),
    };

    Ok(Config {
        port: std::env::var("PORT")
            .unwrap_or_else(|_| "5005".into())
            .parse()
            .unwrap_or(5005),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/booking".into()),
        admin_key,
        frontend_url: std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into()),
        google,
        allowed_emails,
        calendar_id: std::env::var("CALENDAR_ID").unwrap_or_else(|_| "primary".into()),
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
