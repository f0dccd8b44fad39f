use chrono::Utc;
use url::Url;

use crate::config::GoogleConfig;
use crate::errors::AppError;
use crate::google::check;
use crate::google::types::UserInfo;
use crate::models::credential::{Credential, TokenGrant};

/// Scopes requested on every consent: calendar read + event write, identity.
pub const CONSENT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/calendar.events",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

#[derive(Clone)]
pub struct GoogleOAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
}

impl GoogleOAuthClient {
    pub fn new(http: reqwest::Client, cfg: &GoogleConfig) -> Self {
        Self {
            http,
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            redirect_uri: cfg.redirect_uri.clone(),
            auth_url: cfg.auth_url.clone(),
            token_url: cfg.token_url.clone(),
            userinfo_url: cfg.userinfo_url.clone(),
        }
    }

    /// Consent URL requesting offline access. `prompt=consent` makes Google
    /// issue a refresh token on every grant, not just the first.
    pub fn consent_url(&self) -> Result<String, AppError> {
        let scope = CONSENT_SCOPES.join(" ");
        let url = Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid GOOGLE_AUTH_URL: {}", e)))?;
        Ok(url.into())
    }

    /// Trade an authorization code for a token set. Nothing is persisted.
    pub async fn exchange_code(&self, code: &str) -> Result<Credential, AppError> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;
        let grant: TokenGrant = check(resp, "token exchange").await?.json().await?;
        Ok(grant.into_credential(Utc::now().timestamp_millis()))
    }

    /// Mint a new access token from a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AppError> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;
        let grant = check(resp, "token refresh").await?.json().await?;
        Ok(grant)
    }

    /// Identity of the principal behind `access_token`.
    pub async fn user_info(&self, access_token: &str) -> Result<UserInfo, AppError> {
        let resp = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;
        let info = check(resp, "userinfo lookup").await?.json().await?;
        Ok(info)
    }
}
