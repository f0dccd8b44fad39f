//! Google OAuth consent flow for the single calendar integration account.
//!
//! The callback walks `exchange_code` → `verify_identity` → `commit`. The
//! grant types enforce that order: only a `VerifiedGrant` can be committed,
//! and only `verify_identity` can build one, so tokens for an identity that
//! is not on the allow-list never reach the `TokenStore`.
//!
//! Refreshes are serialized by `refresh_lock`. Callers that queue behind an
//! in-flight refresh re-read the store once they hold the lock and reuse the
//! fresh token instead of refreshing again. `commit` takes the same lock so a
//! new consent cannot interleave with a refresh.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::errors::AppError;
use crate::google::GoogleOAuthClient;
use crate::models::credential::Credential;
use crate::store::TokenStore;

/// Tokens this close to expiry are refreshed before use so they cannot
/// lapse mid-request.
pub const EXPIRY_SKEW_MS: i64 = 60_000;

/// Identities permitted to finish consent. Matching ignores ASCII case.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    emails: Vec<String>,
}

impl AllowList {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(Into::into)
                .map(|e| e.trim().to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, email: &str) -> bool {
        let email = email.trim();
        self.emails.iter().any(|e| e.eq_ignore_ascii_case(email))
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

/// Tokens fresh from the code exchange; not yet tied to a checked identity.
#[derive(Debug)]
pub struct PendingGrant {
    credential: Credential,
}

/// Tokens whose owner passed the allow-list check.
#[derive(Debug)]
pub struct VerifiedGrant {
    credential: Credential,
    email: String,
}

impl VerifiedGrant {
    pub fn email(&self) -> &str {
        &self.email
    }
}

/// What the OAuth callback ended in; the HTTP layer turns it into a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Authorized { email: String },
    Unauthorized { email: String },
    NoEmail,
    UserInfoFailed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    pub has_refresh_token: bool,
    pub expiry_date: Option<i64>,
}

pub struct CalendarAuthFlow {
    oauth: GoogleOAuthClient,
    tokens: Arc<dyn TokenStore>,
    allow_list: AllowList,
    refresh_lock: Mutex<()>,
}

impl CalendarAuthFlow {
    pub fn new(oauth: GoogleOAuthClient, tokens: Arc<dyn TokenStore>, allow_list: AllowList) -> Self {
        Self {
            oauth,
            tokens,
            allow_list,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn consent_url(&self) -> Result<String, AppError> {
        self.oauth.consent_url()
    }

    pub async fn exchange_code(&self, code: &str) -> Result<PendingGrant, AppError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AppError::MissingCode);
        }
        let credential = self.oauth.exchange_code(code).await?;
        Ok(PendingGrant { credential })
    }

    /// Look up the grant's owner and check it against the allow-list.
    /// On any failure the grant is dropped here.
    pub async fn verify_identity(&self, grant: PendingGrant) -> Result<VerifiedGrant, AppError> {
        let info = self.oauth.user_info(&grant.credential.access_token).await?;
        let email = info
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .ok_or(AppError::NoEmailReturned)?;

        if !self.allow_list.contains(&email) {
            return Err(AppError::UnauthorizedIdentity { email });
        }

        Ok(VerifiedGrant {
            credential: grant.credential,
            email,
        })
    }

    pub async fn commit(&self, grant: VerifiedGrant) -> Result<String, AppError> {
        let _guard = self.refresh_lock.lock().await;
        self.tokens.save_credential(&grant.credential).await?;
        Ok(grant.email)
    }

    /// Full callback: exchange, verify, then persist only on success.
    pub async fn handle_callback(&self, code: &str) -> Result<CallbackOutcome, AppError> {
        let pending = self.exchange_code(code).await?;

        let verified = match self.verify_identity(pending).await {
            Ok(v) => v,
            Err(AppError::NoEmailReturned) => {
                tracing::warn!("calendar consent: userinfo returned no email");
                return Ok(CallbackOutcome::NoEmail);
            }
            Err(AppError::UnauthorizedIdentity { email }) => {
                tracing::warn!(email = %email, "calendar consent rejected: identity not on allow-list");
                return Ok(CallbackOutcome::Unauthorized { email });
            }
            Err(AppError::ExternalService { status, message }) => {
                tracing::error!(?status, "calendar consent: userinfo lookup failed: {}", message);
                return Ok(CallbackOutcome::UserInfoFailed);
            }
            Err(e) => return Err(e),
        };

        let email = self.commit(verified).await?;
        tracing::info!(email = %email, "calendar consent completed, credential saved");
        Ok(CallbackOutcome::Authorized { email })
    }

    /// Access token valid for at least `EXPIRY_SKEW_MS`, refreshing at most
    /// once across concurrent callers.
    pub async fn ensure_valid_token(&self) -> Result<String, AppError> {
        if let Some(token) = self.current_token().await? {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(token) = self.current_token().await? {
            return Ok(token);
        }
        self.refresh_locked().await
    }

    /// Refresh regardless of expiry.
    pub async fn force_refresh(&self) -> Result<(), AppError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<AuthStatus, AppError> {
        let credential = self.tokens.get_credential().await?;
        Ok(match credential {
            Some(c) => AuthStatus {
                authenticated: !c.is_expired() || c.has_refresh_token(),
                has_refresh_token: c.has_refresh_token(),
                expiry_date: Some(c.expiry_date),
            },
            None => AuthStatus {
                authenticated: false,
                has_refresh_token: false,
                expiry_date: None,
            },
        })
    }

    pub async fn revoke(&self) -> Result<(), AppError> {
        let _guard = self.refresh_lock.lock().await;
        self.tokens.clear().await?;
        tracing::info!("calendar credential cleared");
        Ok(())
    }

    async fn current_token(&self) -> Result<Option<String>, AppError> {
        Ok(self
            .tokens
            .get_credential()
            .await?
            .filter(|c| !c.is_expired_at(Utc::now().timestamp_millis() + EXPIRY_SKEW_MS))
            .map(|c| c.access_token))
    }

    /// Caller must hold `refresh_lock`.
    async fn refresh_locked(&self) -> Result<String, AppError> {
        let refresh_token = self
            .tokens
            .get_credential()
            .await?
            .ok_or(AppError::NotAuthenticated)?
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AppError::NoRefreshToken)?;

        let grant = self.oauth.refresh(&refresh_token).await?;
        let expiry_date = Utc::now().timestamp_millis() + grant.expires_in.saturating_mul(1000);
        self.tokens
            .update_access_token(&grant.access_token, expiry_date)
            .await?;

        tracing::info!(expiry_date, "calendar access token refreshed");
        Ok(grant.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list_ignores_case_and_whitespace() {
        let list = AllowList::new(["Owner@Example.com", " ", "ops@example.com "]);
        assert!(list.contains("owner@example.com"));
        assert!(list.contains(" OPS@example.com"));
        assert!(!list.contains("intruder@example.com"));
        assert!(!list.is_empty());
    }

    #[test]
    fn test_empty_allow_list_rejects_everyone() {
        let list = AllowList::new(Vec::<String>::new());
        assert!(list.is_empty());
        assert!(!list.contains("owner@example.com"));
    }
}
