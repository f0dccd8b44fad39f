//! Google OAuth credential held on the privileged account.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Stored OAuth token set for the single calendar integration account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    /// Google only returns a refresh token on consent, never on refresh.
    pub refresh_token: Option<String>,
    pub scope: Vec<String>,
    /// Absolute expiry, milliseconds since the Unix epoch.
    pub expiry_date: i64,
}

impl Credential {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expiry_date
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Space-separated form used by both Google and the `google_scope` column.
    pub fn scope_string(&self) -> String {
        self.scope.join(" ")
    }
}

/// Parse a space-separated scope string, dropping duplicates.
pub fn parse_scope(raw: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for s in raw.split_whitespace() {
        if !scopes.iter().any(|existing| existing == s) {
            scopes.push(s.to_string());
        }
    }
    scopes
}

/// Raw response from Google's token endpoint (code exchange or refresh).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl TokenGrant {
    /// Convert to a credential whose expiry is anchored at `now_ms`.
    pub fn into_credential(self, now_ms: i64) -> Credential {
        Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            scope: self.scope.as_deref().map(parse_scope).unwrap_or_default(),
            expiry_date: now_ms + self.expires_in.saturating_mul(1000),
        }
    }
}
