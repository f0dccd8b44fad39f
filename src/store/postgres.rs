use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::booking::{Booking, NewBooking};
use crate::models::credential::{parse_scope, Credential};
use crate::store::{BookingStore, TokenStore};

/// Resolves the privileged account: oldest active super admin.
const PRIVILEGED_ACCOUNT: &str = "SELECT id FROM users WHERE role = 'super_admin' AND is_active = true ORDER BY created_at ASC LIMIT 1";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // -- Account Operations --

    /// Insert the super admin account if no user with this email exists.
    /// Returns true when a row was created.
    pub async fn seed_privileged_account(&self, email: &str, name: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"INSERT INTO users (email, name, role)
               VALUES ($1, $2, 'super_admin')
               ON CONFLICT (email) DO NOTHING"#,
        )
        .bind(email)
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_privileged_account(&self) -> anyhow::Result<Option<AccountRow>> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"SELECT id, email, name, role, is_active, created_at
               FROM users
               WHERE role = 'super_admin' AND is_active = true
               ORDER BY created_at ASC
               LIMIT 1"#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn get_credential(&self) -> Result<Option<Credential>, AppError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT google_access_token, google_refresh_token, google_expiry_date, google_scope FROM users WHERE id = ({})",
            PRIVILEGED_ACCOUNT
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(CredentialRow::into_credential))
    }

    async fn save_credential(&self, credential: &Credential) -> Result<(), AppError> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty());

        let result = sqlx::query(&format!(
            r#"UPDATE users
               SET google_access_token = $1,
                   google_refresh_token = COALESCE($2, google_refresh_token),
                   google_expiry_date = $3,
                   google_scope = $4,
                   updated_at = NOW()
               WHERE id = ({})"#,
            PRIVILEGED_ACCOUNT
        ))
        .bind(&credential.access_token)
        .bind(refresh_token)
        .bind(credential.expiry_date)
        .bind(credential.scope_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NoPrivilegedAccount);
        }
        Ok(())
    }

    async fn update_access_token(
        &self,
        access_token: &str,
        expiry_date: i64,
    ) -> Result<(), AppError> {
        let result = sqlx::query(&format!(
            r#"UPDATE users
               SET google_access_token = $1,
                   google_expiry_date = $2,
                   updated_at = NOW()
               WHERE id = ({})"#,
            PRIVILEGED_ACCOUNT
        ))
        .bind(access_token)
        .bind(expiry_date)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NoPrivilegedAccount);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        let result = sqlx::query(&format!(
            r#"UPDATE users
               SET google_access_token = NULL,
                   google_refresh_token = NULL,
                   google_expiry_date = NULL,
                   google_scope = NULL,
                   updated_at = NOW()
               WHERE id = ({})"#,
            PRIVILEGED_ACCOUNT
        ))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NoPrivilegedAccount);
        }
        Ok(())
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn insert_booking(&self, booking: &NewBooking) -> Result<Booking, AppError> {
        let row = sqlx::query_as::<_, Booking>(
            r#"INSERT INTO bookings (call_log_id, title, description, start_time, end_time, time_zone, google_event_id, meet_link, calendar_link, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               RETURNING id, call_log_id, title, description, start_time, end_time, time_zone, google_event_id, meet_link, calendar_link, status, created_at"#,
        )
        .bind(booking.call_log_id)
        .bind(&booking.title)
        .bind(&booking.description)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(&booking.time_zone)
        .bind(&booking.google_event_id)
        .bind(&booking.meet_link)
        .bind(&booking.calendar_link)
        .bind(&booking.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_bookings(
        &self,
        call_log_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Booking>, AppError> {
        let rows = sqlx::query_as::<_, Booking>(
            r#"SELECT id, call_log_id, title, description, start_time, end_time, time_zone, google_event_id, meet_link, calendar_link, status, created_at
               FROM bookings
               WHERE ($1::uuid IS NULL OR call_log_id = $1)
               ORDER BY created_at DESC
               LIMIT $2"#,
        )
        .bind(call_log_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    google_access_token: Option<String>,
    google_refresh_token: Option<String>,
    google_expiry_date: Option<i64>,
    google_scope: Option<String>,
}

impl CredentialRow {
    fn into_credential(self) -> Option<Credential> {
        Some(Credential {
            access_token: self.google_access_token?,
            refresh_token: self.google_refresh_token.filter(|t| !t.is_empty()),
            scope: self.google_scope.as_deref().map(parse_scope).unwrap_or_default(),
            expiry_date: self.google_expiry_date?,
        })
    }
}

#[derive(Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct AccountRow {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
