//! Persistence seams for the calendar integration.
//!
//! `PgStore` is the production backend; `MemoryStore` backs the test suite
//! and local dry runs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::booking::{Booking, NewBooking};
use crate::models::credential::Credential;

pub mod memory;
pub mod postgres;

/// Credential slot on the single privileged (super admin) account.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// `None` when consent was never completed or no privileged account exists.
    async fn get_credential(&self) -> Result<Option<Credential>, AppError>;

    /// Upsert the full token set. A missing refresh token keeps the stored one.
    async fn save_credential(&self, credential: &Credential) -> Result<(), AppError>;

    /// Refresh-cycle update; the refresh token is left untouched.
    async fn update_access_token(&self, access_token: &str, expiry_date: i64)
        -> Result<(), AppError>;

    /// Null out every credential field.
    async fn clear(&self) -> Result<(), AppError>;

    async fn is_expired(&self) -> Result<bool, AppError> {
        Ok(match self.get_credential().await? {
            Some(credential) => credential.is_expired(),
            None => true,
        })
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert_booking(&self, booking: &NewBooking) -> Result<Booking, AppError>;

    /// Newest first, optionally narrowed to one call log.
    async fn list_bookings(
        &self,
        call_log_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Booking>, AppError>;
}
