use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::booking::{Booking, NewBooking};
use crate::models::credential::Credential;
use crate::store::{BookingStore, TokenStore};

/// In-process store with the same semantics as `PgStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    has_account: bool,
    credential: Option<Credential>,
    bookings: Vec<Booking>,
    saves: usize,
}

impl MemoryStore {
    /// Store with no privileged account: every write fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with an active privileged account and no credential yet.
    pub fn with_privileged_account() -> Self {
        let store = Self::default();
        store.lock().has_account = true;
        store
    }

    /// Number of successful `save_credential` calls.
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.lock().bookings.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means another test thread panicked mid-write.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get_credential(&self) -> Result<Option<Credential>, AppError> {
        Ok(self.lock().credential.clone())
    }

    async fn save_credential(&self, credential: &Credential) -> Result<(), AppError> {
        let mut inner = self.lock();
        if !inner.has_account {
            return Err(AppError::NoPrivilegedAccount);
        }
        let previous_refresh = inner
            .credential
            .as_ref()
            .and_then(|c| c.refresh_token.clone());
        let mut next = credential.clone();
        next.refresh_token = next
            .refresh_token
            .filter(|t| !t.is_empty())
            .or(previous_refresh);
        inner.credential = Some(next);
        inner.saves += 1;
        Ok(())
    }

    async fn update_access_token(
        &self,
        access_token: &str,
        expiry_date: i64,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        if !inner.has_account {
            return Err(AppError::NoPrivilegedAccount);
        }
        match inner.credential.as_mut() {
            Some(c) => {
                c.access_token = access_token.to_string();
                c.expiry_date = expiry_date;
            }
            None => {
                inner.credential = Some(Credential {
                    access_token: access_token.to_string(),
                    refresh_token: None,
                    scope: Vec::new(),
                    expiry_date,
                });
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        let mut inner = self.lock();
        if !inner.has_account {
            return Err(AppError::NoPrivilegedAccount);
        }
        inner.credential = None;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_booking(&self, booking: &NewBooking) -> Result<Booking, AppError> {
        let row = booking.clone().into_booking();
        self.lock().bookings.push(row.clone());
        Ok(row)
    }

    async fn list_bookings(
        &self,
        call_log_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Booking>, AppError> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self
            .lock()
            .bookings
            .iter()
            .rev()
            .filter(|b| call_log_id.is_none() || b.call_log_id == call_log_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
