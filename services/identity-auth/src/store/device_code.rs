//! Device authorization grant (RFC 8628) state.
//!
//! Each record is stored under its device code and indexed by user code.
//! Decisions are compare-and-swap transitions from PENDING, so two
//! concurrent approvals cannot both land.

use crate::error::AuthError;
use crate::store::random_hex;
use chrono::{DateTime, Utc};
use rust_common::CacheClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decision state of a device code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceCodeStatus {
    /// Waiting for the user
    Pending,
    /// Approved; `user_id` is set
    Approved,
    /// Denied
    Denied,
}

/// Device authorization record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCode {
    /// Code the device polls with
    pub device_code: String,
    /// Code the user types in
    pub user_code: String,
    /// Decision state
    pub status: DeviceCodeStatus,
    /// Approving user
    pub user_id: Option<String>,
    /// Requested scope
    pub scope: Option<String>,
    /// Requesting client
    pub client_id: Option<String>,
    /// Expiry
    pub expires_at: DateTime<Utc>,
}

/// Device code store.
#[derive(Clone)]
pub struct DeviceCodeStore {
    cache: CacheClient,
    ttl: Duration,
}

impl DeviceCodeStore {
    /// Create a store whose codes live for `ttl`.
    #[must_use]
    pub const fn new(cache: CacheClient, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Code lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a PENDING record with fresh device and user codes.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the store fails.
    pub async fn create(
        &self,
        scope: Option<String>,
        client_id: Option<String>,
    ) -> Result<DeviceCode, AuthError> {
        let lifetime = chrono::Duration::from_std(self.ttl)
            .map_err(|e| AuthError::internal(format!("Invalid device code TTL: {e}")))?;
        let record = DeviceCode {
            device_code: random_hex(32),
            user_code: random_hex(4).to_uppercase(),
            status: DeviceCodeStatus::Pending,
            user_id: None,
            scope,
            client_id,
            expires_at: Utc::now() + lifetime,
        };

        self.cache
            .set_json(&device_key(&record.device_code), &record, self.ttl)
            .await?;
        self.cache
            .set(
                &user_code_key(&record.user_code),
                record.device_code.as_bytes(),
                self.ttl,
            )
            .await?;
        Ok(record)
    }

    /// Record for a device code.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the store fails.
    pub async fn find(&self, device_code: &str) -> Result<Option<DeviceCode>, AuthError> {
        Ok(self.cache.get_json(&device_key(device_code)).await?)
    }

    /// PENDING → APPROVED for `user_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user code, `BadRequest` if already decided.
    pub async fn approve(&self, user_code: &str, user_id: &str) -> Result<DeviceCode, AuthError> {
        self.decide(user_code, DeviceCodeStatus::Approved, Some(user_id))
            .await
    }

    /// PENDING → DENIED.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user code, `BadRequest` if already decided.
    pub async fn deny(&self, user_code: &str) -> Result<DeviceCode, AuthError> {
        self.decide(user_code, DeviceCodeStatus::Denied, None).await
    }

    /// Remove a record and its user-code index.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the store fails.
    pub async fn remove(&self, record: &DeviceCode) -> Result<(), AuthError> {
        self.cache.delete(&device_key(&record.device_code)).await?;
        self.cache.delete(&user_code_key(&record.user_code)).await?;
        Ok(())
    }

    async fn decide(
        &self,
        user_code: &str,
        status: DeviceCodeStatus,
        user_id: Option<&str>,
    ) -> Result<DeviceCode, AuthError> {
        let not_found = || AuthError::NotFound("Unknown user code".to_string());

        let device_code = self
            .cache
            .get(&user_code_key(&user_code.to_uppercase()))
            .await?
            .ok_or_else(not_found)?;
        let key = device_key(&String::from_utf8_lossy(&device_code));
        let current = self.cache.get(&key).await?.ok_or_else(not_found)?;

        let mut record: DeviceCode = serde_json::from_slice(&current)
            .map_err(|e| AuthError::internal(format!("Corrupt device code record: {e}")))?;
        if record.status != DeviceCodeStatus::Pending {
            return Err(already_decided());
        }
        record.status = status;
        record.user_id = user_id.map(str::to_string);

        let remaining = (record.expires_at - Utc::now())
            .to_std()
            .map_err(|_| not_found())?;
        let updated = serde_json::to_vec(&record)
            .map_err(|e| AuthError::internal(format!("Device code encoding failed: {e}")))?;

        if self
            .cache
            .compare_and_swap(&key, &current, &updated, remaining)
            .await?
        {
            Ok(record)
        } else {
            Err(already_decided())
        }
    }
}

fn already_decided() -> AuthError {
    AuthError::bad_request("Device code already decided")
}

fn device_key(device_code: &str) -> String {
    format!("device:{device_code}")
}

fn user_code_key(user_code: &str) -> String {
    format!("user:{user_code}")
}
