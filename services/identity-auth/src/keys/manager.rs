//! Per-tenant signing key management.
//!
//! Generation and rotation take a per-tenant lock inside the process; the
//! repository's one-ACTIVE-per-tenant constraint resolves races between
//! processes, and the loser re-reads the winner's key.

use crate::error::AuthError;
use crate::jwks::{Jwks, JwksPublisher};
use crate::keys::repository::KeyRepository;
use crate::keys::signing_key::{KeyStatus, SigningKey};
use crate::metrics;
use chrono::{DateTime, Utc};
use rust_common::{with_timeout, PlatformError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Outcome of one scheduled rotation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RotationReport {
    /// ACTIVE keys replaced
    pub rotated: usize,
    /// ROLLED_OVER keys moved to EXPIRED
    pub expired: usize,
}

/// Signing key lifecycle manager.
pub struct KeyManager {
    repository: Arc<dyn KeyRepository>,
    key_lifetime: chrono::Duration,
    rollover_grace: chrono::Duration,
    timeout: Duration,
    tenant_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyManager {
    /// Create a manager.
    ///
    /// `key_lifetime` is how long a key stays ACTIVE before scheduled
    /// rotation; `rollover_grace` is how long a demoted key stays published.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a duration is out of range.
    pub fn new(
        repository: Arc<dyn KeyRepository>,
        key_lifetime: Duration,
        rollover_grace: Duration,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let to_chrono = |d: Duration, name: &str| {
            chrono::Duration::from_std(d)
                .map_err(|e| AuthError::config(format!("Invalid {name}: {e}")))
        };
        Ok(Self {
            repository,
            key_lifetime: to_chrono(key_lifetime, "key lifetime")?,
            rollover_grace: to_chrono(rollover_grace, "rollover grace")?,
            timeout,
            tenant_locks: Mutex::new(HashMap::new()),
        })
    }

    /// The tenant's ACTIVE key, generating one if none exists.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the repository fails or times out.
    pub async fn get_active_signing_key(&self, tenant_id: &str) -> Result<SigningKey, AuthError> {
        if let Some(key) = self.find_active(tenant_id).await? {
            return Ok(key);
        }

        let lock = self.tenant_lock(tenant_id).await;
        let _guard = lock.lock().await;

        // Another task may have generated it while we waited.
        if let Some(key) = self.find_active(tenant_id).await? {
            return Ok(key);
        }

        let key = SigningKey::generate(tenant_id, Utc::now(), self.key_lifetime)?;
        let inserted = with_timeout(
            self.timeout,
            "keys.insert_active",
            self.repository.insert_active(key.clone()),
        )
        .await;

        match inserted {
            Ok(()) => {
                info!(tenant_id = %tenant_id, kid = %key.kid, "Generated signing key");
                metrics::record_key_transition("generated");
                Ok(key)
            }
            Err(PlatformError::Conflict(_)) => {
                // Another instance won; use its key.
                self.find_active(tenant_id).await?.ok_or_else(|| {
                    AuthError::internal("Active key vanished after conflicting insert")
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Any key by identifier, including EXPIRED keys.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the repository fails or times out.
    pub async fn find_by_kid(&self, kid: &str) -> Result<Option<SigningKey>, AuthError> {
        Ok(with_timeout(self.timeout, "keys.find_by_kid", self.repository.find_by_kid(kid)).await?)
    }

    /// JWKS with the tenant's ACTIVE and ROLLED_OVER keys.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the repository fails or times out.
    pub async fn get_jwks_for_tenant(&self, tenant_id: &str) -> Result<Jwks, AuthError> {
        let keys = with_timeout(
            self.timeout,
            "keys.list_for_tenant",
            self.repository
                .list_for_tenant(tenant_id, &[KeyStatus::Active, KeyStatus::RolledOver]),
        )
        .await?;
        Ok(JwksPublisher::publish(&keys))
    }

    /// Create a new ACTIVE key and demote the current one to ROLLED_OVER.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the repository fails or times out.
    pub async fn rotate(&self, tenant_id: &str) -> Result<SigningKey, AuthError> {
        self.rotate_at(tenant_id, Utc::now()).await
    }

    async fn rotate_at(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<SigningKey, AuthError> {
        let lock = self.tenant_lock(tenant_id).await;
        let _guard = lock.lock().await;

        let key = SigningKey::generate(tenant_id, now, self.key_lifetime)?;
        let demoted = with_timeout(
            self.timeout,
            "keys.replace_active",
            self.repository.replace_active(key.clone(), now),
        )
        .await?;

        info!(
            tenant_id = %tenant_id,
            kid = %key.kid,
            previous_kid = demoted.as_ref().map_or("none", |k| k.kid.as_str()),
            "Rotated signing key"
        );
        metrics::record_key_transition("rotated");
        Ok(key)
    }

    /// Rotate ACTIVE keys older than their lifetime and expire ROLLED_OVER
    /// keys whose grace period has passed.
    ///
    /// A failure for one tenant is logged and does not stop the pass.
    ///
    /// # Errors
    ///
    /// Returns a platform error if keys cannot be listed.
    pub async fn run_rotation_cycle(&self, now: DateTime<Utc>) -> Result<RotationReport, AuthError> {
        let mut report = RotationReport::default();

        let active = with_timeout(
            self.timeout,
            "keys.list_by_status",
            self.repository.list_by_status(KeyStatus::Active),
        )
        .await?;
        for key in active.iter().filter(|k| k.created_at + self.key_lifetime <= now) {
            match self.rotate_at(&key.tenant_id, now).await {
                Ok(_) => report.rotated += 1,
                Err(e) => warn!(tenant_id = %key.tenant_id, kid = %key.kid, error = %e, "Scheduled rotation failed"),
            }
        }

        let rolled = with_timeout(
            self.timeout,
            "keys.list_by_status",
            self.repository.list_by_status(KeyStatus::RolledOver),
        )
        .await?;
        for key in rolled
            .iter()
            .filter(|k| k.status_changed_at + self.rollover_grace <= now)
        {
            let expired = with_timeout(
                self.timeout,
                "keys.update_status",
                self.repository.update_status(&key.kid, KeyStatus::Expired, now),
            )
            .await;
            match expired {
                Ok(()) => {
                    info!(tenant_id = %key.tenant_id, kid = %key.kid, "Expired signing key");
                    metrics::record_key_transition("expired");
                    report.expired += 1;
                }
                Err(e) => warn!(kid = %key.kid, error = %e, "Key expiry failed"),
            }
        }

        Ok(report)
    }

    async fn find_active(&self, tenant_id: &str) -> Result<Option<SigningKey>, AuthError> {
        Ok(with_timeout(
            self.timeout,
            "keys.find_active",
            self.repository.find_active(tenant_id),
        )
        .await?)
    }

    async fn tenant_lock(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.tenant_locks.lock().await;
        Arc::clone(locks.entry(tenant_id.to_string()).or_default())
    }
}
