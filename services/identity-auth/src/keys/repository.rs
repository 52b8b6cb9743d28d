//! Durable storage interface for signing keys.

use crate::keys::signing_key::{KeyStatus, SigningKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_common::PlatformError;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Signing-key persistence.
///
/// Implementations must enforce at most one ACTIVE key per tenant: a unique
/// constraint on `(tenant_id, status = ACTIVE)` or an equivalent.
#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// The tenant's ACTIVE key.
    async fn find_active(&self, tenant_id: &str) -> Result<Option<SigningKey>, PlatformError>;

    /// Insert a new ACTIVE key. Fails with `Conflict` if the tenant already
    /// has one.
    async fn insert_active(&self, key: SigningKey) -> Result<(), PlatformError>;

    /// Atomically demote the current ACTIVE key (if any) to ROLLED_OVER and
    /// insert `key` as the new ACTIVE key. Returns the demoted key.
    async fn replace_active(
        &self,
        key: SigningKey,
        at: DateTime<Utc>,
    ) -> Result<Option<SigningKey>, PlatformError>;

    /// Any key by identifier, whatever its status.
    async fn find_by_kid(&self, kid: &str) -> Result<Option<SigningKey>, PlatformError>;

    /// A tenant's keys in the given statuses.
    async fn list_for_tenant(
        &self,
        tenant_id: &str,
        statuses: &[KeyStatus],
    ) -> Result<Vec<SigningKey>, PlatformError>;

    /// All keys in a status, across tenants.
    async fn list_by_status(&self, status: KeyStatus) -> Result<Vec<SigningKey>, PlatformError>;

    /// Change a key's status.
    async fn update_status(
        &self,
        kid: &str,
        status: KeyStatus,
        at: DateTime<Utc>,
    ) -> Result<(), PlatformError>;
}

/// Key repository held in process memory.
#[derive(Default)]
pub struct InMemoryKeyRepository {
    keys: RwLock<HashMap<String, SigningKey>>,
}

impl InMemoryKeyRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn active_kid(keys: &HashMap<String, SigningKey>, tenant_id: &str) -> Option<String> {
    keys.values()
        .find(|k| k.tenant_id == tenant_id && k.status == KeyStatus::Active)
        .map(|k| k.kid.clone())
}

#[async_trait]
impl KeyRepository for InMemoryKeyRepository {
    async fn find_active(&self, tenant_id: &str) -> Result<Option<SigningKey>, PlatformError> {
        let keys = self.keys.read().await;
        Ok(active_kid(&keys, tenant_id).and_then(|kid| keys.get(&kid).cloned()))
    }

    async fn insert_active(&self, key: SigningKey) -> Result<(), PlatformError> {
        let mut keys = self.keys.write().await;
        if active_kid(&keys, &key.tenant_id).is_some() {
            return Err(PlatformError::conflict(format!(
                "tenant {} already has an active key",
                key.tenant_id
            )));
        }
        if keys.contains_key(&key.kid) {
            return Err(PlatformError::conflict(format!("kid {} already exists", key.kid)));
        }
        keys.insert(key.kid.clone(), key.with_status(KeyStatus::Active, Utc::now()));
        Ok(())
    }

    async fn replace_active(
        &self,
        key: SigningKey,
        at: DateTime<Utc>,
    ) -> Result<Option<SigningKey>, PlatformError> {
        let mut keys = self.keys.write().await;
        if keys.contains_key(&key.kid) {
            return Err(PlatformError::conflict(format!("kid {} already exists", key.kid)));
        }

        let demoted = active_kid(&keys, &key.tenant_id).and_then(|kid| {
            keys.get_mut(&kid).map(|current| {
                current.status = KeyStatus::RolledOver;
                current.status_changed_at = at;
                current.clone()
            })
        });
        keys.insert(key.kid.clone(), key.with_status(KeyStatus::Active, at));
        Ok(demoted)
    }

    async fn find_by_kid(&self, kid: &str) -> Result<Option<SigningKey>, PlatformError> {
        Ok(self.keys.read().await.get(kid).cloned())
    }

    async fn list_for_tenant(
        &self,
        tenant_id: &str,
        statuses: &[KeyStatus],
    ) -> Result<Vec<SigningKey>, PlatformError> {
        Ok(self
            .keys
            .read()
            .await
            .values()
            .filter(|k| k.tenant_id == tenant_id && statuses.contains(&k.status))
            .cloned()
            .collect())
    }

    async fn list_by_status(&self, status: KeyStatus) -> Result<Vec<SigningKey>, PlatformError> {
        Ok(self
            .keys
            .read()
            .await
            .values()
            .filter(|k| k.status == status)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        kid: &str,
        status: KeyStatus,
        at: DateTime<Utc>,
    ) -> Result<(), PlatformError> {
        let mut keys = self.keys.write().await;
        let key = keys
            .get_mut(kid)
            .ok_or_else(|| PlatformError::NotFound(format!("kid {kid}")))?;
        key.status = status;
        key.status_changed_at = at;
        Ok(())
    }
}
