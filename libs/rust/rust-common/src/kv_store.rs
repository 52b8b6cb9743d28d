//! TTL key-value store abstraction.
//!
//! Ephemeral security state (replay markers, authorization codes, device
//! codes) lives behind [`KeyValueStore`]. Every mutating primitive is atomic
//! with respect to other callers of the same backend, so a check-and-insert
//! never has a window between the existence check and the write.

use crate::PlatformError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

/// Byte-oriented key-value store with per-entry TTL.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value. Entries past their TTL are never returned.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PlatformError>;

    /// Unconditionally set a value with a TTL.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), PlatformError>;

    /// Insert only if no live entry exists. Returns `true` for the single
    /// caller that performed the insert.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, PlatformError>;

    /// Replace the value only if the live entry currently equals `expected`.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        new: &[u8],
        ttl: Duration,
    ) -> Result<bool, PlatformError>;

    /// Atomically read and remove a live entry.
    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, PlatformError>;

    /// Remove an entry. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, PlatformError>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process store backed by a single `RwLock<HashMap>`.
///
/// Only valid for single-instance deployments: two processes behind a load
/// balancer each hold their own map and cannot see each other's replay
/// markers. Use [`crate::RedisStore`] when running more than one instance.
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create an empty store and log the single-instance limitation.
    #[must_use]
    pub fn single_instance() -> Self {
        warn!("Using in-memory key-value store; multi-instance deployments require Redis");
        Self::new()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn expiry(ttl: Duration) -> Result<Instant, PlatformError> {
    if ttl.is_zero() {
        return Err(PlatformError::invalid_input("ttl must be positive"));
    }
    Instant::now()
        .checked_add(ttl)
        .ok_or_else(|| PlatformError::invalid_input("ttl out of range"))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PlatformError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Lazy eviction; re-check under the write lock in case of a concurrent set.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), PlatformError> {
        let expires_at = expiry(ttl)?;
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, PlatformError> {
        let expires_at = expiry(ttl)?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        new: &[u8],
        ttl: Duration,
    ) -> Result<bool, PlatformError> {
        let expires_at = expiry(ttl)?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) && entry.value == expected => {
                entry.value = new.to_vec();
                entry.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, PlatformError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value))
    }

    async fn delete(&self, key: &str) -> Result<bool, PlatformError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some_and(|entry| entry.is_live(now)))
    }
}
