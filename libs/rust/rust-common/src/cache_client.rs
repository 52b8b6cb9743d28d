//! Namespaced, time-bounded cache client.
//!
//! Wraps a [`KeyValueStore`] backend with namespace isolation and a per-call
//! timeout. Calls are never retried: retrying a check-and-insert could
//! reintroduce the race it exists to prevent.

use crate::{KeyValueStore, PlatformError, with_timeout};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Duration;

/// Cache client configuration.
#[derive(Debug, Clone)]
pub struct CacheClientConfig {
    /// Namespace for key isolation
    pub namespace: String,
    /// Upper bound for every backend call
    pub operation_timeout: Duration,
}

impl Default for CacheClientConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            operation_timeout: Duration::from_secs(2),
        }
    }
}

impl CacheClientConfig {
    /// Create config with custom namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Create config with custom operation timeout.
    #[must_use]
    pub const fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

/// Cache client over a shared backend.
#[derive(Clone)]
pub struct CacheClient {
    config: CacheClientConfig,
    backend: Arc<dyn KeyValueStore>,
}

impl CacheClient {
    /// Create a new cache client over the given backend.
    #[must_use]
    pub fn new(config: CacheClientConfig, backend: Arc<dyn KeyValueStore>) -> Self {
        Self { config, backend }
    }

    /// Derive a client sharing this backend under a nested namespace.
    #[must_use]
    pub fn scoped(&self, namespace: &str) -> Self {
        Self {
            config: self
                .config
                .clone()
                .with_namespace(format!("{}:{}", self.config.namespace, namespace)),
            backend: Arc::clone(&self.backend),
        }
    }

    /// Get a value from the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or times out.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PlatformError> {
        let key = self.namespaced_key(key);
        with_timeout(self.timeout(), "cache.get", self.backend.get(&key)).await
    }

    /// Set a value in the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or times out.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), PlatformError> {
        let key = self.namespaced_key(key);
        with_timeout(self.timeout(), "cache.set", self.backend.set(&key, value, ttl)).await
    }

    /// Atomically insert if absent. Returns `true` for the single winner.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or times out.
    pub async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, PlatformError> {
        let key = self.namespaced_key(key);
        with_timeout(
            self.timeout(),
            "cache.set_if_absent",
            self.backend.set_if_absent(&key, value, ttl),
        )
        .await
    }

    /// Atomically replace a value that currently equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or times out.
    pub async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        new: &[u8],
        ttl: Duration,
    ) -> Result<bool, PlatformError> {
        let key = self.namespaced_key(key);
        with_timeout(
            self.timeout(),
            "cache.compare_and_swap",
            self.backend.compare_and_swap(&key, expected, new, ttl),
        )
        .await
    }

    /// Atomically read and remove a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or times out.
    pub async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, PlatformError> {
        let key = self.namespaced_key(key);
        with_timeout(self.timeout(), "cache.take", self.backend.take(&key)).await
    }

    /// Delete a value from the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or times out.
    pub async fn delete(&self, key: &str) -> Result<bool, PlatformError> {
        let key = self.namespaced_key(key);
        with_timeout(self.timeout(), "cache.delete", self.backend.delete(&key)).await
    }

    /// Get and deserialize a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the stored bytes are not valid JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PlatformError> {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Serialize and store a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend fails.
    pub async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), PlatformError> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, &bytes, ttl).await
    }

    /// Atomically read, remove and deserialize a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the stored bytes are not valid JSON.
    pub async fn take_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PlatformError> {
        match self.take(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    const fn timeout(&self) -> Duration {
        self.config.operation_timeout
    }

    fn namespaced_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.namespace, key)
    }
}
