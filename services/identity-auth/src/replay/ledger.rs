//! TTL-keyed uniqueness ledger.
//!
//! A registration is a single atomic check-and-insert on the shared store,
//! so concurrent requests presenting the same proof or code produce exactly
//! one winner. Failures are never retried.

use crate::error::AuthError;
use crate::metrics;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rust_common::CacheClient;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Kind of artifact being registered. Keys are namespaced per scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplayScope {
    /// DPoP proof, keyed by `(tenant_id, jkt, jti)`
    DpopProof,
    /// Authorization code
    AuthorizationCode,
    /// Pushed authorization request URI
    ParRequest,
    /// Device code
    DeviceCode,
}

impl ReplayScope {
    /// Stable label used in keys, logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DpopProof => "dpop_proof",
            Self::AuthorizationCode => "authorization_code",
            Self::ParRequest => "par_request",
            Self::DeviceCode => "device_code",
        }
    }

    const fn detail(self) -> &'static str {
        match self {
            Self::DpopProof => "DPoP proof replay detected",
            Self::AuthorizationCode => "Authorization code already used",
            Self::ParRequest => "request_uri already used",
            Self::DeviceCode => "Device code already used",
        }
    }
}

impl fmt::Display for ReplayScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniqueness ledger over a shared TTL store.
#[derive(Clone)]
pub struct ReplayLedger {
    cache: CacheClient,
}

impl ReplayLedger {
    /// Create a ledger writing under the given cache namespace.
    #[must_use]
    pub const fn new(cache: CacheClient) -> Self {
        Self { cache }
    }

    /// Register `key` in `scope` for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `ReplayDetected` if a live registration already exists, or a
    /// platform error if the store fails or times out.
    pub async fn register(
        &self,
        scope: ReplayScope,
        key: &str,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        let storage_key = Self::storage_key(scope, key);
        let inserted = self.cache.set_if_absent(&storage_key, b"1", ttl).await?;
        if inserted {
            return Ok(());
        }

        warn!(scope = %scope, "Replay detected");
        metrics::record_replay_rejected(scope.as_str());
        metrics::record_security_event("REPLAY_DETECTED");
        Err(AuthError::ReplayDetected {
            scope: scope.as_str(),
            detail: scope.detail(),
        })
    }

    /// Register a DPoP proof's `(tenant_id, jkt, jti)` triple.
    ///
    /// # Errors
    ///
    /// Same as [`ReplayLedger::register`].
    pub async fn register_dpop_proof(
        &self,
        tenant_id: &str,
        jkt: &str,
        jti: &str,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        let key = Self::dpop_key(tenant_id, jkt, jti);
        self.register(ReplayScope::DpopProof, &key, ttl).await
    }

    /// Length-prefixed so no component can smuggle a separator.
    fn dpop_key(tenant_id: &str, jkt: &str, jti: &str) -> String {
        format!(
            "{}:{tenant_id}|{}:{jkt}|{}:{jti}",
            tenant_id.len(),
            jkt.len(),
            jti.len()
        )
    }

    /// Raw artifacts (codes, jtis) are hashed before they reach the store.
    fn storage_key(scope: ReplayScope, key: &str) -> String {
        let digest = URL_SAFE_NO_PAD.encode(Sha256::digest(key.as_bytes()));
        format!("replay:{}:{digest}", scope.as_str())
    }
}
