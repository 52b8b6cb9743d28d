//! Pushed authorization requests (RFC 9126).

use crate::error::AuthError;
use crate::store::pkce::PkceMethod;
use crate::store::random_hex;
use rust_common::CacheClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefix of every issued `request_uri`.
pub const REQUEST_URI_PREFIX: &str = "urn:ietf:params:oauth:request_uri:";

/// Authorization parameters pushed ahead of `/authorize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParRequest {
    /// PKCE challenge
    pub code_challenge: String,
    /// PKCE method
    pub code_challenge_method: PkceMethod,
    /// Redirect URI
    pub redirect_uri: Option<String>,
    /// Requested scope
    pub scope: Option<String>,
    /// Requesting client
    pub client_id: Option<String>,
    /// Opaque client state
    pub state: Option<String>,
}

/// PAR payload store.
#[derive(Clone)]
pub struct ParStore {
    cache: CacheClient,
    ttl: Duration,
}

impl ParStore {
    /// Create a store whose payloads live for `ttl`.
    #[must_use]
    pub const fn new(cache: CacheClient, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Payload lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a payload and return its `request_uri`.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the store fails.
    pub async fn push(&self, request: &ParRequest) -> Result<String, AuthError> {
        let request_uri = format!("{REQUEST_URI_PREFIX}{}", random_hex(32));
        self.cache.set_json(&request_uri, request, self.ttl).await?;
        Ok(request_uri)
    }

    /// Atomically remove and return the payload for `request_uri`.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the store fails.
    pub async fn take(&self, request_uri: &str) -> Result<Option<ParRequest>, AuthError> {
        Ok(self.cache.take_json(request_uri).await?)
    }
}
