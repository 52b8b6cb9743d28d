//! Authorization codes awaiting exchange.

use crate::error::AuthError;
use crate::store::pkce::PkceMethod;
use crate::store::random_hex;
use rust_common::CacheClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a code was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// PKCE challenge
    pub code_challenge: String,
    /// PKCE method
    pub code_challenge_method: PkceMethod,
    /// Approving user
    pub user_id: String,
    /// Granted scope
    pub scope: String,
    /// Redirect the code was delivered to
    pub redirect_uri: Option<String>,
    /// Requesting client
    pub client_id: Option<String>,
}

/// Authorization code store.
#[derive(Clone)]
pub struct AuthorizationCodeStore {
    cache: CacheClient,
    ttl: Duration,
}

impl AuthorizationCodeStore {
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

    /// Store a grant under a fresh random code.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the store fails.
    pub async fn issue(&self, grant: &AuthorizationCode) -> Result<String, AuthError> {
        let code = random_hex(32);
        self.cache.set_json(&code, grant, self.ttl).await?;
        Ok(code)
    }

    /// Atomically remove and return the grant for `code`.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the store fails.
    pub async fn take(&self, code: &str) -> Result<Option<AuthorizationCode>, AuthError> {
        Ok(self.cache.take_json(code).await?)
    }
}
