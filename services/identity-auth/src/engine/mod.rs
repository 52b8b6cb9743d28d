//! Grant-flow orchestration.
//!
//! The engine is the top of the dependency order: it composes the replay
//! ledger, key manager, token issuer, rotator and ephemeral stores, and
//! nothing below it refers back to it. Every token flow verifies the DPoP
//! proof before looking at flow-specific parameters.

mod grants;
mod sessions;
pub mod types;

pub use sessions::BACKCHANNEL_LOGOUT_EVENT;
pub use types::*;

use crate::config::Config;
use crate::directory::{ClientRegistry, SessionRegistry, UserDirectory};
use crate::dpop::{DpopError, DpopVerifier, VerifiedProof, VerifyOptions};
use crate::error::AuthResult;
use crate::keys::{KeyManager, KeyRepository};
use crate::refresh::{RefreshTokenRepository, RefreshTokenRotator};
use crate::replay::ReplayLedger;
use crate::store::{AuthorizationCodeStore, DeviceCodeStore, ParStore};
use crate::tokens::{TokenIssuer, TokenLifetimes};
use rust_common::{CacheClient, CacheClientConfig, KeyValueStore};
use std::sync::Arc;
use std::time::Duration;

/// External collaborators the engine is composed from.
#[derive(Clone)]
pub struct Collaborators {
    /// User lookup
    pub users: Arc<dyn UserDirectory>,
    /// Registered clients
    pub clients: Arc<dyn ClientRegistry>,
    /// Sessions and logout watermarks
    pub sessions: Arc<dyn SessionRegistry>,
    /// Durable signing keys
    pub keys: Arc<dyn KeyRepository>,
    /// Durable refresh tokens
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,
}

/// Authorization server core.
pub struct AuthorizationEngine {
    issuer_base_url: String,
    device_verification_uri: String,
    device_poll_interval: Duration,
    replay_ttl: Duration,
    store_timeout: Duration,
    verifier: DpopVerifier,
    ledger: ReplayLedger,
    keys: Arc<KeyManager>,
    issuer: Arc<TokenIssuer>,
    rotator: RefreshTokenRotator,
    codes: AuthorizationCodeStore,
    par: ParStore,
    devices: DeviceCodeStore,
    users: Arc<dyn UserDirectory>,
    clients: Arc<dyn ClientRegistry>,
    sessions: Arc<dyn SessionRegistry>,
}

impl AuthorizationEngine {
    /// Compose the engine. `store` backs the replay ledger and the
    /// ephemeral grant stores.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a duration is out of range.
    pub fn new(
        config: &Config,
        store: Arc<dyn KeyValueStore>,
        collaborators: Collaborators,
    ) -> AuthResult<Self> {
        let cache = CacheClient::new(
            CacheClientConfig::default()
                .with_namespace("identity-auth")
                .with_operation_timeout(config.store_timeout),
            store,
        );

        let keys = Arc::new(KeyManager::new(
            collaborators.keys,
            config.key_rotation_age,
            config.key_expiry_grace,
            config.store_timeout,
        )?);
        let issuer = Arc::new(TokenIssuer::new(
            Arc::clone(&keys),
            config.issuer_base_url.clone(),
            TokenLifetimes {
                access: config.access_token_ttl,
                refresh: config.refresh_token_ttl,
            },
        ));
        let verifier = DpopVerifier::new(config.dpop_max_skew);
        let ledger = ReplayLedger::new(cache.clone());
        let rotator = RefreshTokenRotator::new(
            collaborators.refresh_tokens,
            Arc::clone(&issuer),
            verifier.clone(),
            ledger.clone(),
            config.dpop_replay_ttl,
            config.store_timeout,
        );

        Ok(Self {
            issuer_base_url: config.issuer_base_url.clone(),
            device_verification_uri: config.device_verification_uri.clone(),
            device_poll_interval: config.device_poll_interval,
            replay_ttl: config.dpop_replay_ttl,
            store_timeout: config.store_timeout,
            verifier,
            ledger,
            keys,
            issuer,
            rotator,
            codes: AuthorizationCodeStore::new(cache.scoped("code"), config.auth_code_ttl),
            par: ParStore::new(cache.scoped("par"), config.par_ttl),
            devices: DeviceCodeStore::new(cache.scoped("device"), config.device_code_ttl),
            users: collaborators.users,
            clients: collaborators.clients,
            sessions: collaborators.sessions,
        })
    }

    /// Signing key manager, for scheduled rotation.
    #[must_use]
    pub const fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Token issuer, for resource-side verification.
    #[must_use]
    pub const fn issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    /// Public URL of `path`; the `htu` a DPoP proof must carry.
    #[must_use]
    pub fn request_url(&self, path: &str) -> String {
        format!("{}{}", self.issuer_base_url, path)
    }

    fn verify_dpop(&self, dpop: DpopContext<'_>) -> AuthResult<VerifiedProof> {
        let proof = dpop.proof.ok_or(DpopError::Missing)?;
        Ok(self
            .verifier
            .verify(proof, dpop.method, dpop.url, VerifyOptions::default())?)
    }
}
