//! Registered OAuth clients.

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use rust_common::PlatformError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

/// A registered relying party.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    /// Client identifier
    pub client_id: String,
    /// SHA-256 of the client secret
    pub secret_sha256: [u8; 32],
    /// Keys the client signs logout tokens with
    pub jwks: JwkSet,
}

impl RegisteredClient {
    /// Register a client with a plaintext secret; only its digest is kept.
    #[must_use]
    pub fn new(client_id: impl Into<String>, secret: &str, jwks: JwkSet) -> Self {
        Self {
            client_id: client_id.into(),
            secret_sha256: Sha256::digest(secret.as_bytes()).into(),
            jwks,
        }
    }

    /// Constant-time secret check.
    #[must_use]
    pub fn verify_secret(&self, secret: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        presented.ct_eq(&self.secret_sha256).into()
    }
}

/// Client store.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Find a client by id.
    async fn find_client(&self, client_id: &str) -> Result<Option<RegisteredClient>, PlatformError>;
}

/// In-memory client registry.
#[derive(Default)]
pub struct InMemoryClientRegistry {
    clients: RwLock<HashMap<String, RegisteredClient>>,
}

impl InMemoryClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a client.
    pub async fn insert(&self, client: RegisteredClient) {
        self.clients
            .write()
            .await
            .insert(client.client_id.clone(), client);
    }
}

#[async_trait]
impl ClientRegistry for InMemoryClientRegistry {
    async fn find_client(&self, client_id: &str) -> Result<Option<RegisteredClient>, PlatformError> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }
}
