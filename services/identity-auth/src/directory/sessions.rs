//! Login sessions and per-user logout watermarks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_common::PlatformError;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Session state consulted by introspection, refresh and logout.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Record a session for a user.
    async fn register(&self, sid: &str, user_id: &str, tenant_id: &str) -> Result<(), PlatformError>;

    /// Revoke a session. Tokens issued to its user before now stop being
    /// honoured. Returns whether the session was known.
    async fn revoke_session(&self, sid: &str) -> Result<bool, PlatformError>;

    /// Tokens for this user issued before the returned instant are inactive.
    async fn not_before(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<Option<DateTime<Utc>>, PlatformError>;
}

#[derive(Default)]
struct SessionState {
    sessions: HashMap<String, (String, String)>,
    not_before: HashMap<(String, String), DateTime<Utc>>,
}

/// In-memory session registry.
#[derive(Default)]
pub struct InMemorySessionRegistry {
    state: RwLock<SessionState>,
}

impl InMemorySessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn register(&self, sid: &str, user_id: &str, tenant_id: &str) -> Result<(), PlatformError> {
        self.state
            .write()
            .await
            .sessions
            .insert(sid.to_string(), (user_id.to_string(), tenant_id.to_string()));
        Ok(())
    }

    async fn revoke_session(&self, sid: &str) -> Result<bool, PlatformError> {
        let mut state = self.state.write().await;
        let Some(owner) = state.sessions.remove(sid) else {
            return Ok(false);
        };
        state.not_before.insert(owner, Utc::now());
        Ok(true)
    }

    async fn not_before(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<Option<DateTime<Utc>>, PlatformError> {
        let key = (user_id.to_string(), tenant_id.to_string());
        Ok(self.state.read().await.not_before.get(&key).copied())
    }
}
