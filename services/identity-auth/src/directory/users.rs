//! User lookup.

use async_trait::async_trait;
use rust_common::PlatformError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A user tokens can be issued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier (`sub`)
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
}

impl User {
    /// Create a user.
    #[must_use]
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
        }
    }
}

/// User store.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by id.
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, PlatformError>;
}

/// In-memory user directory.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user.
    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, PlatformError> {
        Ok(self.users.read().await.get(user_id).cloned())
    }
}
