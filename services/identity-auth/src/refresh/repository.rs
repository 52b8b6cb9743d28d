//! Refresh-token persistence.

use crate::refresh::token::RefreshToken;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_common::PlatformError;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Refresh-token storage. Every method is atomic.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    /// Look up a record by token hash.
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, PlatformError>;

    /// Insert a new record. Fails with `Conflict` if the hash exists.
    async fn save(&self, token: RefreshToken) -> Result<(), PlatformError>;

    /// Revoke every unrevoked token in a family. Returns how many changed.
    async fn update_by_family(&self, family_id: &str, reason: &str) -> Result<usize, PlatformError>;

    /// In one transaction: set `used_at` and `replaced_by_id` on the old
    /// token and insert its successor with `parent_id` set.
    ///
    /// Fails with `Conflict` if the old token was already used or revoked,
    /// in which case nothing is written.
    async fn commit_rotation(
        &self,
        old_id: &str,
        used_at: DateTime<Utc>,
        successor: RefreshToken,
    ) -> Result<(), PlatformError>;

    /// Remove a record. Returns whether it existed.
    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, PlatformError>;

    /// Revoke every unrevoked token of a login session.
    async fn revoke_by_session(&self, session_id: &str, reason: &str) -> Result<usize, PlatformError>;
}

#[derive(Default)]
struct Tokens {
    by_id: HashMap<String, RefreshToken>,
    id_by_hash: HashMap<String, String>,
}

impl Tokens {
    fn revoke_where(&mut self, reason: &str, matches: impl Fn(&RefreshToken) -> bool) -> usize {
        self.by_id
            .values_mut()
            .filter(|t| matches(t))
            .map(|t| t.revoke(reason))
            .filter(|changed| *changed)
            .count()
    }
}

/// In-memory refresh-token repository behind a single lock.
#[derive(Default)]
pub struct InMemoryRefreshTokenRepository {
    tokens: RwLock<Tokens>,
}

impl InMemoryRefreshTokenRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.tokens.read().await.by_id.len()
    }

    /// All records of a family.
    pub async fn family(&self, family_id: &str) -> Vec<RefreshToken> {
        self.tokens
            .read()
            .await
            .by_id
            .values()
            .filter(|t| t.family_id == family_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RefreshTokenRepository for InMemoryRefreshTokenRepository {
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, PlatformError> {
        let tokens = self.tokens.read().await;
        Ok(tokens
            .id_by_hash
            .get(token_hash)
            .and_then(|id| tokens.by_id.get(id))
            .cloned())
    }

    async fn save(&self, token: RefreshToken) -> Result<(), PlatformError> {
        let mut tokens = self.tokens.write().await;
        if tokens.id_by_hash.contains_key(&token.token_hash) || tokens.by_id.contains_key(&token.id) {
            return Err(PlatformError::conflict("refresh token already stored"));
        }
        tokens.id_by_hash.insert(token.token_hash.clone(), token.id.clone());
        tokens.by_id.insert(token.id.clone(), token);
        Ok(())
    }

    async fn update_by_family(&self, family_id: &str, reason: &str) -> Result<usize, PlatformError> {
        Ok(self
            .tokens
            .write()
            .await
            .revoke_where(reason, |t| t.family_id == family_id))
    }

    async fn commit_rotation(
        &self,
        old_id: &str,
        used_at: DateTime<Utc>,
        mut successor: RefreshToken,
    ) -> Result<(), PlatformError> {
        let mut tokens = self.tokens.write().await;
        if tokens.id_by_hash.contains_key(&successor.token_hash) {
            return Err(PlatformError::conflict("successor already stored"));
        }
        let old = tokens
            .by_id
            .get_mut(old_id)
            .ok_or_else(|| PlatformError::NotFound(format!("refresh token {old_id}")))?;
        if old.used_at.is_some() || old.revoked {
            return Err(PlatformError::conflict("refresh token already used"));
        }

        old.used_at = Some(used_at);
        old.replaced_by_id = Some(successor.id.clone());
        successor.parent_id = Some(old_id.to_string());

        tokens
            .id_by_hash
            .insert(successor.token_hash.clone(), successor.id.clone());
        tokens.by_id.insert(successor.id.clone(), successor);
        Ok(())
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, PlatformError> {
        let mut tokens = self.tokens.write().await;
        let Some(id) = tokens.id_by_hash.remove(token_hash) else {
            return Ok(false);
        };
        tokens.by_id.remove(&id);
        Ok(true)
    }

    async fn revoke_by_session(&self, session_id: &str, reason: &str) -> Result<usize, PlatformError> {
        Ok(self
            .tokens
            .write()
            .await
            .revoke_where(reason, |t| t.session_id == session_id))
    }
}
