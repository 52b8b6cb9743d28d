//! Mints DPoP-bound access and refresh tokens signed with the tenant's
//! ACTIVE key.
//!
//! Issuing a refresh token returns its record but does not persist it; the
//! rotator decides whether the record is saved on its own or committed
//! together with a rotation.

use crate::directory::User;
use crate::error::AuthError;
use crate::jwt::{AccessClaims, Confirmation, JwtSerializer, RefreshClaims};
use crate::keys::KeyManager;
use crate::refresh::{hash_token, RefreshToken};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Token lifetimes.
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    /// Access token TTL
    pub access: Duration,
    /// Refresh token TTL
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::from_secs(900),
            refresh: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

/// Attributes a refresh token inherits from its family. Missing family and
/// session identifiers start a new lineage.
#[derive(Debug, Clone, Default)]
pub struct RefreshLineage {
    /// Existing family
    pub family_id: Option<String>,
    /// Token this one replaces
    pub parent_id: Option<String>,
    /// Client the family belongs to
    pub client_id: Option<String>,
    /// Device the family belongs to
    pub device_id: Option<String>,
    /// Granted scope
    pub scope: Option<String>,
    /// Login session
    pub session_id: Option<String>,
}

impl RefreshLineage {
    /// Lineage continuing `token`'s family, with `token` as parent.
    #[must_use]
    pub fn continuing(token: &RefreshToken) -> Self {
        Self {
            family_id: Some(token.family_id.clone()),
            parent_id: Some(token.id.clone()),
            client_id: token.client_id.clone(),
            device_id: token.device_id.clone(),
            scope: token.scope.clone(),
            session_id: Some(token.session_id.clone()),
        }
    }
}

/// Token issuer.
pub struct TokenIssuer {
    keys: Arc<KeyManager>,
    serializer: JwtSerializer,
    issuer_base_url: String,
    lifetimes: TokenLifetimes,
}

impl TokenIssuer {
    /// Create an issuer. Tenant issuers are `{issuer_base_url}/t/{tenant_id}`.
    #[must_use]
    pub fn new(keys: Arc<KeyManager>, issuer_base_url: impl Into<String>, lifetimes: TokenLifetimes) -> Self {
        Self {
            keys,
            serializer: JwtSerializer::default(),
            issuer_base_url: issuer_base_url.into(),
            lifetimes,
        }
    }

    /// Issuer URL for a tenant.
    #[must_use]
    pub fn issuer_for(&self, tenant_id: &str) -> String {
        format!("{}/t/{}", self.issuer_base_url, tenant_id)
    }

    /// Access token lifetime.
    #[must_use]
    pub const fn access_ttl(&self) -> Duration {
        self.lifetimes.access
    }

    /// Mint an access token bound to `jkt`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing key cannot be loaded or signing fails.
    pub async fn issue_access_token(
        &self,
        user: &User,
        jkt: &str,
        scope: &str,
        client_id: Option<&str>,
    ) -> Result<String, AuthError> {
        let key = self.keys.get_active_signing_key(&user.tenant_id).await?;
        let now = Utc::now().timestamp();
        let iss = self.issuer_for(&user.tenant_id);

        let claims = AccessClaims {
            aud: iss.clone(),
            iss,
            sub: user.id.clone(),
            tenant_id: user.tenant_id.clone(),
            scope: scope.to_string(),
            cnf: Confirmation {
                jkt: jkt.to_string(),
            },
            jti: Uuid::new_v4().to_string(),
            iat: now,
            nbf: now,
            exp: now + ttl_secs(self.lifetimes.access),
            client_id: client_id.map(str::to_string),
        };

        let token = self.serializer.serialize(&claims, &key.encoding_key(), &key.kid)?;
        debug!(tenant_id = %user.tenant_id, kid = %key.kid, jti = %claims.jti, "Issued access token");
        Ok(token)
    }

    /// Mint a refresh token bound to `jkt` and build its record.
    ///
    /// The raw token is returned to the caller; the record holds only its
    /// SHA-256 hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing key cannot be loaded or signing fails.
    pub async fn issue_refresh_token(
        &self,
        user: &User,
        jkt: &str,
        lineage: RefreshLineage,
    ) -> Result<(String, RefreshToken), AuthError> {
        let now = Utc::now();
        let key = self.keys.get_active_signing_key(&user.tenant_id).await?;
        let lifetime = chrono::Duration::from_std(self.lifetimes.refresh)
            .map_err(|e| AuthError::internal(format!("Invalid refresh lifetime: {e}")))?;
        let expires_at = now + lifetime;
        let jti = Uuid::new_v4().to_string();

        let claims = RefreshClaims {
            iss: self.issuer_for(&user.tenant_id),
            sub: user.id.clone(),
            tenant_id: user.tenant_id.clone(),
            token_use: "refresh".to_string(),
            cnf: Confirmation {
                jkt: jkt.to_string(),
            },
            jti: jti.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let raw = self.serializer.serialize(&claims, &key.encoding_key(), &key.kid)?;

        let record = RefreshToken {
            id: jti.clone(),
            token_hash: hash_token(&raw),
            tenant_id: user.tenant_id.clone(),
            user_id: user.id.clone(),
            jkt: jkt.to_string(),
            kid: key.kid,
            jti,
            family_id: lineage
                .family_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            parent_id: lineage.parent_id,
            replaced_by_id: None,
            used_at: None,
            expires_at,
            created_at: now,
            revoked: false,
            revoked_reason: None,
            scope: lineage.scope,
            client_id: lineage.client_id,
            device_id: lineage.device_id,
            session_id: lineage
                .session_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        };
        Ok((raw, record))
    }

    /// Verify an access token against the signing key named by its `kid`.
    ///
    /// EXPIRED keys still verify tokens they signed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the key is unknown or the token is invalid.
    pub async fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let kid = JwtSerializer::header_kid(token)?;
        let key = self
            .keys
            .find_by_kid(&kid)
            .await?
            .ok_or_else(|| AuthError::InvalidToken("Unknown signing key".to_string()))?;
        let issuer = self.issuer_for(&key.tenant_id);
        self.serializer
            .deserialize(token, &key.decoding_key()?, Some(&issuer))
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}
