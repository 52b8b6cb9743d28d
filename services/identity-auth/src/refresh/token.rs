//! Refresh-token records, their lifecycle state and the lookup hash
//! stored in place of the raw token.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Storage key for a raw refresh token. The raw value is never persisted.
#[must_use]
pub fn hash_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

/// Position of a refresh token in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenState {
    /// Issued and not yet presented
    Issued,
    /// Exchanged for a successor
    Used,
    /// Terminal
    Revoked,
}

/// Persisted refresh token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshToken {
    /// Record id; equals the token's `jti`
    pub id: String,
    /// SHA-256 of the raw token
    pub token_hash: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Token subject
    pub user_id: String,
    /// Bound DPoP key thumbprint
    pub jkt: String,
    /// Signing key id
    pub kid: String,
    /// Token identifier
    pub jti: String,
    /// Rotation lineage
    pub family_id: String,
    /// Token this one replaced
    pub parent_id: Option<String>,
    /// Token that replaced this one
    pub replaced_by_id: Option<String>,
    /// Set exactly once, when rotated
    pub used_at: Option<DateTime<Utc>>,
    /// Expiry
    pub expires_at: DateTime<Utc>,
    /// Issuance time
    pub created_at: DateTime<Utc>,
    /// Revoked flag
    pub revoked: bool,
    /// Why it was revoked
    pub revoked_reason: Option<String>,
    /// Granted scope
    pub scope: Option<String>,
    /// Client
    pub client_id: Option<String>,
    /// Device
    pub device_id: Option<String>,
    /// Login session
    pub session_id: String,
}

impl RefreshToken {
    /// Current lifecycle state. Revocation wins over use.
    #[must_use]
    pub const fn state(&self) -> RefreshTokenState {
        if self.revoked {
            RefreshTokenState::Revoked
        } else if self.used_at.is_some() {
            RefreshTokenState::Used
        } else {
            RefreshTokenState::Issued
        }
    }

    /// Whether the token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Mark revoked unless already revoked. Returns whether anything changed.
    pub fn revoke(&mut self, reason: &str) -> bool {
        if self.revoked {
            return false;
        }
        self.revoked = true;
        self.revoked_reason = Some(reason.to_string());
        true
    }
}
