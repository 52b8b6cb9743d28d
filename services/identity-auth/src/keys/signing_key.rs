//! ES256 signing key with its lifecycle status.

use crate::dpop::JwkThumbprint;
use crate::error::AuthError;
use crate::jwks::Jwk;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Signing algorithm used for every tenant key.
pub const SIGNING_ALGORITHM: &str = "ES256";

/// Key lifecycle: `Active` -> `RolledOver` -> `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyStatus {
    /// Signs new tokens; at most one per tenant
    Active,
    /// Still published so earlier tokens verify
    RolledOver,
    /// Withdrawn from discovery, kept for lookup by kid
    Expired,
}

impl KeyStatus {
    /// Whether keys in this status appear in the JWKS.
    #[must_use]
    pub const fn is_published(self) -> bool {
        matches!(self, Self::Active | Self::RolledOver)
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::RolledOver => "ROLLED_OVER",
            Self::Expired => "EXPIRED",
        }
    }
}

/// A tenant's P-256 signing key.
#[derive(Clone)]
pub struct SigningKey {
    /// Owning tenant
    pub tenant_id: String,
    /// RFC 7638 thumbprint of the public key
    pub kid: String,
    /// JWS algorithm
    pub algorithm: &'static str,
    /// Base64url affine x coordinate
    pub x: String,
    /// Base64url affine y coordinate
    pub y: String,
    /// Lifecycle status
    pub status: KeyStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub status_changed_at: DateTime<Utc>,
    /// Planned end of the active period
    pub expires_at: DateTime<Utc>,
    pkcs8: Zeroizing<Vec<u8>>,
}

impl SigningKey {
    /// Generate a fresh ACTIVE key for a tenant.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the system RNG or key encoding fails.
    pub fn generate(
        tenant_id: &str,
        now: DateTime<Utc>,
        lifetime: chrono::Duration,
    ) -> Result<Self, AuthError> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .map_err(|_| AuthError::internal("EC key generation failed"))?;
        Self::from_pkcs8(tenant_id, pkcs8.as_ref(), now, lifetime)
    }

    /// Load a key from PKCS#8 DER.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the DER is not a P-256 private key.
    pub fn from_pkcs8(
        tenant_id: &str,
        pkcs8: &[u8],
        now: DateTime<Utc>,
        lifetime: chrono::Duration,
    ) -> Result<Self, AuthError> {
        let rng = SystemRandom::new();
        let pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
            .map_err(|_| AuthError::internal("Invalid P-256 PKCS#8 key"))?;

        // Uncompressed SEC1 point: 0x04 || x || y
        let point = pair.public_key().as_ref();
        if point.len() != 65 {
            return Err(AuthError::internal("Unexpected P-256 public key length"));
        }
        let x = URL_SAFE_NO_PAD.encode(&point[1..33]);
        let y = URL_SAFE_NO_PAD.encode(&point[33..65]);
        let kid = JwkThumbprint::for_ec("P-256", &x, &y);

        Ok(Self {
            tenant_id: tenant_id.to_string(),
            kid,
            algorithm: SIGNING_ALGORITHM,
            x,
            y,
            status: KeyStatus::Active,
            created_at: now,
            status_changed_at: now,
            expires_at: now + lifetime,
            pkcs8: Zeroizing::new(pkcs8.to_vec()),
        })
    }

    /// Key for signing JWTs.
    #[must_use]
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_ec_der(&self.pkcs8)
    }

    /// Key for verifying JWTs signed by this key.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the stored coordinates are invalid.
    pub fn decoding_key(&self) -> Result<DecodingKey, AuthError> {
        Ok(DecodingKey::from_ec_components(&self.x, &self.y)?)
    }

    /// Public JWK. Never includes private material.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        Jwk::ec_signing_key(&self.kid, &self.x, &self.y)
    }

    /// Copy with a new status.
    #[must_use]
    pub fn with_status(mut self, status: KeyStatus, at: DateTime<Utc>) -> Self {
        self.status = status;
        self.status_changed_at = at;
        self
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("tenant_id", &self.tenant_id)
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("pkcs8", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SigningKey {
        SigningKey::generate("tenant-1", Utc::now(), chrono::Duration::days(90)).unwrap()
    }

    #[test]
    fn test_generated_key_shape() {
        let key = key();
        assert_eq!(key.status, KeyStatus::Active);
        assert_eq!(key.algorithm, "ES256");
        assert_eq!(key.x.len(), 43);
        assert_eq!(key.y.len(), 43);
        assert_eq!(key.expires_at - key.created_at, chrono::Duration::days(90));
    }

    #[test]
    fn test_kid_is_derived_from_public_key() {
        let key = key();
        assert_eq!(key.kid, JwkThumbprint::for_ec("P-256", &key.x, &key.y));

        let other = SigningKey::generate("tenant-1", Utc::now(), chrono::Duration::days(90)).unwrap();
        assert_ne!(key.kid, other.kid);
    }

    #[test]
    fn test_reloading_same_material_yields_same_kid() {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng).unwrap();
        let now = Utc::now();
        let a = SigningKey::from_pkcs8("t", pkcs8.as_ref(), now, chrono::Duration::days(1)).unwrap();
        let b = SigningKey::from_pkcs8("t", pkcs8.as_ref(), now, chrono::Duration::days(1)).unwrap();
        assert_eq!(a.kid, b.kid);
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let rendered = format!("{:?}", key());
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_jwk_has_no_private_member() {
        let json = serde_json::to_value(key().to_jwk()).unwrap();
        assert_eq!(json["alg"], "ES256");
        assert_eq!(json["use"], "sig");
        assert!(json.get("d").is_none());
    }

    #[test]
    fn test_published_statuses() {
        assert!(KeyStatus::Active.is_published());
        assert!(KeyStatus::RolledOver.is_published());
        assert!(!KeyStatus::Expired.is_published());
    }
}
