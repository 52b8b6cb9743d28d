//! JWKS document assembly.

use crate::error::AuthError;
use crate::keys::{KeyStatus, SigningKey};
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};

/// Public signing key as published in a JWKS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type
    pub kty: String,
    /// Key identifier
    pub kid: String,
    /// Intended use
    #[serde(rename = "use")]
    pub key_use: String,
    /// Algorithm
    pub alg: String,
    /// Curve
    pub crv: String,
    /// Affine x coordinate
    pub x: String,
    /// Affine y coordinate
    pub y: String,
}

impl Jwk {
    /// JWK for a P-256 ES256 signing key.
    #[must_use]
    pub fn ec_signing_key(kid: &str, x: &str, y: &str) -> Self {
        Self {
            kty: "EC".to_string(),
            kid: kid.to_string(),
            key_use: "sig".to_string(),
            alg: "ES256".to_string(),
            crv: "P-256".to_string(),
            x: x.to_string(),
            y: y.to_string(),
        }
    }

    /// Verification key for tokens signed with this JWK.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the coordinates are not valid base64url.
    pub fn decoding_key(&self) -> Result<DecodingKey, AuthError> {
        Ok(DecodingKey::from_ec_components(&self.x, &self.y)?)
    }
}

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    /// Published keys
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Find a key by `kid`.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid == kid)
    }
}

/// Builds JWKS documents from stored signing keys.
pub struct JwksPublisher;

impl JwksPublisher {
    /// Cache-Control value for JWKS responses.
    pub const CACHE_CONTROL: &'static str = "public, max-age=300";

    /// Publish ACTIVE and ROLLED_OVER keys; EXPIRED keys are left out.
    /// The active key is listed first.
    #[must_use]
    pub fn publish<'a>(keys: impl IntoIterator<Item = &'a SigningKey>) -> Jwks {
        let mut published: Vec<&SigningKey> = keys
            .into_iter()
            .filter(|key| key.status.is_published())
            .collect();
        published.sort_by(|a, b| {
            (b.status == KeyStatus::Active)
                .cmp(&(a.status == KeyStatus::Active))
                .then(b.created_at.cmp(&a.created_at))
        });

        Jwks {
            keys: published.into_iter().map(SigningKey::to_jwk).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn key(status: KeyStatus) -> SigningKey {
        SigningKey::generate("tenant-1", Utc::now(), chrono::Duration::days(90))
            .unwrap()
            .with_status(status, Utc::now())
    }

    #[test]
    fn test_publish_excludes_expired() {
        let active = key(KeyStatus::Active);
        let rolled = key(KeyStatus::RolledOver);
        let expired = key(KeyStatus::Expired);

        let jwks = JwksPublisher::publish([&rolled, &expired, &active]);

        assert_eq!(jwks.keys.len(), 2);
        assert_eq!(jwks.keys[0].kid, active.kid);
        assert!(jwks.find(&rolled.kid).is_some());
        assert!(jwks.find(&expired.kid).is_none());
    }

    #[test]
    fn test_jwks_serialization() {
        let active = key(KeyStatus::Active);
        let json = serde_json::to_value(JwksPublisher::publish([&active])).unwrap();

        let published = &json["keys"][0];
        assert_eq!(published["kty"], "EC");
        assert_eq!(published["crv"], "P-256");
        assert_eq!(published["use"], "sig");
        assert_eq!(published["kid"], active.kid.as_str());
    }

    #[test]
    fn test_decoding_key_from_published_jwk() {
        let active = key(KeyStatus::Active);
        assert!(active.to_jwk().decoding_key().is_ok());
    }
}
