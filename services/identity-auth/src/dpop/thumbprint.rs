//! JWK thumbprint calculation per RFC 7638.
//!
//! Used for DPoP token binding (`cnf.jkt`) and for deterministic signing-key
//! identifiers.

use crate::dpop::proof::{DpopError, Jwk};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Calculates the JWK thumbprint per RFC 7638.
pub struct JwkThumbprint;

impl JwkThumbprint {
    /// Computes the base64url SHA-256 thumbprint of a JWK.
    ///
    /// # Errors
    ///
    /// Returns `InvalidProof` if the key type is unsupported or a required
    /// member is missing.
    pub fn compute(jwk: &Jwk) -> Result<String, DpopError> {
        let canonical = Self::canonical_json(jwk)?;
        Ok(Self::digest(&canonical))
    }

    /// Thumbprint of an EC public key given its coordinates.
    #[must_use]
    pub fn for_ec(crv: &str, x: &str, y: &str) -> String {
        Self::digest(&Self::ec_members(crv, x, y))
    }

    /// Verifies that a thumbprint matches a JWK using constant-time comparison.
    #[must_use]
    pub fn verify(jwk: &Jwk, expected_thumbprint: &str) -> bool {
        Self::compute(jwk).is_ok_and(|computed| Self::matches(&computed, expected_thumbprint))
    }

    /// Constant-time equality of two thumbprints.
    #[must_use]
    pub fn matches(a: &str, b: &str) -> bool {
        a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
    }

    /// Required members only, lexicographic order, no whitespace.
    fn canonical_json(jwk: &Jwk) -> Result<String, DpopError> {
        let member = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| DpopError::invalid(format!("jwk missing {name}")))
        };

        match jwk.kty.as_str() {
            "EC" => Ok(Self::ec_members(
                &member(&jwk.crv, "crv")?,
                &member(&jwk.x, "x")?,
                &member(&jwk.y, "y")?,
            )),
            "RSA" => {
                // serde_json::Map is ordered by key, matching RFC 7638.
                let value = json!({
                    "e": member(&jwk.e, "e")?,
                    "kty": "RSA",
                    "n": member(&jwk.n, "n")?,
                });
                Ok(value.to_string())
            }
            other => Err(DpopError::invalid(format!("unsupported kty {other}"))),
        }
    }

    fn ec_members(crv: &str, x: &str, y: &str) -> String {
        json!({ "crv": crv, "kty": "EC", "x": x, "y": y }).to_string()
    }

    fn digest(canonical: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
    }
}
