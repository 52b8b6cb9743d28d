//! DPoP proof verifier per RFC 9449.
//!
//! Verification is pure: it never records the proof's `jti`. Callers that
//! need anti-replay register the returned `(jkt, jti)` with the replay
//! ledger themselves.

use crate::dpop::proof::{DpopError, DpopProof, Jwk};
use crate::dpop::thumbprint::JwkThumbprint;
use crate::metrics;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{Algorithm, DecodingKey};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

/// Binding requirements for a single verification.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions<'a> {
    /// Thumbprint the proof key must match
    pub bound_jkt: Option<&'a str>,
    /// Fail unless `bound_jkt` is present and matches
    pub require_binding: bool,
    /// Access token the proof's `ath` must hash
    pub access_token: Option<&'a str>,
}

impl<'a> VerifyOptions<'a> {
    /// Require the proof key to match `jkt`.
    #[must_use]
    pub const fn bound_to(jkt: &'a str) -> Self {
        Self {
            bound_jkt: Some(jkt),
            require_binding: true,
            access_token: None,
        }
    }
}

/// Claims of a proof that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedProof {
    /// RFC 7638 thumbprint of the proof key
    pub jkt: String,
    /// Verified HTTP method
    pub htm: String,
    /// Verified HTTP URI
    pub htu: String,
    /// Issued-at
    pub iat: i64,
    /// Proof identifier
    pub jti: String,
    /// Access token hash, if present
    pub ath: Option<String>,
}

/// Stateless DPoP proof verifier.
#[derive(Debug, Clone)]
pub struct DpopVerifier {
    max_skew: Duration,
}

impl DpopVerifier {
    /// Create a verifier accepting proofs within `max_skew` of server time.
    #[must_use]
    pub const fn new(max_skew: Duration) -> Self {
        Self { max_skew }
    }

    /// Maximum accepted clock skew.
    #[must_use]
    pub const fn max_skew(&self) -> Duration {
        self.max_skew
    }

    /// Verify a proof against the current time.
    ///
    /// # Errors
    ///
    /// Returns a [`DpopError`] naming the first check that failed.
    pub fn verify(
        &self,
        proof: &str,
        method: &str,
        url: &str,
        options: VerifyOptions<'_>,
    ) -> Result<VerifiedProof, DpopError> {
        self.verify_at(proof, method, url, options, chrono::Utc::now().timestamp())
    }

    /// Verify a proof against an explicit `now`.
    ///
    /// # Errors
    ///
    /// Returns a [`DpopError`] naming the first check that failed.
    pub fn verify_at(
        &self,
        proof: &str,
        method: &str,
        url: &str,
        options: VerifyOptions<'_>,
        now: i64,
    ) -> Result<VerifiedProof, DpopError> {
        let result = self.check(proof, method, url, options, now);
        match &result {
            Ok(_) => metrics::record_dpop_validation("success", "none"),
            Err(e) => {
                debug!(error_type = e.kind(), error = ?e, "DPoP proof rejected");
                metrics::record_dpop_validation("failure", e.kind());
            }
        }
        result
    }

    fn check(
        &self,
        proof: &str,
        method: &str,
        url: &str,
        options: VerifyOptions<'_>,
        now: i64,
    ) -> Result<VerifiedProof, DpopError> {
        if proof.is_empty() {
            return Err(DpopError::Missing);
        }

        let parsed = DpopProof::parse(proof)?;
        Self::verify_signature(&parsed)?;
        let claims = parsed.claims()?;

        if claims.htm != method {
            return Err(DpopError::HtmMismatch {
                expected: method.to_string(),
                actual: claims.htm,
            });
        }

        let expected_htu = strip_query(url);
        if strip_query(&claims.htu) != expected_htu {
            return Err(DpopError::HtuMismatch {
                expected: expected_htu.to_string(),
                actual: claims.htu,
            });
        }

        if now.abs_diff(claims.iat) > self.max_skew.as_secs() {
            return Err(DpopError::ProofExpired {
                iat: claims.iat,
                now,
            });
        }

        let jkt = JwkThumbprint::compute(&parsed.jwk)?;

        if options.require_binding {
            let bound = options.bound_jkt.ok_or(DpopError::BindingMissing)?;
            if !JwkThumbprint::matches(&jkt, bound) {
                return Err(DpopError::BindingMismatch);
            }
        }

        if let Some(ath) = &claims.ath {
            let token = options.access_token.ok_or(DpopError::AthMismatch)?;
            if !JwkThumbprint::matches(ath, &access_token_hash(token)) {
                return Err(DpopError::AthMismatch);
            }
        }

        Ok(VerifiedProof {
            jkt,
            htm: claims.htm,
            htu: claims.htu,
            iat: claims.iat,
            jti: claims.jti,
            ath: claims.ath,
        })
    }

    /// The proof is self-signed: the embedded key must verify the JWS.
    fn verify_signature(proof: &DpopProof<'_>) -> Result<(), DpopError> {
        let (algorithm, key) = decoding_key(&proof.header.alg, &proof.jwk)?;
        let valid = jsonwebtoken::crypto::verify(
            proof.signature(),
            proof.signing_input().as_bytes(),
            &key,
            algorithm,
        )
        .map_err(|e| DpopError::invalid(format!("signature check failed: {e}")))?;

        if valid {
            Ok(())
        } else {
            Err(DpopError::invalid("signature mismatch"))
        }
    }
}

/// Asymmetric algorithms accepted for proofs, paired with the key type they need.
fn decoding_key(alg: &str, jwk: &Jwk) -> Result<(Algorithm, DecodingKey), DpopError> {
    let missing = |name: &str| DpopError::invalid(format!("jwk missing {name}"));
    match (alg, jwk.kty.as_str()) {
        ("ES256", "EC") => {
            if jwk.crv.as_deref() != Some("P-256") {
                return Err(DpopError::invalid("ES256 requires a P-256 key"));
            }
            let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
            let y = jwk.y.as_deref().ok_or_else(|| missing("y"))?;
            let key = DecodingKey::from_ec_components(x, y)
                .map_err(|e| DpopError::invalid(format!("bad EC key: {e}")))?;
            Ok((Algorithm::ES256, key))
        }
        ("RS256" | "PS256", "RSA") => {
            let n = jwk.n.as_deref().ok_or_else(|| missing("n"))?;
            let e = jwk.e.as_deref().ok_or_else(|| missing("e"))?;
            let key = DecodingKey::from_rsa_components(n, e)
                .map_err(|err| DpopError::invalid(format!("bad RSA key: {err}")))?;
            let algorithm = if alg == "RS256" {
                Algorithm::RS256
            } else {
                Algorithm::PS256
            };
            Ok((algorithm, key))
        }
        _ => Err(DpopError::invalid(format!(
            "unsupported alg {alg} for kty {}",
            jwk.kty
        ))),
    }
}

/// Drop the query and fragment; everything else is compared byte for byte.
fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// base64url(SHA-256(access token)), the `ath` claim value.
#[must_use]
pub fn access_token_hash(access_token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(access_token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::rand::SystemRandom;
    use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
    use serde_json::json;

    const URL: &str = "https://auth.example.com/oauth/token";

    struct TestKey {
        pair: EcdsaKeyPair,
        rng: SystemRandom,
    }

    impl TestKey {
        fn new() -> Self {
            let rng = SystemRandom::new();
            let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng).unwrap();
            let pair =
                EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                    .unwrap();
            Self { pair, rng }
        }

        fn jwk(&self) -> serde_json::Value {
            let point = self.pair.public_key().as_ref();
            json!({
                "kty": "EC",
                "crv": "P-256",
                "x": URL_SAFE_NO_PAD.encode(&point[1..33]),
                "y": URL_SAFE_NO_PAD.encode(&point[33..65]),
            })
        }

        fn proof(&self, claims: serde_json::Value) -> String {
            let header = json!({"typ": "dpop+jwt", "alg": "ES256", "jwk": self.jwk()});
            let input = format!(
                "{}.{}",
                URL_SAFE_NO_PAD.encode(header.to_string()),
                URL_SAFE_NO_PAD.encode(claims.to_string())
            );
            let sig = self.pair.sign(&self.rng, input.as_bytes()).unwrap();
            format!("{input}.{}", URL_SAFE_NO_PAD.encode(sig.as_ref()))
        }

        fn jkt(&self) -> String {
            let jwk: Jwk = serde_json::from_value(self.jwk()).unwrap();
            JwkThumbprint::compute(&jwk).unwrap()
        }
    }

    fn claims(htm: &str, htu: &str, iat: i64) -> serde_json::Value {
        json!({"jti": uuid::Uuid::new_v4().to_string(), "htm": htm, "htu": htu, "iat": iat})
    }

    fn verifier() -> DpopVerifier {
        DpopVerifier::new(Duration::from_secs(300))
    }

    #[test]
    fn test_valid_proof() {
        let key = TestKey::new();
        let now = 1_700_000_000;
        let proof = key.proof(claims("POST", URL, now));

        let verified = verifier()
            .verify_at(&proof, "POST", URL, VerifyOptions::default(), now)
            .unwrap();
        assert_eq!(verified.jkt, key.jkt());
        assert_eq!(verified.htm, "POST");
    }

    #[test]
    fn test_htm_mismatch_is_distinguishable() {
        let key = TestKey::new();
        let now = 1_700_000_000;
        let proof = key.proof(claims("GET", URL, now));

        let err = verifier()
            .verify_at(&proof, "POST", URL, VerifyOptions::default(), now)
            .unwrap_err();
        assert!(matches!(err, DpopError::HtmMismatch { .. }));
        assert_eq!(err.to_string(), "Invalid DPoP htm claim");
    }

    #[test]
    fn test_htm_is_case_sensitive() {
        let key = TestKey::new();
        let now = 1_700_000_000;
        let proof = key.proof(claims("post", URL, now));

        let err = verifier()
            .verify_at(&proof, "POST", URL, VerifyOptions::default(), now)
            .unwrap_err();
        assert!(matches!(err, DpopError::HtmMismatch { .. }));
    }

    #[test]
    fn test_htu_ignores_query_only() {
        let key = TestKey::new();
        let now = 1_700_000_000;

        let proof = key.proof(claims("POST", URL, now));
        let with_query = format!("{URL}?tenant_id=acme");
        assert!(verifier()
            .verify_at(&proof, "POST", &with_query, VerifyOptions::default(), now)
            .is_ok());

        let proof = key.proof(claims("POST", &format!("{URL}/"), now));
        let err = verifier()
            .verify_at(&proof, "POST", URL, VerifyOptions::default(), now)
            .unwrap_err();
        assert!(matches!(err, DpopError::HtuMismatch { .. }));
    }

    #[test]
    fn test_stale_and_future_proofs_expire() {
        let key = TestKey::new();
        let now = 1_700_000_000;

        for iat in [now - 301, now + 301] {
            let proof = key.proof(claims("POST", URL, iat));
            let err = verifier()
                .verify_at(&proof, "POST", URL, VerifyOptions::default(), now)
                .unwrap_err();
            assert!(matches!(err, DpopError::ProofExpired { .. }));
        }

        let proof = key.proof(claims("POST", URL, now - 300));
        assert!(verifier()
            .verify_at(&proof, "POST", URL, VerifyOptions::default(), now)
            .is_ok());
    }

    #[test]
    fn test_tampered_signature_is_generic_invalid_proof() {
        let key = TestKey::new();
        let now = 1_700_000_000;
        let proof = key.proof(claims("POST", URL, now));
        let other = TestKey::new().proof(claims("POST", URL, now));

        // Header and payload from one key, signature from another.
        let (input, _) = proof.rsplit_once('.').unwrap();
        let (_, foreign_sig) = other.rsplit_once('.').unwrap();
        let forged = format!("{input}.{foreign_sig}");

        let err = verifier()
            .verify_at(&forged, "POST", URL, VerifyOptions::default(), now)
            .unwrap_err();
        assert!(matches!(err, DpopError::InvalidProof { .. }));
        assert_eq!(err.to_string(), "Invalid DPoP proof");
    }

    #[test]
    fn test_binding() {
        let key = TestKey::new();
        let now = 1_700_000_000;
        let proof = key.proof(claims("POST", URL, now));
        let jkt = key.jkt();

        assert!(verifier()
            .verify_at(&proof, "POST", URL, VerifyOptions::bound_to(&jkt), now)
            .is_ok());

        let err = verifier()
            .verify_at(&proof, "POST", URL, VerifyOptions::bound_to("someone-else"), now)
            .unwrap_err();
        assert!(matches!(err, DpopError::BindingMismatch));

        let missing = VerifyOptions {
            require_binding: true,
            ..VerifyOptions::default()
        };
        let err = verifier()
            .verify_at(&proof, "POST", URL, missing, now)
            .unwrap_err();
        assert!(matches!(err, DpopError::BindingMissing));
    }

    #[test]
    fn test_ath() {
        let key = TestKey::new();
        let now = 1_700_000_000;
        let mut body = claims("GET", "https://api.example.com/resource", now);
        body["ath"] = json!(access_token_hash("the-access-token"));
        let proof = key.proof(body);

        let ok = VerifyOptions {
            access_token: Some("the-access-token"),
            ..VerifyOptions::default()
        };
        assert!(verifier()
            .verify_at(&proof, "GET", "https://api.example.com/resource", ok, now)
            .is_ok());

        let wrong = VerifyOptions {
            access_token: Some("another-token"),
            ..VerifyOptions::default()
        };
        let err = verifier()
            .verify_at(&proof, "GET", "https://api.example.com/resource", wrong, now)
            .unwrap_err();
        assert!(matches!(err, DpopError::AthMismatch));
    }

    #[test]
    fn test_empty_proof_is_missing() {
        let err = verifier()
            .verify("", "POST", URL, VerifyOptions::default())
            .unwrap_err();
        assert!(matches!(err, DpopError::Missing));
    }

    #[test]
    fn test_strip_query() {
        assert_eq!(strip_query("https://a/b?c=d"), "https://a/b");
        assert_eq!(strip_query("https://a/b#frag"), "https://a/b");
        assert_eq!(strip_query("https://a/b"), "https://a/b");
    }
}
