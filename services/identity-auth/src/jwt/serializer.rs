//! ES256 compact JWS encoding and decoding.

use crate::error::AuthError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Serialize};

/// JWT encoder/decoder bound to one algorithm.
pub struct JwtSerializer {
    algorithm: Algorithm,
}

impl Default for JwtSerializer {
    fn default() -> Self {
        Self::new(Algorithm::ES256)
    }
}

impl JwtSerializer {
    /// Create a serializer for `algorithm`.
    #[must_use]
    pub const fn new(algorithm: Algorithm) -> Self {
        Self { algorithm }
    }

    /// Sign `claims` with header `{alg, typ: "JWT", kid}`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if encoding or signing fails.
    pub fn serialize<T: Serialize>(
        &self,
        claims: &T,
        key: &EncodingKey,
        kid: &str,
    ) -> Result<String, AuthError> {
        let mut header = Header::new(self.algorithm);
        header.typ = Some("JWT".to_string());
        header.kid = Some(kid.to_string());
        Ok(encode(&header, claims, key)?)
    }

    /// Verify signature, `exp` and `nbf`, and optionally `iss`/`aud`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the signature or any checked claim is invalid.
    pub fn deserialize<T: DeserializeOwned>(
        &self,
        token: &str,
        key: &DecodingKey,
        issuer: Option<&str>,
    ) -> Result<T, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;
        match issuer {
            Some(iss) => {
                validation.set_issuer(&[iss]);
                validation.set_audience(&[iss]);
            }
            None => validation.validate_aud = false,
        }

        decode::<T>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(format!("Invalid token: {e}")))
    }

    /// `kid` from the token header, without any verification.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the header is malformed or carries no `kid`.
    pub fn header_kid(token: &str) -> Result<String, AuthError> {
        decode_header(token)
            .map_err(|e| AuthError::InvalidToken(format!("Invalid token header: {e}")))?
            .kid
            .ok_or_else(|| AuthError::InvalidToken("Token header has no kid".to_string()))
    }

    /// Decode the payload without verifying the signature.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the token is not three segments with a JSON payload.
    pub fn deserialize_unverified<T: DeserializeOwned>(token: &str) -> Result<T, AuthError> {
        let mut parts = token.split('.');
        let (Some(_), Some(payload), Some(_), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidToken("Invalid token format".to_string()));
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}
