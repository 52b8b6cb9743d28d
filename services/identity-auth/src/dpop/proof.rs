//! DPoP proof structure per RFC 9449.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

/// DPoP proof JWT header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpopHeader {
    /// Must be "dpop+jwt"
    pub typ: Option<String>,
    /// Signature algorithm
    pub alg: String,
    /// Embedded public key
    pub jwk: Option<Jwk>,
}

/// Public JSON Web Key embedded in a proof.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type ("EC" or "RSA")
    pub kty: String,
    /// EC curve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// EC x coordinate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// RSA modulus
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// Private EC/RSA exponent; a proof carrying it is rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

/// DPoP proof JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpopClaims {
    /// Unique identifier for the proof
    pub jti: String,
    /// HTTP method of the request
    pub htm: String,
    /// HTTP URI of the request, without query and fragment
    pub htu: String,
    /// Issued-at, seconds since the epoch
    pub iat: i64,
    /// Access token hash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,
    /// Server-provided nonce
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// A compact DPoP JWS split into its parts. The payload is decoded only
/// after the signature has been checked.
#[derive(Debug, Clone)]
pub struct DpopProof<'a> {
    /// Decoded header
    pub header: DpopHeader,
    /// Embedded public key
    pub jwk: Jwk,
    signing_input: &'a str,
    payload: &'a str,
    signature: &'a str,
}

impl<'a> DpopProof<'a> {
    /// Split a compact JWS and decode its header.
    ///
    /// # Errors
    ///
    /// Returns `InvalidProof` for anything but three base64url segments with
    /// a `dpop+jwt` header carrying a public `jwk`.
    pub fn parse(token: &'a str) -> Result<Self, DpopError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(DpopError::invalid("Invalid JWS format"));
        };
        if header_b64.is_empty() || payload.is_empty() || signature.is_empty() {
            return Err(DpopError::invalid("Invalid JWS format"));
        }

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|e| DpopError::invalid(format!("header encoding: {e}")))?;
        let header: DpopHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| DpopError::invalid(format!("header json: {e}")))?;

        if header.typ.as_deref() != Some("dpop+jwt") {
            return Err(DpopError::invalid(format!(
                "typ must be dpop+jwt, got {:?}",
                header.typ
            )));
        }
        let jwk = header
            .jwk
            .clone()
            .ok_or_else(|| DpopError::invalid("Missing jwk in header"))?;
        if jwk.d.is_some() {
            return Err(DpopError::invalid("jwk must not contain private key material"));
        }

        let signing_input = &token[..header_b64.len() + 1 + payload.len()];
        Ok(Self {
            header,
            jwk,
            signing_input,
            payload,
            signature,
        })
    }

    /// The `header.payload` bytes covered by the signature.
    #[must_use]
    pub const fn signing_input(&self) -> &'a str {
        self.signing_input
    }

    /// The base64url signature segment.
    #[must_use]
    pub const fn signature(&self) -> &'a str {
        self.signature
    }

    /// Decode the payload claims.
    ///
    /// # Errors
    ///
    /// Returns `InvalidProof` if the payload is not valid base64url JSON with
    /// `jti`, `htm`, `htu` and `iat`.
    pub fn claims(&self) -> Result<DpopClaims, DpopError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(self.payload)
            .map_err(|e| DpopError::invalid(format!("payload encoding: {e}")))?;
        let claims: DpopClaims = serde_json::from_slice(&bytes)
            .map_err(|e| DpopError::invalid(format!("payload json: {e}")))?;
        if claims.jti.is_empty() {
            return Err(DpopError::invalid("Invalid or missing jti in DPoP proof"));
        }
        Ok(claims)
    }
}

/// DPoP verification failure.
///
/// Display strings are client-facing problem details; `reason` fields are
/// for logs only.
#[derive(Debug, thiserror::Error)]
pub enum DpopError {
    /// No proof was presented.
    #[error("DPoP proof is required")]
    Missing,

    /// Malformed proof or bad signature.
    #[error("Invalid DPoP proof")]
    InvalidProof {
        /// Internal reason, never returned to clients
        reason: String,
    },

    /// `htm` differs from the request method.
    #[error("Invalid DPoP htm claim")]
    HtmMismatch {
        /// Request method
        expected: String,
        /// Claimed method
        actual: String,
    },

    /// `htu` differs from the request URL.
    #[error("Invalid DPoP htu claim")]
    HtuMismatch {
        /// Request URL
        expected: String,
        /// Claimed URL
        actual: String,
    },

    /// `iat` outside the allowed skew.
    #[error("DPoP proof expired")]
    ProofExpired {
        /// Claimed issued-at
        iat: i64,
        /// Server time
        now: i64,
    },

    /// Binding required but no bound thumbprint was supplied.
    #[error("Token is missing cnf.jkt binding")]
    BindingMissing,

    /// Proof key differs from the bound thumbprint.
    #[error("DPoP proof does not match provided binding")]
    BindingMismatch,

    /// `ath` does not hash the presented access token.
    #[error("Invalid DPoP ath claim")]
    AthMismatch,
}

impl DpopError {
    /// Create a generic invalid-proof error.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidProof {
            reason: reason.into(),
        }
    }

    /// Short label for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::InvalidProof { .. } => "invalid_proof",
            Self::HtmMismatch { .. } => "htm_mismatch",
            Self::HtuMismatch { .. } => "htu_mismatch",
            Self::ProofExpired { .. } => "proof_expired",
            Self::BindingMissing => "binding_missing",
            Self::BindingMismatch => "binding_mismatch",
            Self::AthMismatch => "ath_mismatch",
        }
    }
}
