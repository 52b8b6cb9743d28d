//! Proof Key for Code Exchange (RFC 7636).

use crate::error::AuthError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

/// Code challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkceMethod {
    /// `base64url(sha256(verifier))`
    S256,
    /// The verifier itself
    #[serde(rename = "plain")]
    Plain,
}

impl PkceMethod {
    /// Challenge for `verifier` under this method.
    #[must_use]
    pub fn challenge(self, verifier: &str) -> String {
        match self {
            Self::S256 => URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())),
            Self::Plain => verifier.to_string(),
        }
    }

    /// Constant-time check of `verifier` against a stored challenge.
    #[must_use]
    pub fn verify(self, verifier: &str, challenge: &str) -> bool {
        self.challenge(verifier)
            .as_bytes()
            .ct_eq(challenge.as_bytes())
            .into()
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }
}

impl FromStr for PkceMethod {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(Self::S256),
            "plain" => Ok(Self::Plain),
            other => Err(AuthError::bad_request(format!(
                "Unsupported code_challenge_method: {other}"
            ))),
        }
    }
}

impl fmt::Display for PkceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
