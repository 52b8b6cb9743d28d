//! DPoP (RFC 9449) proof parsing and verification.

pub mod proof;
pub mod thumbprint;
pub mod verifier;

pub use proof::{DpopClaims, DpopError, DpopHeader, DpopProof, Jwk};
pub use thumbprint::JwkThumbprint;
pub use verifier::{DpopVerifier, VerifiedProof, VerifyOptions};
