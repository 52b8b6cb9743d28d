//! Claim sets for tokens minted by this service.

use serde::{Deserialize, Serialize};

/// DPoP confirmation claim (`cnf`) per RFC 9449.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Confirmation {
    /// JWK thumbprint per RFC 7638
    pub jkt: String,
}

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    /// Tenant issuer
    pub iss: String,
    /// Audience; the tenant issuer
    pub aud: String,
    /// User identifier
    pub sub: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Space-delimited scope
    pub scope: String,
    /// Proof-of-possession binding
    pub cnf: Confirmation,
    /// Token identifier
    pub jti: String,
    /// Issued-at
    pub iat: i64,
    /// Not-before
    pub nbf: i64,
    /// Expiry
    pub exp: i64,
    /// Client the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl AccessClaims {
    /// Bound thumbprint.
    #[must_use]
    pub fn jkt(&self) -> &str {
        &self.cnf.jkt
    }

    /// Whether `timestamp` is within `[nbf, exp)`.
    #[must_use]
    pub const fn is_valid_at(&self, timestamp: i64) -> bool {
        timestamp >= self.nbf && timestamp < self.exp
    }
}

/// Refresh token claims. The token is opaque to clients; only its
/// SHA-256 hash is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    /// Tenant issuer
    pub iss: String,
    /// User identifier
    pub sub: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Always "refresh"
    pub token_use: String,
    /// Proof-of-possession binding
    pub cnf: Confirmation,
    /// Token identifier, also the record id
    pub jti: String,
    /// Issued-at
    pub iat: i64,
    /// Expiry
    pub exp: i64,
}

/// Loosely typed view used by introspection, where the token kind is not
/// known up front.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnverifiedClaims {
    /// Subject
    pub sub: Option<String>,
    /// Owning tenant
    pub tenant_id: Option<String>,
    /// Scope
    pub scope: Option<String>,
    /// Expiry
    pub exp: Option<i64>,
    /// Issued-at
    pub iat: Option<i64>,
    /// Not-before
    pub nbf: Option<i64>,
    /// Client
    pub client_id: Option<String>,
    /// Confirmation
    pub cnf: Option<Confirmation>,
    /// "refresh" for refresh tokens
    pub token_use: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> AccessClaims {
        AccessClaims {
            iss: "https://auth.example.com/t/acme".to_string(),
            aud: "https://auth.example.com/t/acme".to_string(),
            sub: "user-123".to_string(),
            tenant_id: "acme".to_string(),
            scope: "openid profile".to_string(),
            cnf: Confirmation {
                jkt: "thumb".to_string(),
            },
            jti: "jti-1".to_string(),
            iat: 1_000,
            nbf: 1_000,
            exp: 1_900,
            client_id: None,
        }
    }

    #[test]
    fn test_validity_window() {
        let claims = claims();
        assert!(!claims.is_valid_at(999));
        assert!(claims.is_valid_at(1_000));
        assert!(claims.is_valid_at(1_899));
        assert!(!claims.is_valid_at(1_900));
    }

    #[test]
    fn test_cnf_serialization() {
        let json = serde_json::to_value(claims()).unwrap();
        assert_eq!(json["cnf"]["jkt"], "thumb");
        assert!(json.get("client_id").is_none());
    }
}
