//! Error taxonomy for the authorization core.
//!
//! Every user-facing failure renders as an RFC 7807 problem document.
//! Storage failures are reported to the caller as a generic server error;
//! the underlying message is only logged.

use crate::dpop::DpopError;
use rust_common::PlatformError;
use serde::Serialize;
use thiserror::Error;

/// Authorization-core error.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Malformed or missing request parameters.
    #[error("{0}")]
    BadRequest(String),

    /// Missing or invalid credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// DPoP proof failed verification.
    #[error(transparent)]
    Dpop(#[from] DpopError),

    /// A single-use artifact was presented a second time.
    #[error("{detail}")]
    ReplayDetected {
        /// Replay scope label
        scope: &'static str,
        /// Client-facing detail
        detail: &'static str,
    },

    /// Grant artifact rejected (e.g. PKCE verifier mismatch).
    #[error("{0}")]
    InvalidGrant(String),

    /// Refresh token unknown, revoked or already consumed.
    #[error("{0}")]
    InvalidToken(String),

    /// An already-used refresh token was presented; its family was revoked.
    #[error("Refresh token reuse detected")]
    ReuseDetected {
        /// Family that was revoked
        family_id: String,
    },

    /// Refresh token past its expiry.
    #[error("Refresh token expired")]
    Expired,

    /// Device authorization not yet decided.
    #[error("authorization_pending")]
    AuthorizationPending,

    /// Device authorization denied by the user.
    #[error("access_denied")]
    AccessDenied,

    /// Unknown user, key or other resource.
    #[error("{0}")]
    NotFound(String),

    /// Persistence or cache failure.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Internal failure (signing, configuration).
    #[error("{0}")]
    Internal(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Internal(format!("JWT error: {err}"))
    }
}

impl AuthError {
    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create an unauthorized error.
    #[must_use]
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::AuthorizationPending => 400,
            Self::Unauthorized(_)
            | Self::Dpop(_)
            | Self::ReplayDetected { .. }
            | Self::InvalidGrant(_)
            | Self::InvalidToken(_)
            | Self::ReuseDetected { .. }
            | Self::Expired => 401,
            Self::AccessDenied => 403,
            Self::NotFound(_) => 404,
            Self::Platform(_) | Self::Internal(_) => 500,
        }
    }

    /// OAuth 2.0 error code, where one applies.
    #[must_use]
    pub const fn oauth_code(&self) -> Option<&'static str> {
        match self {
            Self::AuthorizationPending => Some("authorization_pending"),
            Self::AccessDenied => Some("access_denied"),
            Self::InvalidGrant(_) | Self::ReuseDetected { .. } | Self::Expired => {
                Some("invalid_grant")
            }
            Self::Dpop(_) | Self::ReplayDetected { .. } => Some("invalid_dpop_proof"),
            _ => None,
        }
    }

    /// Whether this error hides an internal failure from the client.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Render as an RFC 7807 problem document.
    #[must_use]
    pub fn problem(&self, instance: &str) -> ProblemDetails {
        let status = self.status_code();
        let (slug, title) = match status {
            400 => ("bad-request", "Bad Request"),
            401 => ("unauthorized", "Unauthorized"),
            403 => ("forbidden", "Forbidden"),
            404 => ("not-found", "Not Found"),
            _ => ("internal-server-error", "Internal Server Error"),
        };
        let detail = if self.is_server_error() {
            "An unexpected error occurred".to_string()
        } else {
            self.to_string()
        };

        ProblemDetails {
            problem_type: format!("/problems/{slug}"),
            title: title.to_string(),
            status,
            detail,
            instance: instance.to_string(),
            error: self.oauth_code(),
        }
    }
}

/// RFC 7807 problem document.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProblemDetails {
    /// Problem type reference
    #[serde(rename = "type")]
    pub problem_type: String,
    /// Short summary of the problem type
    pub title: String,
    /// HTTP status code
    pub status: u16,
    /// Occurrence-specific explanation
    pub detail: String,
    /// Request path the problem occurred on
    pub instance: String,
    /// OAuth 2.0 error code extension member
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// Convenience alias for results in this crate.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::bad_request("x").status_code(), 400);
        assert_eq!(AuthError::unauthorized("x").status_code(), 401);
        assert_eq!(
            AuthError::ReuseDetected {
                family_id: "f".to_string()
            }
            .status_code(),
            401
        );
        assert_eq!(AuthError::AccessDenied.status_code(), 403);
        assert_eq!(AuthError::NotFound("User not found".to_string()).status_code(), 404);
        assert_eq!(
            AuthError::Platform(PlatformError::timeout("cache.get")).status_code(),
            500
        );
    }

    #[test]
    fn test_problem_document_for_htm_mismatch() {
        let err = AuthError::from(DpopError::HtmMismatch {
            expected: "POST".to_string(),
            actual: "GET".to_string(),
        });
        let problem = err.problem("/oauth/token");

        assert_eq!(problem.status, 401);
        assert_eq!(problem.title, "Unauthorized");
        assert_eq!(problem.problem_type, "/problems/unauthorized");
        assert_eq!(problem.detail, "Invalid DPoP htm claim");
        assert_eq!(problem.instance, "/oauth/token");
    }

    #[test]
    fn test_server_errors_hide_internal_detail() {
        let err = AuthError::Platform(PlatformError::storage("connection reset by peer"));
        let problem = err.problem("/oauth/token");

        assert_eq!(problem.status, 500);
        assert!(!problem.detail.contains("connection reset"));
    }

    #[test]
    fn test_problem_serializes_type_field() {
        let problem = AuthError::AuthorizationPending.problem("/oauth/token");
        let json = serde_json::to_value(&problem).unwrap();

        assert_eq!(json["type"], "/problems/bad-request");
        assert_eq!(json["error"], "authorization_pending");
        assert_eq!(json["detail"], "authorization_pending");
    }
}
