//! Request and response shapes of the authorization endpoints.

use serde::{Deserialize, Serialize};

/// Grant type of the device authorization grant.
pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// DPoP header of a request, with the method and URL it must be bound to.
#[derive(Debug, Clone, Copy)]
pub struct DpopContext<'a> {
    /// Value of the `DPoP` header
    pub proof: Option<&'a str>,
    /// Request method
    pub method: &'a str,
    /// Public request URL
    pub url: &'a str,
}

/// Token endpoint form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// Grant type
    pub grant_type: Option<String>,
    /// Authorization code
    pub code: Option<String>,
    /// PKCE verifier
    pub code_verifier: Option<String>,
    /// Redirect URI the code was delivered to
    pub redirect_uri: Option<String>,
    /// Refresh token
    pub refresh_token: Option<String>,
    /// Device code
    pub device_code: Option<String>,
}

/// Token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    /// DPoP-bound access token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: String,
    /// Always "DPoP"
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Granted scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// `/authorize` query. Also the shape of a pushed authorization request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeRequest {
    /// Where to send the code
    pub redirect_uri: Option<String>,
    /// Requested scope
    pub scope: Option<String>,
    /// PKCE challenge
    pub code_challenge: Option<String>,
    /// PKCE method
    pub code_challenge_method: Option<String>,
    /// Pushed request reference
    pub request_uri: Option<String>,
    /// Opaque client state
    pub state: Option<String>,
    /// Requesting client
    pub client_id: Option<String>,
}

/// Pushed authorization response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParResponse {
    /// Reference to pass to `/authorize`
    pub request_uri: String,
    /// Seconds until the reference expires
    pub expires_in: u64,
}

/// Device authorization form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceAuthorizationRequest {
    /// Requested scope
    pub scope: Option<String>,
    /// Requesting client
    pub client_id: Option<String>,
}

/// Device authorization response (RFC 8628 §3.2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceAuthorizationResponse {
    /// Code the device polls with
    pub device_code: String,
    /// Code the user enters
    pub user_code: String,
    /// Where the user enters it
    pub verification_uri: String,
    /// Seconds until the codes expire
    pub expires_in: u64,
    /// Minimum polling interval in seconds
    pub interval: u64,
}

/// Device verification decision.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceVerification {
    /// Code shown on the device
    pub user_code: String,
    /// Approve or deny
    pub approve: bool,
}

/// Revocation form (RFC 7009).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevocationRequest {
    /// Token to revoke
    pub token: Option<String>,
    /// `refresh_token` or `access_token`
    pub token_type_hint: Option<String>,
}

/// Introspection form (RFC 7662).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntrospectionRequest {
    /// Token to introspect
    pub token: Option<String>,
}

/// Introspection response (RFC 7662 §2.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntrospectionResponse {
    /// Whether the token is currently active
    pub active: bool,
    /// Subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued-at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Not-before
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Token type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Owning tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl IntrospectionResponse {
    /// `{"active": false}`
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// Backchannel logout form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoutRequest {
    /// Logout token
    pub logout_token: Option<String>,
}

/// OpenID Provider metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryDocument {
    /// Tenant issuer
    pub issuer: String,
    /// Authorization endpoint
    pub authorization_endpoint: String,
    /// Token endpoint
    pub token_endpoint: String,
    /// PAR endpoint
    pub pushed_authorization_request_endpoint: String,
    /// Device authorization endpoint
    pub device_authorization_endpoint: String,
    /// Revocation endpoint
    pub revocation_endpoint: String,
    /// Introspection endpoint
    pub introspection_endpoint: String,
    /// JWKS
    pub jwks_uri: String,
    /// Supported response types
    pub response_types_supported: Vec<String>,
    /// Supported grant types
    pub grant_types_supported: Vec<String>,
    /// Supported PKCE methods
    pub code_challenge_methods_supported: Vec<String>,
    /// Accepted DPoP proof algorithms
    pub dpop_signing_alg_values_supported: Vec<String>,
    /// Client authentication methods
    pub token_endpoint_auth_methods_supported: Vec<String>,
    /// Backchannel logout support
    pub backchannel_logout_supported: bool,
    /// Whether PAR is mandatory
    pub require_pushed_authorization_requests: bool,
}
