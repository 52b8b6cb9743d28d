use super::AuthorizationEngine;
use crate::directory::RegisteredClient;
use crate::engine::types::{DiscoveryDocument, IntrospectionResponse, DEVICE_CODE_GRANT};
use crate::error::{AuthError, AuthResult};
use crate::jwks::Jwks;
use crate::jwt::{JwtSerializer, UnverifiedClaims};
use crate::metrics;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use rust_common::with_timeout;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, instrument, warn};

/// Event member a logout token must carry.
pub const BACKCHANNEL_LOGOUT_EVENT: &str = "http://schemas.openid.net/event/backchannel-logout";

const REASON_LOGOUT: &str = "logout";

#[derive(Debug, Deserialize)]
struct LogoutClaims {
    iss: String,
    sid: Option<String>,
    #[serde(default)]
    events: HashMap<String, serde_json::Value>,
}

impl AuthorizationEngine {
    /// Authenticate a client by id and secret.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for an unknown client or a wrong secret.
    pub async fn authenticate_client(
        &self,
        client_id: &str,
        secret: &str,
    ) -> AuthResult<RegisteredClient> {
        let client = with_timeout(
            self.store_timeout,
            "clients.find_client",
            self.clients.find_client(client_id),
        )
        .await?;
        match client {
            Some(client) if client.verify_secret(secret) => Ok(client),
            _ => {
                warn!(client_id = %client_id, "Client authentication failed");
                Err(AuthError::unauthorized("Invalid client credentials"))
            }
        }
    }

    /// RFC 7662 introspection.
    ///
    /// Claims are decoded without verifying the signature; only expiry,
    /// not-before and the user's logout watermark are checked.
    ///
    /// # Errors
    ///
    /// Returns a platform error if session state cannot be read. Malformed
    /// tokens are reported as inactive, not as errors.
    #[instrument(skip_all)]
    pub async fn introspect(&self, token: &str) -> AuthResult<IntrospectionResponse> {
        let Ok(claims) = JwtSerializer::deserialize_unverified::<UnverifiedClaims>(token) else {
            return Ok(IntrospectionResponse::inactive());
        };
        warn!(signature_verified = false, "Introspecting token without signature verification");

        let now = Utc::now().timestamp();
        if claims.exp.is_some_and(|exp| exp <= now) || claims.nbf.is_some_and(|nbf| nbf > now) {
            return Ok(IntrospectionResponse::inactive());
        }

        if let (Some(sub), Some(tenant_id), Some(iat)) = (&claims.sub, &claims.tenant_id, claims.iat) {
            let not_before = with_timeout(
                self.store_timeout,
                "sessions.not_before",
                self.sessions.not_before(sub, tenant_id),
            )
            .await?;
            // iat has whole-second precision; the logout second itself is revoked.
            if not_before.is_some_and(|nb| iat <= nb.timestamp()) {
                return Ok(IntrospectionResponse::inactive());
            }
        }

        let token_type = if claims.token_use.as_deref() == Some("refresh") {
            "refresh_token"
        } else if claims.cnf.is_some() {
            "DPoP"
        } else {
            "Bearer"
        };
        Ok(IntrospectionResponse {
            active: true,
            sub: claims.sub,
            scope: claims.scope,
            exp: claims.exp,
            iat: claims.iat,
            nbf: claims.nbf,
            client_id: claims.client_id,
            token_type: Some(token_type.to_string()),
            tenant_id: claims.tenant_id,
        })
    }

    /// RFC 7009 revocation. Succeeds whether or not the token existed.
    ///
    /// Access tokens are self-contained and are not tracked; any other hint
    /// removes the refresh-token record.
    ///
    /// # Errors
    ///
    /// Returns a platform error only if the repository fails.
    #[instrument(skip_all, fields(hint = hint.unwrap_or("")))]
    pub async fn revoke(&self, token: &str, hint: Option<&str>) -> AuthResult<()> {
        if hint == Some("access_token") || token.is_empty() {
            return Ok(());
        }
        if self.rotator.delete(token).await? {
            info!("Refresh token revoked");
        }
        Ok(())
    }

    /// OIDC back-channel logout. Never fails: the relying party must always
    /// receive 200, so every error is logged and dropped.
    #[instrument(skip_all)]
    pub async fn backchannel_logout(&self, logout_token: &str) {
        match self.process_logout(logout_token).await {
            Ok(sid) => info!(sid = %sid, "Back-channel logout processed"),
            Err(e) => {
                warn!(event_type = "BACKCHANNEL_LOGOUT_FAILED", error = %e, "Back-channel logout failed");
                metrics::record_security_event("BACKCHANNEL_LOGOUT_FAILED");
            }
        }
    }

    async fn process_logout(&self, logout_token: &str) -> AuthResult<String> {
        let header = decode_header(logout_token)
            .map_err(|e| AuthError::unauthorized(format!("Invalid logout token: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::unauthorized("Missing kid in logout token"))?;
        let unverified: UnverifiedIssuer = JwtSerializer::deserialize_unverified(logout_token)?;
        let client_id = unverified
            .iss
            .ok_or_else(|| AuthError::unauthorized("Missing iss in logout token"))?;

        let client = with_timeout(
            self.store_timeout,
            "clients.find_client",
            self.clients.find_client(&client_id),
        )
        .await?
        .ok_or_else(|| AuthError::NotFound(format!("Unknown client: {client_id}")))?;
        let jwk = client
            .jwks
            .find(&kid)
            .ok_or_else(|| AuthError::NotFound(format!("Unknown kid {kid} for client {client_id}")))?;
        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| AuthError::unauthorized(format!("Unusable client key: {e}")))?;

        let mut validation = Validation::new(header.alg);
        validation.required_spec_claims.clear();
        validation.validate_aud = false;
        validation.set_issuer(&[client_id.as_str()]);
        let claims = decode::<LogoutClaims>(logout_token, &key, &validation)
            .map_err(|e| AuthError::unauthorized(format!("Invalid logout token: {e}")))?
            .claims;

        if !claims.events.contains_key(BACKCHANNEL_LOGOUT_EVENT) {
            return Err(AuthError::bad_request("Missing backchannel-logout event claim"));
        }
        let sid = claims
            .sid
            .ok_or_else(|| AuthError::bad_request("Missing sid claim"))?;

        let known = with_timeout(
            self.store_timeout,
            "sessions.revoke_session",
            self.sessions.revoke_session(&sid),
        )
        .await?;
        let revoked = self.rotator.revoke_session(&sid, REASON_LOGOUT).await?;
        info!(client_id = %claims.iss, known, revoked, "Session revoked");
        Ok(sid)
    }

    /// Published keys of a tenant.
    ///
    /// # Errors
    ///
    /// Returns a platform error if keys cannot be listed.
    pub async fn jwks(&self, tenant_id: &str) -> AuthResult<Jwks> {
        self.keys.get_jwks_for_tenant(tenant_id).await
    }

    /// OpenID Provider metadata for a tenant.
    #[must_use]
    pub fn discovery_document(&self, tenant_id: &str) -> DiscoveryDocument {
        let base = &self.issuer_base_url;
        let strings = |values: &[&str]| -> Vec<String> { values.iter().map(|v| (*v).to_string()).collect() };
        DiscoveryDocument {
            issuer: self.issuer.issuer_for(tenant_id),
            authorization_endpoint: format!("{base}/authorize"),
            token_endpoint: format!("{base}/oauth/token"),
            pushed_authorization_request_endpoint: format!("{base}/oauth/par"),
            device_authorization_endpoint: format!("{base}/oauth/device_authorization"),
            revocation_endpoint: format!("{base}/oauth/revoke"),
            introspection_endpoint: format!("{base}/oauth/introspect"),
            jwks_uri: format!("{base}/.well-known/jwks.json?tenant_id={tenant_id}"),
            response_types_supported: strings(&["code"]),
            grant_types_supported: strings(&["authorization_code", "refresh_token", DEVICE_CODE_GRANT]),
            code_challenge_methods_supported: strings(&["S256", "plain"]),
            dpop_signing_alg_values_supported: strings(&["ES256", "RS256", "PS256"]),
            token_endpoint_auth_methods_supported: strings(&["client_secret_basic"]),
            backchannel_logout_supported: true,
            require_pushed_authorization_requests: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UnverifiedIssuer {
    iss: Option<String>,
}
