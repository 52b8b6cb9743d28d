use super::{AuthorizationEngine, DpopContext};
use crate::directory::User;
use crate::dpop::VerifiedProof;
use crate::engine::types::{
    AuthorizeRequest, DeviceAuthorizationRequest, DeviceAuthorizationResponse, ParResponse,
    TokenRequest, TokenResponse, DEVICE_CODE_GRANT,
};
use crate::error::{AuthError, AuthResult};
use crate::metrics;
use crate::replay::ReplayScope;
use crate::store::{AuthorizationCode, DeviceCode, DeviceCodeStatus, ParRequest, PkceMethod};
use crate::tokens::RefreshLineage;
use rust_common::with_timeout;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

const DEFAULT_SCOPE: &str = "openid";

impl AuthorizationEngine {
    /// Token endpoint. The DPoP proof is checked before `grant_type`.
    ///
    /// # Errors
    ///
    /// DPoP errors first, then `BadRequest` for an unknown grant type, then
    /// the selected grant's errors.
    #[instrument(skip_all, fields(grant_type = request.grant_type.as_deref().unwrap_or("")))]
    pub async fn token(
        &self,
        request: TokenRequest,
        dpop: DpopContext<'_>,
    ) -> AuthResult<TokenResponse> {
        let proof = self.verify_dpop(dpop)?;
        match request.grant_type.as_deref() {
            Some("authorization_code") => self.exchange_code(&request, &proof).await,
            Some("refresh_token") => self.refresh(&request, dpop).await,
            Some(DEVICE_CODE_GRANT) => self.exchange_device_code(&request, &proof).await,
            _ => Err(AuthError::bad_request("Invalid grant_type")),
        }
    }

    async fn exchange_code(
        &self,
        request: &TokenRequest,
        proof: &VerifiedProof,
    ) -> AuthResult<TokenResponse> {
        let (Some(code), Some(verifier)) = (&request.code, &request.code_verifier) else {
            return Err(AuthError::bad_request("code and code_verifier are required"));
        };

        let grant = self
            .codes
            .take(code)
            .await?
            .ok_or_else(|| AuthError::bad_request("Invalid authorization code"))?;
        // Consumed before any further check: a failed exchange burns the code.
        self.ledger
            .register(ReplayScope::AuthorizationCode, code, self.codes.ttl())
            .await?;

        if !grant
            .code_challenge_method
            .verify(verifier, &grant.code_challenge)
        {
            warn!(user_id = %grant.user_id, "PKCE verification failed");
            return Err(AuthError::InvalidGrant("Invalid code verifier".to_string()));
        }
        if grant.redirect_uri.is_some() && grant.redirect_uri != request.redirect_uri {
            return Err(AuthError::InvalidGrant("redirect_uri mismatch".to_string()));
        }

        let user = self.resolve_user(&grant.user_id).await?;
        self.issue_pair(
            &user,
            proof,
            &grant.scope,
            grant.client_id,
            None,
            "authorization_code",
        )
        .await
    }

    async fn refresh(
        &self,
        request: &TokenRequest,
        dpop: DpopContext<'_>,
    ) -> AuthResult<TokenResponse> {
        let token = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::bad_request("refresh_token is required"))?;
        let proof = dpop.proof.unwrap_or_default();

        let current = self
            .rotator
            .validate(token, proof, dpop.method, dpop.url)
            .await?;
        let not_before = with_timeout(
            self.store_timeout,
            "sessions.not_before",
            self.sessions.not_before(&current.user_id, &current.tenant_id),
        )
        .await?;
        if not_before.is_some_and(|nb| current.created_at < nb) {
            return Err(AuthError::InvalidToken(
                "Refresh token issued before logout".to_string(),
            ));
        }

        let (refresh_token, next) = self.rotator.rotate(token).await?;
        let user = User::new(next.user_id.clone(), next.tenant_id.clone());
        let scope = next.scope.clone().unwrap_or_else(|| DEFAULT_SCOPE.to_string());
        let access_token = self
            .issuer
            .issue_access_token(&user, &next.jkt, &scope, next.client_id.as_deref())
            .await?;

        metrics::record_token_issued("access", "refresh_token");
        metrics::record_token_issued("refresh", "refresh_token");
        Ok(self.token_response(access_token, refresh_token, scope))
    }

    async fn exchange_device_code(
        &self,
        request: &TokenRequest,
        proof: &VerifiedProof,
    ) -> AuthResult<TokenResponse> {
        let device_code = request
            .device_code
            .as_deref()
            .ok_or_else(|| AuthError::bad_request("device_code is required"))?;

        let record = self
            .devices
            .find(device_code)
            .await?
            .ok_or_else(|| AuthError::bad_request("Invalid or expired device code"))?;

        match record.status {
            DeviceCodeStatus::Pending => Err(AuthError::AuthorizationPending),
            DeviceCodeStatus::Denied => Err(AuthError::AccessDenied),
            DeviceCodeStatus::Approved => {
                self.ledger
                    .register(ReplayScope::DeviceCode, device_code, self.devices.ttl())
                    .await?;
                self.devices.remove(&record).await?;

                let user_id = record
                    .user_id
                    .as_deref()
                    .ok_or_else(|| AuthError::internal("Approved device code has no user"))?;
                let user = self.resolve_user(user_id).await?;
                let scope = record.scope.as_deref().unwrap_or(DEFAULT_SCOPE);
                self.issue_pair(
                    &user,
                    proof,
                    scope,
                    record.client_id.clone(),
                    Some(record.device_code.clone()),
                    "device_code",
                )
                .await
            }
        }
    }

    /// Issue an authorization code for an authenticated user and return
    /// the redirect location.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without a user, `BadRequest` for missing or invalid
    /// PKCE parameters, redirect URI or `request_uri`, `NotFound` for an
    /// unknown user.
    #[instrument(skip_all)]
    pub async fn authorize(
        &self,
        request: AuthorizeRequest,
        user_id: Option<&str>,
    ) -> AuthResult<String> {
        let user_id = user_id.ok_or_else(|| AuthError::unauthorized("Authentication required"))?;

        let pushed = match request.request_uri.as_deref() {
            Some(request_uri) => Some(self.take_pushed_request(request_uri).await?),
            None => None,
        };
        let (challenge, method, redirect_uri, scope, client_id, state) = match pushed {
            Some(par) => (
                par.code_challenge,
                par.code_challenge_method,
                par.redirect_uri.or(request.redirect_uri),
                par.scope,
                par.client_id.or(request.client_id),
                par.state.or(request.state),
            ),
            None => {
                let (Some(challenge), Some(method)) =
                    (request.code_challenge, request.code_challenge_method)
                else {
                    return Err(AuthError::bad_request("PKCE parameters are required"));
                };
                (
                    challenge,
                    method.parse::<PkceMethod>()?,
                    request.redirect_uri,
                    request.scope,
                    request.client_id,
                    request.state,
                )
            }
        };

        let redirect_uri =
            redirect_uri.ok_or_else(|| AuthError::bad_request("redirect_uri is required"))?;
        let mut location = Url::parse(&redirect_uri)
            .map_err(|_| AuthError::bad_request("Invalid redirect_uri"))?;
        let user = self.resolve_user(user_id).await?;

        let code = self
            .codes
            .issue(&AuthorizationCode {
                code_challenge: challenge,
                code_challenge_method: method,
                user_id: user.id,
                scope: scope.unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
                redirect_uri: Some(redirect_uri),
                client_id,
            })
            .await?;

        {
            let mut query = location.query_pairs_mut();
            query.append_pair("code", &code);
            if let Some(state) = &state {
                query.append_pair("state", state);
            }
        }
        Ok(location.into())
    }

    async fn take_pushed_request(&self, request_uri: &str) -> AuthResult<ParRequest> {
        let pushed = self
            .par
            .take(request_uri)
            .await?
            .ok_or_else(|| AuthError::bad_request("Invalid or expired request_uri"))?;
        self.ledger
            .register(ReplayScope::ParRequest, request_uri, self.par.ttl())
            .await?;
        Ok(pushed)
    }

    /// Store a pushed authorization request.
    ///
    /// # Errors
    ///
    /// `BadRequest` if PKCE parameters are missing or unsupported.
    #[instrument(skip_all)]
    pub async fn pushed_authorization_request(
        &self,
        request: AuthorizeRequest,
    ) -> AuthResult<ParResponse> {
        let (Some(challenge), Some(method)) =
            (request.code_challenge, request.code_challenge_method)
        else {
            return Err(AuthError::bad_request(
                "PKCE parameters are required in PAR payload",
            ));
        };

        let request_uri = self
            .par
            .push(&ParRequest {
                code_challenge: challenge,
                code_challenge_method: method.parse()?,
                redirect_uri: request.redirect_uri,
                scope: request.scope,
                client_id: request.client_id,
                state: request.state,
            })
            .await?;
        Ok(ParResponse {
            request_uri,
            expires_in: self.par.ttl().as_secs(),
        })
    }

    /// Start a device authorization.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the store fails.
    #[instrument(skip_all)]
    pub async fn device_authorization(
        &self,
        request: DeviceAuthorizationRequest,
    ) -> AuthResult<DeviceAuthorizationResponse> {
        let record = self.devices.create(request.scope, request.client_id).await?;
        info!(user_code = %record.user_code, "Device authorization started");
        Ok(DeviceAuthorizationResponse {
            device_code: record.device_code,
            user_code: record.user_code,
            verification_uri: self.device_verification_uri.clone(),
            expires_in: self.devices.ttl().as_secs(),
            interval: self.device_poll_interval.as_secs(),
        })
    }

    /// Approve a pending device code on behalf of `user_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user or user code, `BadRequest` if already
    /// decided.
    pub async fn approve_device(&self, user_code: &str, user_id: &str) -> AuthResult<DeviceCode> {
        let user = self.resolve_user(user_id).await?;
        let record = self.devices.approve(user_code, &user.id).await?;
        info!(user_id = %user.id, "Device code approved");
        Ok(record)
    }

    /// Deny a pending device code.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user code, `BadRequest` if already decided.
    pub async fn deny_device(&self, user_code: &str) -> AuthResult<DeviceCode> {
        let record = self.devices.deny(user_code).await?;
        info!("Device code denied");
        Ok(record)
    }

    /// Register the proof's `jti`, open a session, then mint an access and
    /// refresh token bound to the proof's key. The session exists before
    /// any refresh record that names it.
    async fn issue_pair(
        &self,
        user: &User,
        proof: &VerifiedProof,
        scope: &str,
        client_id: Option<String>,
        device_id: Option<String>,
        grant_type: &str,
    ) -> AuthResult<TokenResponse> {
        self.ledger
            .register_dpop_proof(&user.tenant_id, &proof.jkt, &proof.jti, self.replay_ttl)
            .await?;

        let session_id = Uuid::new_v4().to_string();
        with_timeout(
            self.store_timeout,
            "sessions.register",
            self.sessions.register(&session_id, &user.id, &user.tenant_id),
        )
        .await?;

        let access_token = self
            .issuer
            .issue_access_token(user, &proof.jkt, scope, client_id.as_deref())
            .await?;
        let (refresh_token, record) = self
            .rotator
            .issue(
                user,
                &proof.jkt,
                RefreshLineage {
                    client_id,
                    device_id,
                    scope: Some(scope.to_string()),
                    session_id: Some(session_id),
                    ..RefreshLineage::default()
                },
            )
            .await?;

        info!(
            tenant_id = %user.tenant_id,
            family_id = %record.family_id,
            grant_type,
            "Issued token pair"
        );
        metrics::record_token_issued("access", grant_type);
        metrics::record_token_issued("refresh", grant_type);
        Ok(self.token_response(access_token, refresh_token, scope.to_string()))
    }

    fn token_response(&self, access_token: String, refresh_token: String, scope: String) -> TokenResponse {
        TokenResponse {
            access_token,
            refresh_token,
            token_type: "DPoP".to_string(),
            expires_in: self.issuer.access_ttl().as_secs(),
            scope: Some(scope),
        }
    }

    async fn resolve_user(&self, user_id: &str) -> AuthResult<User> {
        with_timeout(self.store_timeout, "users.find_by_id", self.users.find_by_id(user_id))
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))
    }
}
