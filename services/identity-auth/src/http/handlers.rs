use super::{ApiError, AppState, AUTHENTICATED_USER_HEADER};
use crate::engine::{
    AuthorizeRequest, DeviceAuthorizationRequest, DeviceVerification, DpopContext,
    IntrospectionRequest, LogoutRequest, RevocationRequest, TokenRequest,
};
use crate::error::AuthError;
use crate::jwks::JwksPublisher;
use crate::metrics as service_metrics;
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Redirect};
use axum::{Form, Json};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub(super) struct TenantQuery {
    tenant_id: Option<String>,
}

impl TenantQuery {
    fn require(self) -> Result<String, AuthError> {
        self.tenant_id
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::bad_request("tenant_id is required"))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `POST /oauth/token`. An unparseable form is treated as empty so the DPoP
/// check still runs first.
pub(super) async fn token(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, axum::extract::rejection::FormRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = form.map(|Form(f)| f).unwrap_or_default();
    let url = state.engine.request_url(uri.path());
    let dpop = DpopContext {
        proof: header_str(&headers, "dpop"),
        method: "POST",
        url: &url,
    };

    let response = state
        .engine
        .token(request, dpop)
        .await
        .map_err(ApiError::at(uri.path()))?;
    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(response),
    ))
}

/// `GET /authorize`
pub(super) async fn authorize(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Query(request): Query<AuthorizeRequest>,
) -> Result<Redirect, ApiError> {
    let location = state
        .engine
        .authorize(request, header_str(&headers, AUTHENTICATED_USER_HEADER))
        .await
        .map_err(ApiError::at(uri.path()))?;
    Ok(Redirect::to(&location))
}

/// `POST /oauth/par`, form or JSON.
pub(super) async fn par(
    State(state): State<AppState>,
    request: Request,
) -> Result<impl IntoResponse, ApiError> {
    let path = request.uri().path().to_string();
    let is_json = header_str(request.headers(), header::CONTENT_TYPE.as_str())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let payload = if is_json {
        Json::<AuthorizeRequest>::from_request(request, &state)
            .await
            .map(|Json(p)| p)
            .map_err(|e| AuthError::bad_request(e.body_text()))
    } else {
        Form::<AuthorizeRequest>::from_request(request, &state)
            .await
            .map(|Form(p)| p)
            .map_err(|e| AuthError::bad_request(e.body_text()))
    }
    .map_err(ApiError::at(&path))?;

    let response = state
        .engine
        .pushed_authorization_request(payload)
        .await
        .map_err(ApiError::at(&path))?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// `POST /oauth/device_authorization`
pub(super) async fn device_authorization(
    State(state): State<AppState>,
    uri: Uri,
    form: Option<Form<DeviceAuthorizationRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = form.map(|Form(f)| f).unwrap_or_default();
    let response = state
        .engine
        .device_authorization(request)
        .await
        .map_err(ApiError::at(uri.path()))?;
    Ok(Json(response))
}

/// `POST /oauth/device/verify`
pub(super) async fn device_verify(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Json(decision): Json<DeviceVerification>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = header_str(&headers, AUTHENTICATED_USER_HEADER)
        .ok_or_else(|| AuthError::unauthorized("Authentication required"))
        .map_err(ApiError::at(uri.path()))?;

    let record = if decision.approve {
        state.engine.approve_device(&decision.user_code, user_id).await
    } else {
        state.engine.deny_device(&decision.user_code).await
    }
    .map_err(ApiError::at(uri.path()))?;
    Ok(Json(json!({ "status": record.status })))
}

/// `POST /oauth/revoke`. Always `{}` for any token.
pub(super) async fn revoke(
    State(state): State<AppState>,
    uri: Uri,
    form: Option<Form<RevocationRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = form.map(|Form(f)| f).unwrap_or_default();
    state
        .engine
        .revoke(
            request.token.as_deref().unwrap_or_default(),
            request.token_type_hint.as_deref(),
        )
        .await
        .map_err(ApiError::at(uri.path()))?;
    Ok(Json(json!({})))
}

/// `POST /oauth/introspect`, HTTP Basic client authentication.
pub(super) async fn introspect(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    form: Option<Form<IntrospectionRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let (client_id, secret) = basic_credentials(&headers)
        .ok_or_else(|| AuthError::unauthorized("Invalid client credentials"))
        .map_err(ApiError::at(uri.path()))?;
    state
        .engine
        .authenticate_client(&client_id, &secret)
        .await
        .map_err(ApiError::at(uri.path()))?;

    let token = form.and_then(|Form(f)| f.token).unwrap_or_default();
    let response = state
        .engine
        .introspect(&token)
        .await
        .map_err(ApiError::at(uri.path()))?;
    Ok(Json(response))
}

/// `GET /.well-known/jwks.json?tenant_id=`
pub(super) async fn jwks(
    State(state): State<AppState>,
    uri: Uri,
    Query(query): Query<TenantQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = query.require().map_err(ApiError::at(uri.path()))?;
    let jwks = state
        .engine
        .jwks(&tenant_id)
        .await
        .map_err(ApiError::at(uri.path()))?;
    Ok(([(header::CACHE_CONTROL, JwksPublisher::CACHE_CONTROL)], Json(jwks)))
}

/// `GET /.well-known/openid-configuration?tenant_id=`
pub(super) async fn discovery(
    State(state): State<AppState>,
    uri: Uri,
    Query(query): Query<TenantQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = query.require().map_err(ApiError::at(uri.path()))?;
    Ok(Json(state.engine.discovery_document(&tenant_id)))
}

/// `POST /backchannel-logout`. Always 200.
pub(super) async fn backchannel_logout(
    State(state): State<AppState>,
    form: Option<Form<LogoutRequest>>,
) -> StatusCode {
    match form.and_then(|Form(f)| f.logout_token) {
        Some(token) => state.engine.backchannel_logout(&token).await,
        None => warn!("Back-channel logout without logout_token"),
    }
    StatusCode::OK
}

/// `GET /health`
pub(super) async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `GET /metrics`
pub(super) async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        service_metrics::render(),
    )
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let encoded = header_str(headers, header::AUTHORIZATION.as_str())?.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}
