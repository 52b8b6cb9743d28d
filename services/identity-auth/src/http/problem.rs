//! RFC 7807 responses.

use crate::error::AuthError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

const PROBLEM_JSON: &str = "application/problem+json";

/// An [`AuthError`] raised while serving `instance`.
#[derive(Debug)]
pub struct ApiError {
    error: AuthError,
    instance: String,
}

impl ApiError {
    /// Attach the request path to an error.
    #[must_use]
    pub fn new(error: AuthError, instance: impl Into<String>) -> Self {
        Self {
            error,
            instance: instance.into(),
        }
    }

    /// Adapter for `map_err`.
    pub fn at(instance: &str) -> impl FnOnce(AuthError) -> Self + '_ {
        move |error| Self::new(error, instance)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.error.is_server_error() {
            error!(instance = %self.instance, error = %self.error, "Request failed");
        }

        let problem = self.error.problem(&self.instance);
        let status =
            StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(problem)).into_response();

        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_JSON));
        if self.error.oauth_code() == Some("invalid_dpop_proof") {
            headers.insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("DPoP error=\"invalid_dpop_proof\""),
            );
        }
        response
    }
}
