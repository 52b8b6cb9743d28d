//! Router-level tests: status codes, problem documents and headers.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{ClientKey, Harness, CHALLENGE, REDIRECT_URI, USER};
use http_body_util::BodyExt;
use identity_auth::http::{router, AUTHENTICATED_USER_HEADER};
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

const FORM: &str = "application/x-www-form-urlencoded";

async fn app() -> (Harness, Router) {
    let harness = Harness::new().await;
    let app = router(harness.engine.clone(), Duration::from_secs(5));
    (harness, app)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn form_post(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, FORM)
}

#[tokio::test]
async fn test_wrong_htm_is_problem_with_dpop_challenge() {
    let (harness, app) = app().await;
    let proof = ClientKey::generate().proof("GET", &harness.token_url());

    let response = app
        .oneshot(
            form_post("/oauth/token")
                .header("DPoP", proof)
                .body(Body::from("grant_type=authorization_code&code=x&code_verifier=y"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/problem+json"
    );
    assert!(response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .is_some_and(|v| v.to_str().unwrap().starts_with("DPoP")));

    let problem = json_body(response).await;
    assert_eq!(problem["status"], 401);
    assert_eq!(problem["detail"], "Invalid DPoP htm claim");
    assert_eq!(problem["instance"], "/oauth/token");
    assert_eq!(problem["error"], "invalid_dpop_proof");
}

#[tokio::test]
async fn test_token_without_proof_is_unauthorized_even_for_bad_grant() {
    let (_, app) = app().await;
    let response = app
        .oneshot(
            form_post("/oauth/token")
                .body(Body::from("grant_type=password"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_authorize_then_token() {
    let (harness, app) = app().await;
    let key = ClientKey::generate();

    let uri = format!(
        "/authorize?redirect_uri={}&code_challenge={CHALLENGE}&code_challenge_method=S256&state=s1",
        urlencode(REDIRECT_URI)
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(AUTHENTICATED_USER_HEADER, USER)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    let code = common::code_from(&location);

    let body = format!(
        "grant_type=authorization_code&code={code}&code_verifier={}&redirect_uri={}",
        common::VERIFIER,
        urlencode(REDIRECT_URI)
    );
    let response = app
        .oneshot(
            form_post("/oauth/token")
                .header("DPoP", key.proof("POST", &harness.token_url()))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let tokens = json_body(response).await;
    assert_eq!(tokens["token_type"], "DPoP");
    assert!(tokens["access_token"].is_string());
    assert!(tokens["refresh_token"].is_string());
}

#[tokio::test]
async fn test_authorize_without_user_is_unauthorized() {
    let (_, app) = app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/authorize?code_challenge=abc&code_challenge_method=S256")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_par_accepts_json_and_form() {
    let (_, app) = app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/par")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(format!(
                    r#"{{"code_challenge":"{CHALLENGE}","code_challenge_method":"S256"}}"#
                )))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert!(body["request_uri"]
        .as_str()
        .unwrap()
        .starts_with("urn:ietf:params:oauth:request_uri:"));

    let response = app
        .oneshot(
            form_post("/oauth/par")
                .body(Body::from(format!(
                    "code_challenge={CHALLENGE}&code_challenge_method=S256"
                )))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_par_without_pkce_is_bad_request() {
    let (_, app) = app().await;
    let response = app
        .oneshot(
            form_post("/oauth/par")
                .body(Body::from("scope=openid"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pending_device_code_is_authorization_pending() {
    let (harness, app) = app().await;
    let response = app
        .clone()
        .oneshot(
            form_post("/oauth/device_authorization")
                .body(Body::from("scope=openid"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let device_code = json_body(response).await["device_code"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(
            form_post("/oauth/token")
                .header(
                    "DPoP",
                    ClientKey::generate().proof("POST", &harness.token_url()),
                )
                .body(Body::from(format!(
                    "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code&device_code={device_code}"
                )))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "authorization_pending");
}

#[tokio::test]
async fn test_revoke_always_returns_empty_object() {
    let (_, app) = app().await;
    for body in ["token=unknown&token_type_hint=refresh_token", "", "token_type_hint=access_token"] {
        let response = app
            .clone()
            .oneshot(
                form_post("/oauth/revoke")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({}));
    }
}

#[tokio::test]
async fn test_introspect_requires_client_credentials() {
    let (_, app) = app().await;
    let response = app
        .oneshot(
            form_post("/oauth/introspect")
                .body(Body::from("token=abc"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_jwks_requires_tenant_and_is_cacheable() {
    let (_, app) = app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/.well-known/jwks.json").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/.well-known/jwks.json?tenant_id=acme")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=300");
    assert!(json_body(response).await["keys"].is_array());
}

#[tokio::test]
async fn test_backchannel_logout_always_ok() {
    let (_, app) = app().await;
    for body in ["logout_token=garbage", ""] {
        let response = app
            .clone()
            .oneshot(
                form_post("/backchannel-logout")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_health_and_discovery() {
    let (_, app) = app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/.well-known/openid-configuration?tenant_id=acme")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["issuer"],
        "https://auth.example.com/t/acme"
    );
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
