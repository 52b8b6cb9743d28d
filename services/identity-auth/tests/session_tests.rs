//! Introspection, revocation, back-channel logout and key rollover.

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ClientKey, Harness, TENANT, USER};
use identity_auth::directory::{InMemorySessionRegistry, RegisteredClient, SessionRegistry};
use identity_auth::engine::BACKCHANNEL_LOGOUT_EVENT;
use identity_auth::keys::KeyStatus;
use identity_auth::refresh::{hash_token, RefreshTokenRepository};
use identity_auth::{AuthError, Config};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::decode_header;
use rust_common::PlatformError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const RP: &str = "rp";
const RP_SECRET: &str = "rp-secret";
const RP_KID: &str = "rp-key-1";

async fn register_rp(harness: &Harness, key: &ClientKey) {
    let mut jwk = key.public_jwk();
    jwk["kid"] = json!(RP_KID);
    jwk["alg"] = json!("ES256");
    jwk["use"] = json!("sig");
    let jwks: JwkSet = serde_json::from_value(json!({ "keys": [jwk] })).unwrap();
    harness
        .clients
        .insert(RegisteredClient::new(RP, RP_SECRET, jwks))
        .await;
}

fn logout_token(key: &ClientKey, kid: &str, claims: serde_json::Value) -> String {
    key.sign(&json!({"alg": "ES256", "typ": "logout+jwt", "kid": kid}), &claims)
}

fn logout_claims(sid: &str) -> serde_json::Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "iss": RP,
        "sid": sid,
        "iat": now,
        "exp": now + 120,
        "jti": uuid::Uuid::new_v4().to_string(),
        "events": { BACKCHANNEL_LOGOUT_EVENT: {} },
    })
}

async fn session_of(harness: &Harness, refresh_token: &str) -> String {
    harness
        .refresh_tokens
        .find_by_hash(&hash_token(refresh_token))
        .await
        .unwrap()
        .unwrap()
        .session_id
}

#[tokio::test]
async fn test_introspect_access_token() {
    let harness = Harness::new().await;
    let tokens = harness.login(&ClientKey::generate()).await;

    let response = harness.engine.introspect(&tokens.access_token).await.unwrap();
    assert!(response.active);
    assert_eq!(response.sub.as_deref(), Some(USER));
    assert_eq!(response.tenant_id.as_deref(), Some(TENANT));
    assert_eq!(response.token_type.as_deref(), Some("DPoP"));

    let response = harness.engine.introspect(&tokens.refresh_token).await.unwrap();
    assert!(response.active);
    assert_eq!(response.token_type.as_deref(), Some("refresh_token"));
}

#[tokio::test]
async fn test_introspect_garbage_is_inactive() {
    let harness = Harness::new().await;
    for token in ["", "not-a-jwt", "a.b.c"] {
        let response = harness.engine.introspect(token).await.unwrap();
        assert_eq!(response, identity_auth::engine::IntrospectionResponse::inactive());
    }
}

#[tokio::test]
async fn test_client_authentication() {
    let harness = Harness::new().await;
    register_rp(&harness, &ClientKey::generate()).await;

    assert!(harness.engine.authenticate_client(RP, RP_SECRET).await.is_ok());
    for (id, secret) in [(RP, "wrong"), ("nobody", RP_SECRET)] {
        let err = harness.engine.authenticate_client(id, secret).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }
}

#[tokio::test]
async fn test_revoke_is_idempotent() {
    let harness = Harness::new().await;
    let key = ClientKey::generate();
    let tokens = harness.login(&key).await;

    harness
        .engine
        .revoke(&tokens.refresh_token, Some("refresh_token"))
        .await
        .unwrap();
    harness
        .engine
        .revoke(&tokens.refresh_token, Some("refresh_token"))
        .await
        .unwrap();
    harness.engine.revoke("never-issued", None).await.unwrap();

    let err = harness
        .refresh(&key, &tokens.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
}

#[tokio::test]
async fn test_access_token_hint_leaves_refresh_token() {
    let harness = Harness::new().await;
    let key = ClientKey::generate();
    let tokens = harness.login(&key).await;

    harness
        .engine
        .revoke(&tokens.refresh_token, Some("access_token"))
        .await
        .unwrap();
    assert!(harness.refresh(&key, &tokens.refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_backchannel_logout_revokes_session() {
    let harness = Harness::new().await;
    let rp_key = ClientKey::generate();
    register_rp(&harness, &rp_key).await;

    let key = ClientKey::generate();
    let tokens = harness.login(&key).await;
    let other = harness.login(&key).await;
    let sid = session_of(&harness, &tokens.refresh_token).await;

    harness
        .engine
        .backchannel_logout(&logout_token(&rp_key, RP_KID, logout_claims(&sid)))
        .await;

    let err = harness
        .refresh(&key, &tokens.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));

    let record = harness
        .refresh_tokens
        .find_by_hash(&hash_token(&tokens.refresh_token))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.revoked_reason.as_deref(), Some("logout"));

    // Another session's refresh token is not revoked by this logout.
    let other_record = harness
        .refresh_tokens
        .find_by_hash(&hash_token(&other.refresh_token))
        .await
        .unwrap()
        .unwrap();
    assert!(!other_record.revoked);
}

#[tokio::test]
async fn test_backchannel_logout_ignores_bad_tokens() {
    let harness = Harness::new().await;
    let rp_key = ClientKey::generate();
    register_rp(&harness, &rp_key).await;

    let key = ClientKey::generate();
    let tokens = harness.login(&key).await;
    let sid = session_of(&harness, &tokens.refresh_token).await;

    let mut no_event = logout_claims(&sid);
    no_event["events"] = json!({});
    let mut no_sid = logout_claims(&sid);
    no_sid.as_object_mut().unwrap().remove("sid");
    let mut wrong_issuer = logout_claims(&sid);
    wrong_issuer["iss"] = json!("someone-else");

    let attempts = [
        "garbage".to_string(),
        logout_token(&rp_key, RP_KID, no_event),
        logout_token(&rp_key, RP_KID, no_sid),
        logout_token(&rp_key, RP_KID, wrong_issuer),
        logout_token(&rp_key, "unknown-kid", logout_claims(&sid)),
        // Signed by a key the client never registered.
        logout_token(&ClientKey::generate(), RP_KID, logout_claims(&sid)),
    ];
    for token in &attempts {
        harness.engine.backchannel_logout(token).await;
    }

    let record = harness
        .refresh_tokens
        .find_by_hash(&hash_token(&tokens.refresh_token))
        .await
        .unwrap()
        .unwrap();
    assert!(!record.revoked);
    assert!(harness.refresh(&key, &tokens.refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_rotation_keeps_old_tokens_verifiable() {
    let harness = Harness::new().await;
    let tokens = harness.login(&ClientKey::generate()).await;
    let old_kid = decode_header(&tokens.access_token).unwrap().kid.unwrap();

    let new_key = harness.engine.keys().rotate(TENANT).await.unwrap();
    let jwks = harness.engine.jwks(TENANT).await.unwrap();
    assert_eq!(jwks.keys.len(), 2);
    assert!(jwks.find(&old_kid).is_some());
    assert!(jwks.find(&new_key.kid).is_some());

    let claims = harness
        .engine
        .issuer()
        .verify_access_token(&tokens.access_token)
        .await
        .unwrap();
    assert_eq!(claims.sub, USER);

    // New tokens are signed with the new key.
    let fresh = harness.login(&ClientKey::generate()).await;
    assert_eq!(
        decode_header(&fresh.access_token).unwrap().kid.as_deref(),
        Some(new_key.kid.as_str())
    );

    let old = harness.engine.keys().find_by_kid(&old_kid).await.unwrap().unwrap();
    assert_eq!(old.status, KeyStatus::RolledOver);
}

#[tokio::test]
async fn test_expired_keys_are_unpublished() {
    let harness = Harness::new().await;
    let tokens = harness.login(&ClientKey::generate()).await;
    let old_kid = decode_header(&tokens.access_token).unwrap().kid.unwrap();
    harness.engine.keys().rotate(TENANT).await.unwrap();

    let later = chrono::Utc::now() + chrono::Duration::days(8);
    let report = harness.engine.keys().run_rotation_cycle(later).await.unwrap();
    assert_eq!(report.expired, 1);

    let jwks = harness.engine.jwks(TENANT).await.unwrap();
    assert_eq!(jwks.keys.len(), 1);
    assert!(jwks.find(&old_kid).is_none());
}

#[tokio::test]
async fn test_discovery_document() {
    let harness = Harness::new().await;
    let doc = harness.engine.discovery_document(TENANT);

    assert_eq!(doc.issuer, "https://auth.example.com/t/acme");
    assert_eq!(doc.token_endpoint, "https://auth.example.com/oauth/token");
    assert!(doc.jwks_uri.ends_with("tenant_id=acme"));
    assert!(doc.code_challenge_methods_supported.contains(&"S256".to_string()));
    assert!(doc.backchannel_logout_supported);
}

/// Registers sessions, but watermark reads and revocations never complete.
#[derive(Default)]
struct StalledSessions(InMemorySessionRegistry);

#[async_trait]
impl SessionRegistry for StalledSessions {
    async fn register(&self, sid: &str, user_id: &str, tenant_id: &str) -> Result<(), PlatformError> {
        self.0.register(sid, user_id, tenant_id).await
    }

    async fn revoke_session(&self, _sid: &str) -> Result<bool, PlatformError> {
        std::future::pending().await
    }

    async fn not_before(
        &self,
        _user_id: &str,
        _tenant_id: &str,
    ) -> Result<Option<DateTime<Utc>>, PlatformError> {
        std::future::pending().await
    }
}

/// Session store that is down.
struct UnavailableSessions;

#[async_trait]
impl SessionRegistry for UnavailableSessions {
    async fn register(&self, _sid: &str, _user_id: &str, _tenant_id: &str) -> Result<(), PlatformError> {
        Err(PlatformError::unavailable("session store offline"))
    }

    async fn revoke_session(&self, _sid: &str) -> Result<bool, PlatformError> {
        Err(PlatformError::unavailable("session store offline"))
    }

    async fn not_before(
        &self,
        _user_id: &str,
        _tenant_id: &str,
    ) -> Result<Option<DateTime<Utc>>, PlatformError> {
        Err(PlatformError::unavailable("session store offline"))
    }
}

fn timed_out<T>(result: &Result<T, AuthError>) -> bool {
    matches!(result, Err(AuthError::Platform(PlatformError::Timeout { .. })))
}

#[tokio::test]
async fn test_stalled_session_store_is_bounded() {
    let config = Config {
        store_timeout: Duration::from_millis(50),
        ..Config::default()
    };
    let harness = Harness::with_sessions(config, Arc::new(StalledSessions::default())).await;
    let rp_key = ClientKey::generate();
    register_rp(&harness, &rp_key).await;
    let key = ClientKey::generate();
    let tokens = harness.login(&key).await;
    let sid = session_of(&harness, &tokens.refresh_token).await;
    let limit = Duration::from_secs(2);

    let introspected = tokio::time::timeout(limit, harness.engine.introspect(&tokens.access_token))
        .await
        .expect("introspection outlived the store timeout");
    assert!(timed_out(&introspected));

    let refreshed = tokio::time::timeout(limit, harness.refresh(&key, &tokens.refresh_token))
        .await
        .expect("refresh outlived the store timeout");
    assert!(timed_out(&refreshed));

    let logout = logout_token(&rp_key, RP_KID, logout_claims(&sid));
    tokio::time::timeout(limit, harness.engine.backchannel_logout(&logout))
        .await
        .expect("logout outlived the store timeout");
}

#[tokio::test]
async fn test_failed_session_registration_stores_no_refresh_token() {
    let harness = Harness::with_sessions(Config::default(), Arc::new(UnavailableSessions)).await;
    let code = harness.authorization_code().await;

    let err = harness
        .exchange_code(&ClientKey::generate(), &code)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Platform(PlatformError::Unavailable(_))));
    assert_eq!(harness.refresh_tokens.len().await, 0);
}

#[tokio::test]
async fn test_logout_deactivates_tokens_from_the_same_second() {
    let harness = Harness::new().await;
    let rp_key = ClientKey::generate();
    register_rp(&harness, &rp_key).await;
    let tokens = harness.login(&ClientKey::generate()).await;
    let sid = session_of(&harness, &tokens.refresh_token).await;

    harness
        .engine
        .backchannel_logout(&logout_token(&rp_key, RP_KID, logout_claims(&sid)))
        .await;

    let response = harness.engine.introspect(&tokens.access_token).await.unwrap();
    assert!(!response.active);
}
