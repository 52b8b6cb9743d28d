//! Shared fixtures: a P-256 client key that signs DPoP proofs, and an
//! engine wired to in-memory collaborators.

#![allow(dead_code)]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use identity_auth::directory::{
    InMemoryClientRegistry, InMemorySessionRegistry, InMemoryUserDirectory, SessionRegistry, User,
};
use identity_auth::dpop::{Jwk, JwkThumbprint};
use identity_auth::engine::{AuthorizeRequest, DpopContext, TokenRequest, TokenResponse};
use identity_auth::keys::InMemoryKeyRepository;
use identity_auth::refresh::{InMemoryRefreshTokenRepository, RefreshTokenRepository};
use identity_auth::{AuthResult, AuthorizationEngine, Collaborators, Config};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use rust_common::MemoryStore;
use serde_json::{json, Value};
use std::sync::Arc;

pub const TENANT: &str = "acme";
pub const USER: &str = "user-1";
pub const REDIRECT_URI: &str = "https://rp.example.com/cb";
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGMSstw-cM";

/// An EC P-256 key pair held by a client.
pub struct ClientKey {
    pub pkcs8: Vec<u8>,
    pair: EcdsaKeyPair,
    rng: SystemRandom,
}

impl ClientKey {
    pub fn generate() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .unwrap()
            .as_ref()
            .to_vec();
        let pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &pkcs8, &rng).unwrap();
        Self { pkcs8, pair, rng }
    }

    pub fn public_jwk(&self) -> Value {
        let point = self.pair.public_key().as_ref();
        json!({
            "kty": "EC",
            "crv": "P-256",
            "x": URL_SAFE_NO_PAD.encode(&point[1..33]),
            "y": URL_SAFE_NO_PAD.encode(&point[33..65]),
        })
    }

    pub fn jkt(&self) -> String {
        let jwk: Jwk = serde_json::from_value(self.public_jwk()).unwrap();
        JwkThumbprint::compute(&jwk).unwrap()
    }

    /// Compact ES256 JWS over arbitrary header and claims.
    pub fn sign(&self, header: &Value, claims: &Value) -> String {
        let input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );
        let sig = self.pair.sign(&self.rng, input.as_bytes()).unwrap();
        format!("{input}.{}", URL_SAFE_NO_PAD.encode(sig.as_ref()))
    }

    pub fn proof_at(&self, htm: &str, htu: &str, iat: i64) -> String {
        let header = json!({"typ": "dpop+jwt", "alg": "ES256", "jwk": self.public_jwk()});
        let claims = json!({
            "jti": uuid::Uuid::new_v4().to_string(),
            "htm": htm,
            "htu": htu,
            "iat": iat,
        });
        self.sign(&header, &claims)
    }

    pub fn proof(&self, htm: &str, htu: &str) -> String {
        self.proof_at(htm, htu, chrono::Utc::now().timestamp())
    }
}

/// Engine plus handles on the in-memory collaborators behind it.
pub struct Harness {
    pub config: Config,
    pub engine: Arc<AuthorizationEngine>,
    pub clients: Arc<InMemoryClientRegistry>,
    pub refresh_tokens: Arc<InMemoryRefreshTokenRepository>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_sessions(Config::default(), Arc::new(InMemorySessionRegistry::new())).await
    }

    pub async fn with_sessions(config: Config, sessions: Arc<dyn SessionRegistry>) -> Self {
        let refresh_tokens = Arc::new(InMemoryRefreshTokenRepository::new());
        Self::with_collaborators(config, sessions, refresh_tokens.clone(), refresh_tokens).await
    }

    /// `store` backs the engine; `refresh_tokens` is the in-memory
    /// repository underneath it that tests inspect.
    pub async fn with_collaborators(
        config: Config,
        sessions: Arc<dyn SessionRegistry>,
        refresh_tokens: Arc<InMemoryRefreshTokenRepository>,
        store: Arc<dyn RefreshTokenRepository>,
    ) -> Self {
        let users = Arc::new(InMemoryUserDirectory::new());
        users.insert(User::new(USER, TENANT)).await;
        let clients = Arc::new(InMemoryClientRegistry::new());

        let engine = AuthorizationEngine::new(
            &config,
            Arc::new(MemoryStore::single_instance()),
            Collaborators {
                users,
                clients: clients.clone(),
                sessions,
                keys: Arc::new(InMemoryKeyRepository::new()),
                refresh_tokens: store,
            },
        )
        .unwrap();

        Self {
            config,
            engine: Arc::new(engine),
            clients,
            refresh_tokens,
        }
    }

    pub fn token_url(&self) -> String {
        self.engine.request_url("/oauth/token")
    }

    /// Run `/authorize` for [`USER`] and return the issued code.
    pub async fn authorization_code(&self) -> String {
        let location = self
            .engine
            .authorize(
                AuthorizeRequest {
                    redirect_uri: Some(REDIRECT_URI.to_string()),
                    code_challenge: Some(CHALLENGE.to_string()),
                    code_challenge_method: Some("S256".to_string()),
                    ..AuthorizeRequest::default()
                },
                Some(USER),
            )
            .await
            .unwrap();
        code_from(&location)
    }

    pub async fn exchange_code(&self, key: &ClientKey, code: &str) -> AuthResult<TokenResponse> {
        let url = self.token_url();
        let proof = key.proof("POST", &url);
        self.engine
            .token(
                TokenRequest {
                    grant_type: Some("authorization_code".to_string()),
                    code: Some(code.to_string()),
                    code_verifier: Some(VERIFIER.to_string()),
                    redirect_uri: Some(REDIRECT_URI.to_string()),
                    ..TokenRequest::default()
                },
                DpopContext {
                    proof: Some(&proof),
                    method: "POST",
                    url: &url,
                },
            )
            .await
    }

    /// Full authorization code flow for a fresh code.
    pub async fn login(&self, key: &ClientKey) -> TokenResponse {
        let code = self.authorization_code().await;
        self.exchange_code(key, &code).await.unwrap()
    }

    pub async fn refresh(&self, key: &ClientKey, refresh_token: &str) -> AuthResult<TokenResponse> {
        let url = self.token_url();
        let proof = key.proof("POST", &url);
        self.engine
            .token(
                TokenRequest {
                    grant_type: Some("refresh_token".to_string()),
                    refresh_token: Some(refresh_token.to_string()),
                    ..TokenRequest::default()
                },
                DpopContext {
                    proof: Some(&proof),
                    method: "POST",
                    url: &url,
                },
            )
            .await
    }
}

/// The `code` query parameter of a redirect location.
pub fn code_from(location: &str) -> String {
    url::Url::parse(location)
        .unwrap()
        .query_pairs()
        .find(|(name, _)| name == "code")
        .map(|(_, value)| value.into_owned())
        .unwrap()
}
