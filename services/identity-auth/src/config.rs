//! Centralized configuration for the identity auth service.
//!
//! All configuration is loaded from environment variables (optionally via a
//! `.env` file) and validated at startup.

use crate::error::AuthError;
use std::env;
use std::time::Duration;

/// Backing store for ephemeral security state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local map. Single-instance deployments only.
    Memory,
    /// Shared Redis instance.
    Redis {
        /// Connection URL
        url: String,
    },
}

/// Identity auth service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // Server settings
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public base URL; tenant issuers are `{base}/t/{tenant_id}`
    pub issuer_base_url: String,
    /// Upper bound for handling one HTTP request
    pub request_timeout: Duration,

    // Token lifetimes
    /// Access token TTL
    pub access_token_ttl: Duration,
    /// Refresh token TTL
    pub refresh_token_ttl: Duration,
    /// Authorization code TTL
    pub auth_code_ttl: Duration,
    /// Pushed authorization request TTL
    pub par_ttl: Duration,

    // Device flow
    /// Device code TTL
    pub device_code_ttl: Duration,
    /// Minimum polling interval returned to devices
    pub device_poll_interval: Duration,
    /// Where users enter their user code
    pub device_verification_uri: String,

    // DPoP settings
    /// Maximum allowed |now - iat| for a DPoP proof
    pub dpop_max_skew: Duration,
    /// How long a seen proof is remembered; never below twice the skew
    pub dpop_replay_ttl: Duration,

    // Signing keys
    /// Age after which an ACTIVE key is rotated
    pub key_rotation_age: Duration,
    /// Time a ROLLED_OVER key stays published before it expires
    pub key_expiry_grace: Duration,
    /// How often the rotation cycle runs
    pub key_rotation_check_interval: Duration,

    // Storage
    /// Ephemeral store backend
    pub store_backend: StoreBackend,
    /// Upper bound for any store call
    pub store_timeout: Duration,

    // Observability
    /// Default log filter
    pub log_level: String,
    /// JSON log output
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        let issuer_base_url = "https://auth.example.com".to_string();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            device_verification_uri: format!("{issuer_base_url}/device"),
            issuer_base_url,
            request_timeout: Duration::from_secs(10),
            access_token_ttl: Duration::from_secs(900),
            refresh_token_ttl: Duration::from_secs(30 * 24 * 3600),
            auth_code_ttl: Duration::from_secs(600),
            par_ttl: Duration::from_secs(60),
            device_code_ttl: Duration::from_secs(1800),
            device_poll_interval: Duration::from_secs(5),
            dpop_max_skew: Duration::from_secs(300),
            dpop_replay_ttl: Duration::from_secs(600),
            key_rotation_age: Duration::from_secs(90 * 24 * 3600),
            key_expiry_grace: Duration::from_secs(7 * 24 * 3600),
            key_rotation_check_interval: Duration::from_secs(3600),
            store_backend: StoreBackend::Memory,
            store_timeout: Duration::from_millis(2000),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let host = env::var("HOST").unwrap_or(defaults.host);
        let port = parse_env("PORT", defaults.port)?;
        let issuer_base_url = env::var("ISSUER_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.issuer_base_url);
        url::Url::parse(&issuer_base_url)
            .map_err(|e| AuthError::config(format!("Invalid ISSUER_BASE_URL: {e}")))?;
        let request_timeout = Duration::from_millis(parse_env("REQUEST_TIMEOUT_MS", 10_000)?);

        let access_token_ttl = Duration::from_secs(parse_env("ACCESS_TOKEN_TTL", 900)?);
        let refresh_token_ttl = Duration::from_secs(parse_env("REFRESH_TOKEN_TTL", 2_592_000)?);
        let auth_code_ttl = Duration::from_secs(parse_env("AUTH_CODE_TTL", 600)?);
        let par_ttl = Duration::from_secs(parse_env("PAR_TTL", 60)?);

        let device_code_ttl = Duration::from_secs(parse_env("DEVICE_CODE_TTL", 1800)?);
        let device_poll_interval = Duration::from_secs(parse_env("DEVICE_POLL_INTERVAL", 5)?);
        let device_verification_uri = env::var("DEVICE_VERIFICATION_URI")
            .unwrap_or_else(|_| format!("{issuer_base_url}/device"));

        let dpop_max_skew = Duration::from_secs(parse_env("DPOP_IAT_MAX_SKEW_SECONDS", 300)?);
        let dpop_replay_ttl = replay_ttl(
            Duration::from_secs(parse_env("DPOP_REPLAY_TTL_SECONDS", 600)?),
            dpop_max_skew,
        );

        let key_rotation_age =
            Duration::from_secs(parse_env::<u64>("KEY_ROTATION_AGE_DAYS", 90)? * 24 * 3600);
        let key_expiry_grace =
            Duration::from_secs(parse_env::<u64>("KEY_EXPIRY_GRACE_DAYS", 7)? * 24 * 3600);
        let key_rotation_check_interval =
            Duration::from_secs(parse_env("KEY_ROTATION_CHECK_INTERVAL", 3600)?);

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StoreBackend::Memory,
            "redis" => StoreBackend::Redis {
                url: env::var("REDIS_URL")
                    .map_err(|_| AuthError::config("REDIS_URL is required when STORE_BACKEND=redis"))?,
            },
            other => {
                return Err(AuthError::config(format!("Invalid STORE_BACKEND: {other}")));
            }
        };
        let store_timeout = Duration::from_millis(parse_env("STORE_TIMEOUT_MS", 2000)?);

        let log_level = env::var("LOG_LEVEL").unwrap_or(defaults.log_level);
        let log_json = parse_env("LOG_JSON", false)?;

        let config = Self {
            host,
            port,
            issuer_base_url,
            request_timeout,
            access_token_ttl,
            refresh_token_ttl,
            auth_code_ttl,
            par_ttl,
            device_code_ttl,
            device_poll_interval,
            device_verification_uri,
            dpop_max_skew,
            dpop_replay_ttl,
            key_rotation_age,
            key_expiry_grace,
            key_rotation_check_interval,
            store_backend,
            store_timeout,
            log_level,
            log_json,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject zero lifetimes, which would make every artifact dead on arrival.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first zero-valued lifetime.
    pub fn validate(&self) -> Result<(), AuthError> {
        let lifetimes = [
            ("ACCESS_TOKEN_TTL", self.access_token_ttl),
            ("REFRESH_TOKEN_TTL", self.refresh_token_ttl),
            ("AUTH_CODE_TTL", self.auth_code_ttl),
            ("PAR_TTL", self.par_ttl),
            ("DEVICE_CODE_TTL", self.device_code_ttl),
            ("DPOP_REPLAY_TTL_SECONDS", self.dpop_replay_ttl),
            ("STORE_TIMEOUT_MS", self.store_timeout),
            ("REQUEST_TIMEOUT_MS", self.request_timeout),
        ];
        for (name, value) in lifetimes {
            if value.is_zero() {
                return Err(AuthError::config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    /// Issuer URL for a tenant.
    #[must_use]
    pub fn issuer_for(&self, tenant_id: &str) -> String {
        format!("{}/t/{}", self.issuer_base_url, tenant_id)
    }

    /// Server bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A proof must be remembered at least as long as it could be accepted.
fn replay_ttl(configured: Duration, skew: Duration) -> Duration {
    configured.max(skew * 2)
}

/// Parse environment variable with default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AuthError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| AuthError::config(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}
