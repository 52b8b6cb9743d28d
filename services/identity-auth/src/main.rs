//! Identity auth service entry point.

use anyhow::Context;
use identity_auth::config::{Config, StoreBackend};
use identity_auth::directory::{
    InMemoryClientRegistry, InMemorySessionRegistry, InMemoryUserDirectory,
};
use identity_auth::keys::InMemoryKeyRepository;
use identity_auth::refresh::InMemoryRefreshTokenRepository;
use identity_auth::shutdown::{wait_for_signal, ShutdownCoordinator};
use identity_auth::{http, AuthorizationEngine, Collaborators};
use rust_common::{init_tracing, KeyValueStore, MemoryStore, RedisStore, TracingConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    init_tracing(
        &TracingConfig::default()
            .with_service_name("identity-auth")
            .with_log_level(&config.log_level)
            .with_json_output(config.log_json),
    )?;
    info!("Starting Identity Auth Service");

    let mut background = ShutdownCoordinator::new();

    let store: Arc<dyn KeyValueStore> = match &config.store_backend {
        StoreBackend::Memory => {
            let memory = Arc::new(MemoryStore::single_instance());
            let sweeper = Arc::clone(&memory);
            background.spawn("store-purge", async move {
                let mut ticker = tokio::time::interval(PURGE_INTERVAL);
                loop {
                    ticker.tick().await;
                    let purged = sweeper.purge_expired().await;
                    if purged > 0 {
                        info!(purged, "Purged expired store entries");
                    }
                }
            });
            memory
        }
        StoreBackend::Redis { url } => Arc::new(
            RedisStore::connect(url)
                .await
                .context("Failed to connect to Redis")?,
        ),
    };

    // Durable repositories and directories are external collaborators; the
    // in-memory versions keep the binary self-contained.
    let collaborators = Collaborators {
        users: Arc::new(InMemoryUserDirectory::new()),
        clients: Arc::new(InMemoryClientRegistry::new()),
        sessions: Arc::new(InMemorySessionRegistry::new()),
        keys: Arc::new(InMemoryKeyRepository::new()),
        refresh_tokens: Arc::new(InMemoryRefreshTokenRepository::new()),
    };
    let engine = Arc::new(AuthorizationEngine::new(&config, store, collaborators)?);

    let keys = Arc::clone(engine.keys());
    let check_interval = config.key_rotation_check_interval;
    background.spawn("key-rotation", async move {
        let mut ticker = tokio::time::interval(check_interval);
        loop {
            ticker.tick().await;
            match keys.run_rotation_cycle(chrono::Utc::now()).await {
                Ok(report) if report.rotated + report.expired > 0 => {
                    info!(rotated = report.rotated, expired = report.expired, "Key rotation cycle");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Key rotation cycle failed"),
            }
        }
    });

    let app = http::router(engine, config.request_timeout);
    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), "Identity Auth Service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_signal())
        .await
        .context("Server error")?;

    background.shutdown(SHUTDOWN_TIMEOUT).await;
    info!("Identity Auth Service stopped");
    Ok(())
}
