//! Shared library for cross-cutting concerns in auth-platform Rust services.
//!
//! This crate provides centralized implementations for:
//! - Error types with retryability classification
//! - A TTL key-value store abstraction with atomic check-and-insert
//!   and compare-and-swap, backed by memory or Redis
//! - Namespaced, time-bounded cache client
//! - Tracing subscriber initialization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache_client;
pub mod error;
pub mod kv_store;
pub mod redis_store;
pub mod timeout;
pub mod tracing_config;

pub use cache_client::{CacheClient, CacheClientConfig};
pub use error::PlatformError;
pub use kv_store::{KeyValueStore, MemoryStore};
pub use redis_store::RedisStore;
pub use timeout::with_timeout;
pub use tracing_config::{TracingConfig, init_tracing};
