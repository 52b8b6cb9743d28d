//! Identity auth library.
//!
//! OAuth 2.0 / OpenID Connect authorization-server core: DPoP proof
//! verification, PKCE code exchange, refresh-token rotation with reuse
//! detection, per-tenant signing keys and JWKS, anti-replay bookkeeping,
//! and the HTTP surface over them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod directory;
pub mod dpop;
pub mod engine;
pub mod error;
pub mod http;
pub mod jwks;
pub mod jwt;
pub mod keys;
pub mod metrics;
pub mod refresh;
pub mod replay;
pub mod shutdown;
pub mod store;
pub mod tokens;

// Re-exports for convenience
pub use config::Config;
pub use engine::{AuthorizationEngine, Collaborators};
pub use error::{AuthError, AuthResult};
