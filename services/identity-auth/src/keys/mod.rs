//! Signing-key lifecycle: generation, rotation, expiry and lookup.

pub mod manager;
pub mod repository;
pub mod signing_key;

pub use manager::{KeyManager, RotationReport};
pub use repository::{InMemoryKeyRepository, KeyRepository};
pub use signing_key::{KeyStatus, SigningKey};
