//! Refresh-token records, persistence and the rotation state machine.

pub mod repository;
pub mod rotator;
pub mod token;

pub use repository::{InMemoryRefreshTokenRepository, RefreshTokenRepository};
pub use rotator::RefreshTokenRotator;
pub use token::{hash_token, RefreshToken, RefreshTokenState};
