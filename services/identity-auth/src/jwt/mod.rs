//! Access and refresh token claims and their compact JWS encoding.

pub mod claims;
pub mod serializer;

pub use claims::{AccessClaims, Confirmation, RefreshClaims, UnverifiedClaims};
pub use serializer::JwtSerializer;
