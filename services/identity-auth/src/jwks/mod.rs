//! JSON Web Key Set publication.

pub mod publisher;

pub use publisher::{Jwk, Jwks, JwksPublisher};
