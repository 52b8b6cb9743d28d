//! Access and refresh token minting.

pub mod issuer;

pub use issuer::{RefreshLineage, TokenIssuer, TokenLifetimes};
