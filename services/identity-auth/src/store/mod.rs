//! Short-lived grant artifacts kept in the shared TTL store.
//!
//! With the in-memory backend these stores only hold for a single
//! instance; multi-instance deployments must use the Redis backend.

pub mod authorization_code;
pub mod device_code;
pub mod par;
pub mod pkce;

pub use authorization_code::{AuthorizationCode, AuthorizationCodeStore};
pub use device_code::{DeviceCode, DeviceCodeStatus, DeviceCodeStore};
pub use par::{ParRequest, ParStore, REQUEST_URI_PREFIX};
pub use pkce::PkceMethod;

use rand::RngCore;

/// `len` random bytes, hex-encoded.
pub(crate) fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
