//! Prometheus metrics for the identity auth service.

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, CounterVec, Encoder, TextEncoder};

/// Tokens issued counter.
pub static TOKENS_ISSUED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_auth_tokens_issued_total",
        "Total number of tokens issued",
        &["token_type", "grant_type"]
    )
    .expect("Failed to register tokens_issued metric")
});

/// Refresh rotations counter.
pub static REFRESH_ROTATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_auth_refresh_rotations_total",
        "Total number of refresh token rotations",
        &["outcome"]
    )
    .expect("Failed to register refresh_rotations metric")
});

/// Tokens revoked counter.
pub static TOKENS_REVOKED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_auth_tokens_revoked_total",
        "Total number of refresh tokens revoked",
        &["reason"]
    )
    .expect("Failed to register tokens_revoked metric")
});

/// DPoP validations counter.
pub static DPOP_VALIDATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_auth_dpop_validations_total",
        "Total number of DPoP proof validations",
        &["status", "error_type"]
    )
    .expect("Failed to register dpop_validations metric")
});

/// Replay rejections counter.
pub static REPLAY_REJECTIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_auth_replay_rejections_total",
        "Total number of rejected replays",
        &["scope"]
    )
    .expect("Failed to register replay_rejections metric")
});

/// Signing key lifecycle counter.
pub static KEY_TRANSITIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_auth_key_transitions_total",
        "Total number of signing key lifecycle transitions",
        &["transition"]
    )
    .expect("Failed to register key_transitions metric")
});

/// Security events counter.
pub static SECURITY_EVENTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_auth_security_events_total",
        "Total number of security events",
        &["event_type"]
    )
    .expect("Failed to register security_events metric")
});

/// Record a token issuance.
pub fn record_token_issued(token_type: &str, grant_type: &str) {
    TOKENS_ISSUED
        .with_label_values(&[token_type, grant_type])
        .inc();
}

/// Record a refresh rotation outcome.
pub fn record_refresh_rotation(outcome: &str) {
    REFRESH_ROTATIONS.with_label_values(&[outcome]).inc();
}

/// Record refresh token revocations.
pub fn record_tokens_revoked(reason: &str, count: u64) {
    #[allow(clippy::cast_precision_loss)]
    TOKENS_REVOKED.with_label_values(&[reason]).inc_by(count as f64);
}

/// Record a DPoP validation.
pub fn record_dpop_validation(status: &str, error_type: &str) {
    DPOP_VALIDATIONS
        .with_label_values(&[status, error_type])
        .inc();
}

/// Record a rejected replay.
pub fn record_replay_rejected(scope: &str) {
    REPLAY_REJECTIONS.with_label_values(&[scope]).inc();
}

/// Record a signing key transition.
pub fn record_key_transition(transition: &str) {
    KEY_TRANSITIONS.with_label_values(&[transition]).inc();
}

/// Record a security event.
pub fn record_security_event(event_type: &str) {
    SECURITY_EVENTS.with_label_values(&[event_type]).inc();
}

/// Render the default registry in the Prometheus text format.
#[must_use]
pub fn render() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_token_issued() {
        record_token_issued("access", "authorization_code");
        let value = TOKENS_ISSUED
            .with_label_values(&["access", "authorization_code"])
            .get();
        assert!(value > 0.0);
    }

    #[test]
    fn test_record_security_event() {
        record_security_event("REFRESH_TOKEN_REUSE");
        let value = SECURITY_EVENTS
            .with_label_values(&["REFRESH_TOKEN_REUSE"])
            .get();
        assert!(value > 0.0);
    }

    #[test]
    fn test_render_contains_registered_metrics() {
        record_replay_rejected("dpop_proof");
        let text = render();
        assert!(text.contains("identity_auth_replay_rejections_total"));
    }
}
