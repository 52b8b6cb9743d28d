//! Refresh-token rotation with reuse detection.
//!
//! A token is ISSUED until it is exchanged exactly once (USED) or revoked
//! (REVOKED, terminal). Presenting a USED token again revokes its whole
//! family. The mark-used and successor-insert steps are committed as one
//! repository transaction; two concurrent rotations of the same token
//! produce one winner, and the loser is treated as reuse.

use crate::directory::User;
use crate::dpop::{DpopVerifier, VerifyOptions};
use crate::error::AuthError;
use crate::metrics;
use crate::refresh::repository::RefreshTokenRepository;
use crate::refresh::token::{hash_token, RefreshToken, RefreshTokenState};
use crate::replay::ReplayLedger;
use crate::tokens::{RefreshLineage, TokenIssuer};
use chrono::Utc;
use rust_common::{with_timeout, PlatformError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Revocation reason recorded when a used token is presented again.
pub const REASON_REUSE: &str = "reuse_detected";

/// Refresh-token rotator.
pub struct RefreshTokenRotator {
    repository: Arc<dyn RefreshTokenRepository>,
    issuer: Arc<TokenIssuer>,
    verifier: DpopVerifier,
    ledger: ReplayLedger,
    replay_ttl: Duration,
    timeout: Duration,
}

impl RefreshTokenRotator {
    /// Create a rotator.
    #[must_use]
    pub fn new(
        repository: Arc<dyn RefreshTokenRepository>,
        issuer: Arc<TokenIssuer>,
        verifier: DpopVerifier,
        ledger: ReplayLedger,
        replay_ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            repository,
            issuer,
            verifier,
            ledger,
            replay_ttl,
            timeout,
        }
    }

    /// Issue and persist the first token of a lineage (or a token in an
    /// existing one).
    ///
    /// # Errors
    ///
    /// Returns an error if signing or persistence fails.
    pub async fn issue(
        &self,
        user: &User,
        jkt: &str,
        lineage: RefreshLineage,
    ) -> Result<(String, RefreshToken), AuthError> {
        let (raw, record) = self.issuer.issue_refresh_token(user, jkt, lineage).await?;
        with_timeout(
            self.timeout,
            "refresh.save",
            self.repository.save(record.clone()),
        )
        .await?;
        info!(family_id = %record.family_id, tenant_id = %record.tenant_id, "Issued refresh token");
        Ok((raw, record))
    }

    /// Check a presented token and its DPoP proof before rotation.
    ///
    /// The token must be known, unrevoked, unused and unexpired. The proof
    /// must verify and carry the key the token is bound to; its `jti` is
    /// then registered for anti-replay.
    ///
    /// # Errors
    ///
    /// `InvalidToken`, `ReuseDetected`, `Expired`, a DPoP error, or
    /// `ReplayDetected`.
    #[instrument(skip_all)]
    pub async fn validate(
        &self,
        token: &str,
        proof: &str,
        method: &str,
        url: &str,
    ) -> Result<RefreshToken, AuthError> {
        let record = self.usable(token).await?;

        let verified = self
            .verifier
            .verify(proof, method, url, VerifyOptions::bound_to(&record.jkt))?;
        self.ledger
            .register_dpop_proof(&record.tenant_id, &verified.jkt, &verified.jti, self.replay_ttl)
            .await?;
        Ok(record)
    }

    /// Exchange `token` for its successor.
    ///
    /// # Errors
    ///
    /// `InvalidToken` if unknown or revoked, `ReuseDetected` if already used
    /// (the family is revoked first), `Expired`, or a platform error if the
    /// commit fails. Nothing is committed on failure.
    #[instrument(skip_all)]
    pub async fn rotate(&self, token: &str) -> Result<(String, RefreshToken), AuthError> {
        let old = self.usable(token).await?;
        let user = User::new(old.user_id.clone(), old.tenant_id.clone());

        let (raw, successor) = self
            .issuer
            .issue_refresh_token(&user, &old.jkt, RefreshLineage::continuing(&old))
            .await?;

        let committed = with_timeout(
            self.timeout,
            "refresh.commit_rotation",
            self.repository
                .commit_rotation(&old.id, Utc::now(), successor.clone()),
        )
        .await;

        match committed {
            Ok(()) => {
                info!(family_id = %old.family_id, parent_id = %old.id, "Rotated refresh token");
                metrics::record_refresh_rotation("success");
                Ok((raw, successor))
            }
            Err(PlatformError::Conflict(_)) => Err(self.reuse_detected(&old).await),
            Err(e) => {
                metrics::record_refresh_rotation("error");
                Err(e.into())
            }
        }
    }

    /// Revoke every token of a family. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the repository fails.
    pub async fn revoke_family(&self, family_id: &str, reason: &str) -> Result<usize, AuthError> {
        let count = with_timeout(
            self.timeout,
            "refresh.update_by_family",
            self.repository.update_by_family(family_id, reason),
        )
        .await?;
        if count > 0 {
            info!(family_id = %family_id, reason = %reason, count, "Revoked token family");
            metrics::record_tokens_revoked(reason, count as u64);
        }
        Ok(count)
    }

    /// Revoke every token of a login session.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the repository fails.
    pub async fn revoke_session(&self, session_id: &str, reason: &str) -> Result<usize, AuthError> {
        let count = with_timeout(
            self.timeout,
            "refresh.revoke_by_session",
            self.repository.revoke_by_session(session_id, reason),
        )
        .await?;
        if count > 0 {
            metrics::record_tokens_revoked(reason, count as u64);
        }
        Ok(count)
    }

    /// Delete the record for a raw token. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the repository fails.
    pub async fn delete(&self, token: &str) -> Result<bool, AuthError> {
        let deleted = with_timeout(
            self.timeout,
            "refresh.delete_by_hash",
            self.repository.delete_by_hash(&hash_token(token)),
        )
        .await?;
        if deleted {
            metrics::record_tokens_revoked("revoked", 1);
        }
        Ok(deleted)
    }

    /// Load the record and require it to be ISSUED and unexpired.
    async fn usable(&self, token: &str) -> Result<RefreshToken, AuthError> {
        let record = with_timeout(
            self.timeout,
            "refresh.find_by_hash",
            self.repository.find_by_hash(&hash_token(token)),
        )
        .await?
        .ok_or_else(|| {
            metrics::record_refresh_rotation("invalid");
            AuthError::InvalidToken("Invalid refresh token".to_string())
        })?;

        match record.state() {
            RefreshTokenState::Revoked => {
                metrics::record_refresh_rotation("invalid");
                Err(AuthError::InvalidToken("Refresh token revoked".to_string()))
            }
            RefreshTokenState::Used => Err(self.reuse_detected(&record).await),
            RefreshTokenState::Issued if record.is_expired_at(Utc::now()) => {
                metrics::record_refresh_rotation("expired");
                Err(AuthError::Expired)
            }
            RefreshTokenState::Issued => Ok(record),
        }
    }

    /// Poison the lineage. A failed revocation is surfaced rather than
    /// reported as reuse, so the invariant is never silently dropped.
    async fn reuse_detected(&self, record: &RefreshToken) -> AuthError {
        warn!(
            event_type = "REFRESH_TOKEN_REUSE",
            family_id = %record.family_id,
            tenant_id = %record.tenant_id,
            user_id = %record.user_id,
            session_id = %record.session_id,
            "Refresh token reuse detected, revoking family"
        );
        metrics::record_refresh_rotation("reuse_detected");
        metrics::record_security_event("REFRESH_TOKEN_REUSE");

        match self.revoke_family(&record.family_id, REASON_REUSE).await {
            Ok(_) => AuthError::ReuseDetected {
                family_id: record.family_id.clone(),
            },
            Err(e) => e,
        }
    }
}
