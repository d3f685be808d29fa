//! Login-attempt gating with a sliding lockout window.
//!
//! The guard is evaluated exactly once per login request, before the
//! credential itself is checked, and counts the attempt whether or not the
//! secret turns out to be correct. A successful credential match is followed
//! by a separate, idempotent [`CredentialGuard::reset_attempts`] write.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::auth::verify_secret_or_dummy;
use super::store::AccountStore;
use super::types::{current_timestamp_ms, Account, AttemptDecision};
use crate::error::TellerError;

/// Failed attempts tolerated inside the window before lockout.
pub const LOCKOUT_THRESHOLD: u32 = 5;
/// Sliding lockout window.
pub const LOCKOUT_WINDOW_MS: u64 = 30 * 60 * 1000;
/// Version-conflict retries before escalating to `PersistenceFailure`.
pub const COMMIT_RETRY_LIMIT: u32 = 5;

pub struct CredentialGuard {
    store: Arc<dyn AccountStore>,
    threshold: u32,
    window_ms: u64,
    retry_limit: u32,
}

impl CredentialGuard {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self::with_policy(store, LOCKOUT_THRESHOLD, LOCKOUT_WINDOW_MS, COMMIT_RETRY_LIMIT)
    }

    pub fn with_policy(
        store: Arc<dyn AccountStore>,
        threshold: u32,
        window_ms: u64,
        retry_limit: u32,
    ) -> Self {
        Self {
            store,
            threshold,
            window_ms,
            retry_limit,
        }
    }

    /// Evaluate one login attempt for `email`.
    ///
    /// Reads the account's counter/timestamp pair, applies the lockout
    /// decision, and commits the updated pair through a compare-and-swap so
    /// concurrent evaluations for the same identity never lose an increment.
    /// An unknown identity is reported as `AccountNotFound`, distinct from
    /// `allowed = false`; the caller decides how that surfaces.
    pub fn evaluate_attempt(&self, email: &str) -> Result<AttemptDecision, TellerError> {
        for retry in 0..=self.retry_limit {
            let account = self
                .store
                .find_by_identity(email)
                .ok_or(TellerError::AccountNotFound)?;
            let now = current_timestamp_ms();
            let elapsed = account.last_attempt_ms.map(|t| now.saturating_sub(t));

            let locked = account.failed_attempts >= self.threshold
                && matches!(elapsed, Some(e) if e < self.window_ms);
            let attempts = if locked {
                // saturated and inside the window: no further increments
                account.failed_attempts
            } else if matches!(elapsed, Some(e) if e >= self.window_ms) {
                // window elapsed: counter resets, then this attempt counts
                1
            } else {
                account.failed_attempts + 1
            };

            // Timestamp moves forward on every evaluation, locked or not.
            match self
                .store
                .update_attempt_state(&account.id, account.version, attempts, Some(now))
            {
                Ok(()) => {
                    if locked {
                        warn!(email, attempts, "login attempt rejected: account locked");
                    } else {
                        debug!(email, attempts, "login attempt recorded");
                    }
                    return Ok(AttemptDecision {
                        allowed: !locked,
                        attempts,
                    });
                }
                Err(TellerError::VersionConflict) => {
                    debug!(email, retry, "attempt update conflicted, retrying");
                    backoff(retry);
                }
                Err(e) => return Err(e),
            }
        }
        Err(TellerError::PersistenceFailure(
            "attempt update retries exhausted".to_string(),
        ))
    }

    /// Reset the failed-attempt counter after a successful credential match.
    /// Safe to call more than once; a counter already at zero is left alone.
    pub fn reset_attempts(&self, email: &str) -> Result<(), TellerError> {
        for retry in 0..=self.retry_limit {
            let account = self
                .store
                .find_by_identity(email)
                .ok_or(TellerError::AccountNotFound)?;
            if account.failed_attempts == 0 {
                return Ok(());
            }
            match self.store.update_attempt_state(
                &account.id,
                account.version,
                0,
                account.last_attempt_ms,
            ) {
                Ok(()) => return Ok(()),
                Err(TellerError::VersionConflict) => backoff(retry),
                Err(e) => return Err(e),
            }
        }
        Err(TellerError::PersistenceFailure(
            "attempt reset retries exhausted".to_string(),
        ))
    }

    /// Constant-time credential check. One Argon2 verification runs whether
    /// or not the identity resolves; a missing account is checked against a
    /// dummy hash and reported as `InvalidCredentials` like any mismatch.
    pub fn check_credentials(&self, email: &str, secret: &str) -> Result<Account, TellerError> {
        let account = self.store.find_by_identity(email);
        let hash = account.as_ref().map(|a| a.credential_hash.as_str());
        if verify_secret_or_dummy(secret, hash) {
            account.ok_or(TellerError::InvalidCredentials)
        } else {
            Err(TellerError::InvalidCredentials)
        }
    }
}

/// Exponential backoff between version-conflict retries, shared with the
/// ledger's commit loop.
pub(crate) fn backoff(retry: u32) {
    std::thread::sleep(Duration::from_millis(1u64 << retry.min(6)));
}
