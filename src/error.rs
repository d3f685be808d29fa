use thiserror::Error;

/// Error taxonomy for the teller core.
///
/// Business-rule failures are terminal for the request and surfaced verbatim.
/// `VersionConflict` is retried inside the guard/ledger up to a small bound
/// before escalating to `PersistenceFailure`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TellerError {
    #[error("Account locked: too many failed login attempts")]
    AccountLocked,
    #[error("Wrong email or password")]
    InvalidCredentials,
    #[error("Account not found")]
    AccountNotFound,
    #[error("Receiver account not found")]
    ReceiverNotFound,
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Invalid transfer amount")]
    InvalidAmount,
    #[error("Version conflict on concurrent update")]
    VersionConflict,
    #[error("Idempotency key reused with different parameters")]
    IdempotencyConflict,
    #[error("Account already exists")]
    AccountExists,
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl TellerError {
    /// Transient failures may be retried by the caller; everything else is
    /// a terminal business-rule outcome.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TellerError::VersionConflict | TellerError::PersistenceFailure(_)
        )
    }
}
