//! Account core
//!
//! This module implements the two pieces of the service that carry real
//! invariants:
//! - Credential rate limiting per identity (sliding lockout window)
//! - Atomic balance transfers (conservation, non-negative balances)
//!
//! Everything is built on a versioned keyed store so concurrent requests
//! never lose an attempt increment or leave a ledger half-applied.

pub mod auth;
pub mod guard;
pub mod ledger;
pub mod store;
pub mod types;

pub use guard::CredentialGuard;
pub use ledger::LedgerTransfer;
pub use store::{AccountStore, KeyedStore};
pub use types::{Account, AccountId, AttemptDecision, TransferReceipt};
