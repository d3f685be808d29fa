//! Account type definitions

use serde::{Deserialize, Serialize};

/// Account identifier - opaque unique id (UUID v4 as string)
pub type AccountId = String;

/// Main account record.
///
/// A single record covers both roles the service needs: a login-capable
/// identity (email + credential hash + attempt tracking) and a funds-holding
/// entity (routable reference + balance in minor units).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Account {
    // Identity
    pub id: AccountId,
    pub name: String,
    pub email: String,

    // Authentication
    pub credential_hash: String, // Argon2id PHC string
    pub failed_attempts: u32,
    pub last_attempt_ms: Option<u64>,

    // Funds
    pub account_ref: String, // routable transfer reference, distinct from id
    pub balance: u64,        // minor units

    // Concurrency control
    pub version: u64, // bumped by the store on every committed write

    pub created_at: u64,
}

impl Account {
    pub fn new(
        name: String,
        email: String,
        credential_hash: String,
        account_ref: String,
        opening_balance: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            email,
            credential_hash,
            failed_attempts: 0,
            last_attempt_ms: None,
            account_ref,
            balance: opening_balance,
            version: 0,
            created_at: current_timestamp_ms(),
        }
    }
}

/// Outcome of a single login-attempt evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptDecision {
    /// false when the account is inside the lockout window
    pub allowed: bool,
    /// failed-attempt counter after this evaluation
    pub attempts: u32,
}

/// Result payload of a committed balance transfer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TransferReceipt {
    pub sender_name: String,
    pub sender_balance_after: u64,
    pub receiver_name: String,
    pub status: String,
}

/// Journal entry for an applied transfer, keyed by idempotency token.
///
/// The request parameters are stored alongside the receipt so a replay can
/// be checked against what was actually committed: same authenticated
/// sender, same receiver, same amount.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TransferRecord {
    pub sender_id: AccountId,
    pub receiver_ref: String,
    pub amount: u64,
    pub receipt: TransferReceipt,
}

pub fn current_timestamp_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}
