//! Balance transfers between two account records.
//!
//! A transfer authenticates the sender, validates the movement, and commits
//! the debit and credit as one atomic versioned update. Version conflicts are
//! retried with full re-validation against the freshly read balances, with
//! exponential backoff up to a small bound; a transfer is never applied
//! against a balance other than the one it was validated on.

use std::sync::Arc;

use tracing::{debug, info};

use super::guard::{backoff, CredentialGuard, COMMIT_RETRY_LIMIT};
use super::store::AccountStore;
use super::types::{TransferReceipt, TransferRecord};
use crate::error::TellerError;

pub struct LedgerTransfer {
    store: Arc<dyn AccountStore>,
    guard: Arc<CredentialGuard>,
    retry_limit: u32,
}

impl LedgerTransfer {
    pub fn new(store: Arc<dyn AccountStore>, guard: Arc<CredentialGuard>) -> Self {
        Self::with_retry_limit(store, guard, COMMIT_RETRY_LIMIT)
    }

    pub fn with_retry_limit(
        store: Arc<dyn AccountStore>,
        guard: Arc<CredentialGuard>,
        retry_limit: u32,
    ) -> Self {
        Self {
            store,
            guard,
            retry_limit,
        }
    }

    /// Move `amount` minor units from the sender (resolved by email,
    /// authenticated by secret) to the receiver (resolved by its transfer
    /// reference).
    ///
    /// When `idempotency_key` names an already-applied transfer with the
    /// same sender, receiver, and amount, the journaled receipt is returned
    /// and nothing is re-applied. A replay passes the same preconditions as
    /// a fresh transfer first, so a journaled receipt is never released past
    /// a bad secret; a key reused with different parameters is rejected.
    pub fn transfer(
        &self,
        sender_email: &str,
        secret: &str,
        receiver_ref: &str,
        amount: u64,
        idempotency_key: Option<&str>,
    ) -> Result<TransferReceipt, TellerError> {
        if amount == 0 {
            return Err(TellerError::InvalidAmount);
        }

        // Authentication first; runs in constant time even for unknown senders.
        let sender = self.guard.check_credentials(sender_email, secret)?;
        let sender_id = sender.id.clone();

        for retry in 0..=self.retry_limit {
            // Journal lookup inside the loop: a commit that lost its race to
            // a concurrent request with the same key finds that request's
            // record on the next pass and resolves to a replay.
            if let Some(key) = idempotency_key {
                if let Some(record) = self.store.applied_transfer(key) {
                    if record.sender_id == sender_id
                        && record.receiver_ref == receiver_ref
                        && record.amount == amount
                    {
                        debug!(key, "transfer replay, returning journaled receipt");
                        return Ok(record.receipt);
                    }
                    return Err(TellerError::IdempotencyConflict);
                }
            }

            // Fresh reads each attempt: the commit is versioned on exactly
            // these snapshots.
            let sender = self
                .store
                .find_by_id(&sender_id)
                .ok_or(TellerError::InvalidCredentials)?;
            let receiver = self
                .store
                .find_by_reference(receiver_ref)
                .ok_or(TellerError::ReceiverNotFound)?;
            if receiver.account_ref != receiver_ref {
                return Err(TellerError::ReceiverNotFound);
            }
            if receiver.id == sender.id {
                return Err(TellerError::InvalidAmount);
            }

            let sender_balance_after = sender
                .balance
                .checked_sub(amount)
                .ok_or(TellerError::InsufficientBalance)?;
            if receiver.balance.checked_add(amount).is_none() {
                return Err(TellerError::InvalidAmount);
            }

            let receipt = TransferReceipt {
                sender_name: sender.name.clone(),
                sender_balance_after,
                receiver_name: receiver.name.clone(),
                status: "success".to_string(),
            };
            let record = TransferRecord {
                sender_id: sender.id.clone(),
                receiver_ref: receiver_ref.to_string(),
                amount,
                receipt: receipt.clone(),
            };

            match self.store.transfer_balances(
                &sender.id,
                &receiver.id,
                amount,
                (sender.version, receiver.version),
                idempotency_key.map(|key| (key, &record)),
            ) {
                Ok(()) => {
                    info!(
                        sender = %sender.email,
                        receiver = %receiver.account_ref,
                        amount,
                        "transfer committed"
                    );
                    // Re-read the sender so the receipt reflects any
                    // concurrent, unrelated mutation since the commit.
                    let fresh = self
                        .store
                        .find_by_id(&sender.id)
                        .ok_or_else(|| {
                            TellerError::PersistenceFailure(
                                "sender vanished after commit".to_string(),
                            )
                        })?;
                    return Ok(TransferReceipt {
                        sender_name: fresh.name,
                        sender_balance_after: fresh.balance,
                        receiver_name: receipt.receiver_name,
                        status: receipt.status,
                    });
                }
                Err(TellerError::VersionConflict) => {
                    debug!(sender = %sender.email, retry, "transfer commit conflicted, retrying");
                    backoff(retry);
                }
                Err(e) => return Err(e),
            }
        }
        Err(TellerError::PersistenceFailure(
            "transfer commit retries exhausted".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::auth::hash_secret;
    use crate::account::store::KeyedStore;
    use crate::account::types::Account;

    fn ledger_with(
        sender_balance: u64,
        receiver_balance: u64,
    ) -> (LedgerTransfer, Arc<KeyedStore>, Account, Account) {
        let store = Arc::new(KeyedStore::new());
        let sender = Account::new(
            "Alice".into(),
            "alice@example.com".into(),
            hash_secret("alice-secret-123").unwrap(),
            "R-ALICE".into(),
            sender_balance,
        );
        let receiver = Account::new(
            "Bob".into(),
            "bob@example.com".into(),
            hash_secret("bob-secret-123").unwrap(),
            "R-BOB".into(),
            receiver_balance,
        );
        store.insert_account(sender.clone()).unwrap();
        store.insert_account(receiver.clone()).unwrap();

        let dyn_store: Arc<dyn AccountStore> = store.clone();
        let guard = Arc::new(CredentialGuard::new(dyn_store.clone()));
        (LedgerTransfer::new(dyn_store, guard), store, sender, receiver)
    }

    #[test]
    fn test_transfer_conserves_funds() {
        let (ledger, store, sender, receiver) = ledger_with(500, 50);

        let receipt = ledger
            .transfer("alice@example.com", "alice-secret-123", "R-BOB", 100, None)
            .unwrap();
        assert_eq!(receipt.sender_name, "Alice");
        assert_eq!(receipt.receiver_name, "Bob");
        assert_eq!(receipt.sender_balance_after, 400);
        assert_eq!(receipt.status, "success");

        let s = store.find_by_id(&sender.id).unwrap();
        let r = store.find_by_id(&receiver.id).unwrap();
        assert_eq!(s.balance, 400);
        assert_eq!(r.balance, 150);
        assert_eq!(s.balance + r.balance, 550);
    }

    #[test]
    fn test_zero_amount_rejected_before_authentication() {
        let (ledger, store, sender, _) = ledger_with(500, 0);
        assert_eq!(
            ledger
                .transfer("alice@example.com", "whatever", "R-BOB", 0, None)
                .unwrap_err(),
            TellerError::InvalidAmount
        );
        assert_eq!(store.find_by_id(&sender.id).unwrap().balance, 500);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let (ledger, store, sender, _) = ledger_with(500, 0);
        assert_eq!(
            ledger
                .transfer("alice@example.com", "not-the-secret", "R-BOB", 100, None)
                .unwrap_err(),
            TellerError::InvalidCredentials
        );
        assert_eq!(store.find_by_id(&sender.id).unwrap().balance, 500);
    }

    #[test]
    fn test_unknown_sender_rejected_as_invalid_credentials() {
        let (ledger, _, _, _) = ledger_with(500, 0);
        assert_eq!(
            ledger
                .transfer("nobody@example.com", "alice-secret-123", "R-BOB", 100, None)
                .unwrap_err(),
            TellerError::InvalidCredentials
        );
    }

    #[test]
    fn test_unknown_receiver_rejected() {
        let (ledger, store, sender, _) = ledger_with(500, 0);
        assert_eq!(
            ledger
                .transfer("alice@example.com", "alice-secret-123", "R-NOPE", 100, None)
                .unwrap_err(),
            TellerError::ReceiverNotFound
        );
        assert_eq!(store.find_by_id(&sender.id).unwrap().balance, 500);
    }

    #[test]
    fn test_insufficient_balance_rejected_without_mutation() {
        let (ledger, store, sender, receiver) = ledger_with(50, 10);
        assert_eq!(
            ledger
                .transfer("alice@example.com", "alice-secret-123", "R-BOB", 100, None)
                .unwrap_err(),
            TellerError::InsufficientBalance
        );
        assert_eq!(store.find_by_id(&sender.id).unwrap().balance, 50);
        assert_eq!(store.find_by_id(&receiver.id).unwrap().balance, 10);
    }

    #[test]
    fn test_transfer_to_self_rejected() {
        let (ledger, store, sender, _) = ledger_with(500, 0);
        assert_eq!(
            ledger
                .transfer("alice@example.com", "alice-secret-123", "R-ALICE", 100, None)
                .unwrap_err(),
            TellerError::InvalidAmount
        );
        assert_eq!(store.find_by_id(&sender.id).unwrap().balance, 500);
    }

    #[test]
    fn test_idempotent_replay_not_reapplied() {
        let (ledger, store, sender, _) = ledger_with(500, 0);

        let first = ledger
            .transfer(
                "alice@example.com",
                "alice-secret-123",
                "R-BOB",
                100,
                Some("tok-42"),
            )
            .unwrap();
        let replay = ledger
            .transfer(
                "alice@example.com",
                "alice-secret-123",
                "R-BOB",
                100,
                Some("tok-42"),
            )
            .unwrap();

        assert_eq!(first.sender_balance_after, 400);
        assert_eq!(replay.sender_balance_after, 400);
        assert_eq!(store.find_by_id(&sender.id).unwrap().balance, 400);
    }

    #[test]
    fn test_replay_requires_valid_credentials() {
        let (ledger, store, sender, _) = ledger_with(500, 0);

        ledger
            .transfer(
                "alice@example.com",
                "alice-secret-123",
                "R-BOB",
                100,
                Some("tok-9"),
            )
            .unwrap();

        // A known key does not release the journaled receipt past a bad
        // secret: authentication is checked before the journal.
        assert_eq!(
            ledger
                .transfer(
                    "alice@example.com",
                    "totally-wrong-secret",
                    "R-BOB",
                    100,
                    Some("tok-9"),
                )
                .unwrap_err(),
            TellerError::InvalidCredentials
        );
        assert_eq!(store.find_by_id(&sender.id).unwrap().balance, 400);
    }

    #[test]
    fn test_replay_with_different_parameters_rejected() {
        let (ledger, store, sender, _) = ledger_with(500, 0);

        ledger
            .transfer(
                "alice@example.com",
                "alice-secret-123",
                "R-BOB",
                100,
                Some("tok-7"),
            )
            .unwrap();

        // Same key, different amount
        assert_eq!(
            ledger
                .transfer(
                    "alice@example.com",
                    "alice-secret-123",
                    "R-BOB",
                    200,
                    Some("tok-7"),
                )
                .unwrap_err(),
            TellerError::IdempotencyConflict
        );
        // Same key, different receiver
        assert_eq!(
            ledger
                .transfer(
                    "alice@example.com",
                    "alice-secret-123",
                    "R-OTHER",
                    100,
                    Some("tok-7"),
                )
                .unwrap_err(),
            TellerError::IdempotencyConflict
        );
        assert_eq!(store.find_by_id(&sender.id).unwrap().balance, 400);
    }

    #[test]
    fn test_no_double_spend_under_concurrency() {
        let (ledger, store, sender, receiver) = ledger_with(100, 0);
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    ledger.transfer("alice@example.com", "alice-secret-123", "R-BOB", 80, None)
                })
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let successes = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(successes, 1);
        for outcome in &outcomes {
            if let Err(e) = outcome {
                assert_eq!(*e, TellerError::InsufficientBalance);
            }
        }

        let s = store.find_by_id(&sender.id).unwrap();
        let r = store.find_by_id(&receiver.id).unwrap();
        assert_eq!(s.balance, 20);
        assert_eq!(r.balance, 80);
        assert_eq!(s.balance + r.balance, 100);
    }
}
