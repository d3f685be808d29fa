//! Account storage with per-record optimistic versioning.
//!
//! Every committed write bumps the record's version; writers supply the
//! version they read and get `VersionConflict` back when it went stale.
//! Conflicting writes to one logical account are serialized by the store's
//! commit section, so N concurrent attempt updates produce exactly N
//! increments and a transfer's debit/credit pair is applied as a unit.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::auth::hash_secret;
use super::types::{Account, AccountId, TransferRecord};
use crate::error::TellerError;
use crate::storage::Storage;

/// Collaborator contract consumed by the credential guard and the ledger.
pub trait AccountStore: Send + Sync {
    fn find_by_identity(&self, email: &str) -> Option<Account>;
    fn find_by_reference(&self, account_ref: &str) -> Option<Account>;
    fn find_by_id(&self, id: &str) -> Option<Account>;

    /// Compare-and-swap of the attempt counter/timestamp pair.
    fn update_attempt_state(
        &self,
        id: &str,
        expected_version: u64,
        attempts: u32,
        last_attempt_ms: Option<u64>,
    ) -> Result<(), TellerError>;

    /// Apply a debit/credit pair as a single atomic commit, versioned on both
    /// records. When `journal` is given the transfer record is stored under
    /// the idempotency key inside the same commit; a key that is already in
    /// the journal fails the commit with `VersionConflict`, so a racing
    /// duplicate resolves to a replay on its next read.
    fn transfer_balances(
        &self,
        sender_id: &str,
        receiver_id: &str,
        amount: u64,
        expected_versions: (u64, u64),
        journal: Option<(&str, &TransferRecord)>,
    ) -> Result<(), TellerError>;

    /// Look up the record of an already-applied transfer.
    fn applied_transfer(&self, idempotency_key: &str) -> Option<TransferRecord>;
}

struct StoreInner {
    accounts: HashMap<AccountId, Account>,
    by_email: HashMap<String, AccountId>,
    by_ref: HashMap<String, AccountId>,
    applied: HashMap<String, TransferRecord>,
}

impl StoreInner {
    fn empty() -> Self {
        Self {
            accounts: HashMap::new(),
            by_email: HashMap::new(),
            by_ref: HashMap::new(),
            applied: HashMap::new(),
        }
    }

    fn index(&mut self, account: Account) {
        self.by_email.insert(account.email.clone(), account.id.clone());
        self.by_ref.insert(account.account_ref.clone(), account.id.clone());
        self.accounts.insert(account.id.clone(), account);
    }
}

/// In-memory account map with write-through RocksDB persistence.
pub struct KeyedStore {
    inner: RwLock<StoreInner>,
    storage: Option<Arc<Storage>>,
}

impl KeyedStore {
    /// Create a new empty store without a persistence backend.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::empty()),
            storage: None,
        }
    }

    /// Create with storage backend, loading existing records and the
    /// transfer journal.
    pub fn with_storage(storage: Arc<Storage>) -> Result<Self, TellerError> {
        let mut inner = StoreInner::empty();
        for account in storage.load_accounts()? {
            inner.index(account);
        }
        for (token, record) in storage.load_transfer_journal()? {
            inner.applied.insert(token, record);
        }
        Ok(Self {
            inner: RwLock::new(inner),
            storage: Some(storage),
        })
    }

    /// Provision a new account. Email and transfer reference must be unique.
    pub fn create_account(
        &self,
        name: &str,
        email: &str,
        secret: &str,
        account_ref: &str,
        opening_balance: u64,
    ) -> Result<Account, TellerError> {
        let credential_hash = hash_secret(secret)?;
        let account = Account::new(
            name.to_string(),
            email.to_string(),
            credential_hash,
            account_ref.to_string(),
            opening_balance,
        );

        let mut inner = self.write_lock()?;
        if inner.by_email.contains_key(email) || inner.by_ref.contains_key(account_ref) {
            return Err(TellerError::AccountExists);
        }
        if let Some(storage) = &self.storage {
            storage.save_account(&account)?;
        }
        inner.index(account.clone());
        Ok(account)
    }

    /// Insert a prepared record, replacing any previous state. Used when
    /// seeding and by tests that need specific attempt counters.
    pub fn insert_account(&self, account: Account) -> Result<(), TellerError> {
        if let Some(storage) = &self.storage {
            storage.save_account(&account)?;
        }
        let mut inner = self.write_lock()?;
        inner.index(account);
        Ok(())
    }

    pub fn account_count(&self) -> usize {
        self.inner.read().map(|i| i.accounts.len()).unwrap_or(0)
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreInner>, TellerError> {
        self.inner
            .write()
            .map_err(|_| TellerError::PersistenceFailure("store lock poisoned".to_string()))
    }

    fn read_lock(&self) -> Option<std::sync::RwLockReadGuard<'_, StoreInner>> {
        self.inner.read().ok()
    }
}

impl Default for KeyedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore for KeyedStore {
    fn find_by_identity(&self, email: &str) -> Option<Account> {
        let inner = self.read_lock()?;
        let id = inner.by_email.get(email)?;
        inner.accounts.get(id).cloned()
    }

    fn find_by_reference(&self, account_ref: &str) -> Option<Account> {
        let inner = self.read_lock()?;
        let id = inner.by_ref.get(account_ref)?;
        inner.accounts.get(id).cloned()
    }

    fn find_by_id(&self, id: &str) -> Option<Account> {
        self.read_lock()?.accounts.get(id).cloned()
    }

    fn update_attempt_state(
        &self,
        id: &str,
        expected_version: u64,
        attempts: u32,
        last_attempt_ms: Option<u64>,
    ) -> Result<(), TellerError> {
        let mut inner = self.write_lock()?;
        let account = inner
            .accounts
            .get(id)
            .ok_or(TellerError::AccountNotFound)?;
        if account.version != expected_version {
            return Err(TellerError::VersionConflict);
        }

        let mut updated = account.clone();
        updated.failed_attempts = attempts;
        // last_attempt_ms is monotonically non-decreasing
        updated.last_attempt_ms = match (account.last_attempt_ms, last_attempt_ms) {
            (Some(old), Some(new)) => Some(old.max(new)),
            (old, new) => new.or(old),
        };
        updated.version += 1;

        if let Some(storage) = &self.storage {
            storage.save_account(&updated)?;
        }
        inner.accounts.insert(updated.id.clone(), updated);
        Ok(())
    }

    fn transfer_balances(
        &self,
        sender_id: &str,
        receiver_id: &str,
        amount: u64,
        expected_versions: (u64, u64),
        journal: Option<(&str, &TransferRecord)>,
    ) -> Result<(), TellerError> {
        if sender_id == receiver_id {
            return Err(TellerError::InvalidAmount);
        }

        let mut inner = self.write_lock()?;
        if let Some((token, _)) = journal {
            if inner.applied.contains_key(token) {
                return Err(TellerError::VersionConflict);
            }
        }
        let sender = inner
            .accounts
            .get(sender_id)
            .ok_or(TellerError::AccountNotFound)?;
        let receiver = inner
            .accounts
            .get(receiver_id)
            .ok_or(TellerError::ReceiverNotFound)?;

        if sender.version != expected_versions.0 || receiver.version != expected_versions.1 {
            return Err(TellerError::VersionConflict);
        }

        let mut debited = sender.clone();
        debited.balance = sender
            .balance
            .checked_sub(amount)
            .ok_or(TellerError::InsufficientBalance)?;
        debited.version += 1;

        let mut credited = receiver.clone();
        credited.balance = receiver
            .balance
            .checked_add(amount)
            .ok_or(TellerError::InvalidAmount)?;
        credited.version += 1;

        if let Some(storage) = &self.storage {
            let mut entries = vec![
                (
                    Storage::account_key(&debited.id),
                    bincode::serialize(&debited)
                        .map_err(|e| TellerError::PersistenceFailure(e.to_string()))?,
                ),
                (
                    Storage::account_key(&credited.id),
                    bincode::serialize(&credited)
                        .map_err(|e| TellerError::PersistenceFailure(e.to_string()))?,
                ),
            ];
            if let Some((token, record)) = journal {
                entries.push((
                    Storage::transfer_key(token),
                    bincode::serialize(record)
                        .map_err(|e| TellerError::PersistenceFailure(e.to_string()))?,
                ));
            }
            storage.commit_batch(&entries)?;
        }

        if let Some((token, record)) = journal {
            inner.applied.insert(token.to_string(), record.clone());
        }
        inner.accounts.insert(debited.id.clone(), debited);
        inner.accounts.insert(credited.id.clone(), credited);
        Ok(())
    }

    fn applied_transfer(&self, idempotency_key: &str) -> Option<TransferRecord> {
        self.read_lock()?.applied.get(idempotency_key).cloned()
    }
}
