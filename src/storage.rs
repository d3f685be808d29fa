//! RocksDB-backed persistence for account records and the transfer journal.

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::account::types::{Account, TransferRecord};
use crate::error::TellerError;

const ACCOUNT_PREFIX: &str = "account:";
const TRANSFER_PREFIX: &str = "transfer:";

pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    pub fn open(path: &str) -> Result<Self, TellerError> {
        let path = Path::new(path);
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path)
            .map_err(|e| TellerError::PersistenceFailure(e.to_string()))?;
        Ok(Storage { db: Arc::new(db) })
    }

    // Generic Helper: Put
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), TellerError> {
        let serialized = bincode::serialize(value)
            .map_err(|e| TellerError::PersistenceFailure(e.to_string()))?;
        self.db
            .put(key.as_bytes(), serialized)
            .map_err(|e| TellerError::PersistenceFailure(e.to_string()))
    }

    // Generic Helper: Get
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, TellerError> {
        match self.db.get(key.as_bytes()) {
            Ok(Some(data)) => {
                let deserialized = bincode::deserialize(&data)
                    .map_err(|e| TellerError::PersistenceFailure(e.to_string()))?;
                Ok(Some(deserialized))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(TellerError::PersistenceFailure(e.to_string())),
        }
    }

    /// Write several serialized records as one atomic batch. Used for the
    /// debit/credit/journal triple of a transfer commit, so a crash cannot
    /// leave a debit without its matching credit.
    pub fn commit_batch(&self, entries: &[(String, Vec<u8>)]) -> Result<(), TellerError> {
        let mut batch = WriteBatch::default();
        for (key, value) in entries {
            batch.put(key.as_bytes(), value);
        }
        self.db
            .write(batch)
            .map_err(|e| TellerError::PersistenceFailure(e.to_string()))
    }

    // --- Specific Accessors ---

    pub fn account_key(id: &str) -> String {
        format!("{}{}", ACCOUNT_PREFIX, id)
    }

    pub fn transfer_key(idempotency_key: &str) -> String {
        format!("{}{}", TRANSFER_PREFIX, idempotency_key)
    }

    pub fn save_account(&self, account: &Account) -> Result<(), TellerError> {
        self.put(&Self::account_key(&account.id), account)
    }

    pub fn load_accounts(&self) -> Result<Vec<Account>, TellerError> {
        self.load_prefix(ACCOUNT_PREFIX)
    }

    pub fn load_transfer_journal(
        &self,
    ) -> Result<Vec<(String, TransferRecord)>, TellerError> {
        let iter = self.db.iterator(IteratorMode::From(
            TRANSFER_PREFIX.as_bytes(),
            Direction::Forward,
        ));
        let mut out = Vec::new();
        for item in iter {
            let (key, value) =
                item.map_err(|e| TellerError::PersistenceFailure(e.to_string()))?;
            if !key.starts_with(TRANSFER_PREFIX.as_bytes()) {
                break;
            }
            let token = String::from_utf8_lossy(&key[TRANSFER_PREFIX.len()..]).into_owned();
            let record = bincode::deserialize(&value)
                .map_err(|e| TellerError::PersistenceFailure(e.to_string()))?;
            out.push((token, record));
        }
        Ok(out)
    }

    fn load_prefix<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, TellerError> {
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        let mut out = Vec::new();
        for item in iter {
            let (key, value) =
                item.map_err(|e| TellerError::PersistenceFailure(e.to_string()))?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let record = bincode::deserialize(&value)
                .map_err(|e| TellerError::PersistenceFailure(e.to_string()))?;
            out.push(record);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> (Storage, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("teller-test-{}", uuid::Uuid::new_v4()));
        let storage = Storage::open(dir.to_str().unwrap()).unwrap();
        (storage, dir)
    }

    #[test]
    fn test_account_round_trip() {
        let (storage, dir) = temp_storage();

        let account = Account::new(
            "Alice".into(),
            "alice@example.com".into(),
            "$argon2id$fake".into(),
            "ACC-001".into(),
            500,
        );
        storage.save_account(&account).unwrap();

        let loaded = storage.load_accounts().unwrap();
        assert_eq!(loaded, vec![account]);

        drop(storage);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_batch_is_visible_after_commit() {
        let (storage, dir) = temp_storage();

        let a = Account::new("A".into(), "a@x".into(), "h".into(), "R1".into(), 100);
        let b = Account::new("B".into(), "b@x".into(), "h".into(), "R2".into(), 200);
        let entries = vec![
            (
                Storage::account_key(&a.id),
                bincode::serialize(&a).unwrap(),
            ),
            (
                Storage::account_key(&b.id),
                bincode::serialize(&b).unwrap(),
            ),
        ];
        storage.commit_batch(&entries).unwrap();

        let mut loaded = storage.load_accounts().unwrap();
        loaded.sort_by(|x, y| x.name.cmp(&y.name));
        assert_eq!(loaded, vec![a, b]);

        drop(storage);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_transfer_journal_round_trip() {
        let (storage, dir) = temp_storage();

        let record = TransferRecord {
            sender_id: "acct-1".into(),
            receiver_ref: "R-BOB".into(),
            amount: 100,
            receipt: crate::account::types::TransferReceipt {
                sender_name: "Alice".into(),
                sender_balance_after: 400,
                receiver_name: "Bob".into(),
                status: "success".into(),
            },
        };
        storage
            .put(&Storage::transfer_key("tok-1"), &record)
            .unwrap();

        let journal = storage.load_transfer_journal().unwrap();
        assert_eq!(journal, vec![("tok-1".to_string(), record)]);

        drop(storage);
        let _ = std::fs::remove_dir_all(dir);
    }
}
