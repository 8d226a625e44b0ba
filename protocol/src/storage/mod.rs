//! # Storage Module
//!
//! Vault persistence. The engine talks to a [`VaultStore`] and never to a
//! concrete backend, so the same state machine runs against an in-memory map
//! in tests and against sled in the node.
//!
//! ## Architecture
//!
//! ```text
//! mod.rs  — VaultStore trait, VaultWrite, MemoryVaultStore
//! db.rs   — VaultDb: sled trees for vault records and the settlement outbox
//! ```
//!
//! ## Record Format
//!
//! Both backends hold the fixed-width forms, not bincode:
//!
//! ```text
//! key   : 24 bytes  account id || source tag (BE)
//! value : 16 bytes  debt (8B) || collateral (8B)
//! ```
//!
//! so a vault read back is bit-identical to the one written.

pub mod db;

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::config::VAULT_RECORD_LENGTH;
use crate::vault::{RecordError, Vault, VaultKey};

pub use db::VaultDb;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("corrupt vault record under {key}: {source}")]
    Corrupt { key: String, source: RecordError },
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// VaultStore
// ---------------------------------------------------------------------------

/// One write in an atomic batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VaultWrite {
    Put(VaultKey, Vault),
    /// Fails the whole batch with [`StoreError::NotFound`] if absent.
    Delete(VaultKey),
}

/// Keyed vault record storage.
///
/// Implementations must be shareable across threads; the engine serializes
/// its own read-modify-write cycles, so a store only needs to make each call
/// (and each [`apply`](VaultStore::apply) batch) atomic on its own.
pub trait VaultStore: Send + Sync {
    fn get(&self, key: &VaultKey) -> StoreResult<Option<Vault>>;

    /// Inserts or overwrites.
    fn put(&self, key: &VaultKey, vault: &Vault) -> StoreResult<()>;

    /// Removes a record. Deleting a missing key is an error.
    fn delete(&self, key: &VaultKey) -> StoreResult<()>;

    /// Applies `writes` in order. Backends that can do so override this with
    /// an all-or-nothing batch.
    fn apply(&self, writes: &[VaultWrite]) -> StoreResult<()> {
        for write in writes {
            match write {
                VaultWrite::Put(key, vault) => self.put(key, vault)?,
                VaultWrite::Delete(key) => self.delete(key)?,
            }
        }
        Ok(())
    }
}

pub(crate) fn decode_record(key: &VaultKey, bytes: &[u8]) -> StoreResult<Vault> {
    Vault::from_bytes(bytes).map_err(|source| StoreError::Corrupt {
        key: key.to_hex(),
        source,
    })
}

// ---------------------------------------------------------------------------
// MemoryVaultStore
// ---------------------------------------------------------------------------

/// A `HashMap` behind a lock, holding encoded records.
#[derive(Debug, Default)]
pub struct MemoryVaultStore {
    records: RwLock<HashMap<VaultKey, [u8; VAULT_RECORD_LENGTH]>>,
}

impl MemoryVaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl VaultStore for MemoryVaultStore {
    fn get(&self, key: &VaultKey) -> StoreResult<Option<Vault>> {
        match self.records.read().get(key) {
            Some(bytes) => decode_record(key, bytes).map(Some),
            None => Ok(None),
        }
    }

    fn put(&self, key: &VaultKey, vault: &Vault) -> StoreResult<()> {
        self.records.write().insert(*key, vault.to_bytes());
        Ok(())
    }

    fn delete(&self, key: &VaultKey) -> StoreResult<()> {
        self.records
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_hex()))
    }

    /// Validates every delete under the write lock before touching anything.
    fn apply(&self, writes: &[VaultWrite]) -> StoreResult<()> {
        let mut records = self.records.write();

        // Deletes must hit a key that exists at that point in the batch.
        let mut present: HashMap<VaultKey, bool> = HashMap::new();
        for write in writes {
            match write {
                VaultWrite::Put(key, _) => {
                    present.insert(*key, true);
                }
                VaultWrite::Delete(key) => {
                    let exists = present
                        .get(key)
                        .copied()
                        .unwrap_or_else(|| records.contains_key(key));
                    if !exists {
                        return Err(StoreError::NotFound(key.to_hex()));
                    }
                    present.insert(*key, false);
                }
            }
        }

        for write in writes {
            match write {
                VaultWrite::Put(key, vault) => {
                    records.insert(*key, vault.to_bytes());
                }
                VaultWrite::Delete(key) => {
                    records.remove(key);
                }
            }
        }
        Ok(())
    }
}
