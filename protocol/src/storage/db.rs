//! # VaultDb — Persistent Storage Engine
//!
//! The persistence layer for the vault engine, built on sled's embedded
//! key-value store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! | Tree     | Key                     | Value                     |
//! |----------|-------------------------|---------------------------|
//! | `vaults` | `VaultKey` (24B)        | `Vault` record (16B)      |
//! | `outbox` | `TransferId` (32B)      | `bincode(EmittedTransfer)`|
//!
//! ## Atomicity
//!
//! A takeover deletes the vault under its old key and writes it under the
//! new one. Both land in a single `Batch` on the `vaults` tree, so a crash
//! never leaves the vault at both keys or at neither.

use sled::{Batch, Db, Tree};
use std::collections::HashMap;
use std::path::Path;

use super::{decode_record, StoreError, StoreResult, VaultStore, VaultWrite};
use crate::settlement::{EmittedTransfer, TransferId};
use crate::vault::{Vault, VaultKey};

// ---------------------------------------------------------------------------
// VaultDb
// ---------------------------------------------------------------------------

/// sled-backed [`VaultStore`] plus the settlement outbox.
///
/// # Thread Safety
///
/// sled trees support lock-free concurrent reads and serialized writes.
/// `VaultDb` is a cheap handle and can be cloned or shared via `Arc`.
#[derive(Debug, Clone)]
pub struct VaultDb {
    db: Db,
    vaults: Tree,
    outbox: Tree,
}

impl VaultDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A database that is removed when dropped. For tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let vaults = db.open_tree("vaults")?;
        let outbox = db.open_tree("outbox")?;
        Ok(Self { db, vaults, outbox })
    }

    // -- Outbox -------------------------------------------------------------

    /// Monotonic sequence number that survives restarts.
    pub fn next_sequence(&self) -> StoreResult<u64> {
        Ok(self.db.generate_id()?)
    }

    pub fn put_transfer(&self, transfer: &EmittedTransfer) -> StoreResult<()> {
        let bytes =
            bincode::serialize(transfer).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.outbox.insert(transfer.id.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_transfer(&self, id: &TransferId) -> StoreResult<Option<EmittedTransfer>> {
        match self.outbox.get(id.as_bytes())? {
            Some(bytes) => {
                let transfer: EmittedTransfer = bincode::deserialize(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(transfer))
            }
            None => Ok(None),
        }
    }

    // -- Utility operations -------------------------------------------------

    pub fn transfer_count(&self) -> usize {
        self.outbox.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl VaultStore for VaultDb {
    fn get(&self, key: &VaultKey) -> StoreResult<Option<Vault>> {
        match self.vaults.get(key.to_bytes())? {
            Some(bytes) => decode_record(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn put(&self, key: &VaultKey, vault: &Vault) -> StoreResult<()> {
        self.vaults.insert(key.to_bytes(), &vault.to_bytes()[..])?;
        Ok(())
    }

    fn delete(&self, key: &VaultKey) -> StoreResult<()> {
        match self.vaults.remove(key.to_bytes())? {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key.to_hex())),
        }
    }

    /// One sled `Batch`: all writes land or none do.
    fn apply(&self, writes: &[VaultWrite]) -> StoreResult<()> {
        let mut present: HashMap<VaultKey, bool> = HashMap::new();
        let mut batch = Batch::default();

        for write in writes {
            match write {
                VaultWrite::Put(key, vault) => {
                    present.insert(*key, true);
                    batch.insert(&key.to_bytes()[..], &vault.to_bytes()[..]);
                }
                VaultWrite::Delete(key) => {
                    let exists = match present.get(key) {
                        Some(exists) => *exists,
                        None => self.vaults.contains_key(key.to_bytes())?,
                    };
                    if !exists {
                        return Err(StoreError::NotFound(key.to_hex()));
                    }
                    present.insert(*key, false);
                    batch.remove(&key.to_bytes()[..]);
                }
            }
        }

        self.vaults.apply_batch(batch)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
