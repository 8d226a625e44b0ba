//! # Settlement Emission
//!
//! After the engine commits a mint or a redemption it hands one
//! [`OutboundTransfer`] to a [`SettlementEmitter`]. What "sending" means is
//! the emitter's business: the node appends to a durable outbox that a
//! ledger submitter drains, tests keep a list in memory.
//!
//! Emission happens strictly after the vault write. A failed send is
//! reported to the caller but never retried and never rolled back.
//!
//! ## Transfer Ids
//!
//! ```text
//! id = BLAKE3("pegvault.transfer" || sequence (8B BE) || recipient
//!             || vault key || payout)
//! ```
//!
//! The sequence number makes two otherwise identical payouts distinct.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;

use crate::amount::Amount;
use crate::asset::CurrencyCode;
use crate::storage::{StoreError, VaultDb};
use crate::vault::{AccountId, VaultKey};

const TRANSFER_DOMAIN: &[u8] = b"pegvault.transfer";

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EmitError {
    /// The emitter cannot accept transfers right now.
    #[error("settlement emitter unavailable: {0}")]
    Unavailable(String),

    #[error("outbox write failed: {0}")]
    Outbox(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// TransferId
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(pub [u8; 32]);

impl TransferId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferId({})", self.to_hex())
    }
}

impl FromStr for TransferId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| e.to_string())?;
        let raw: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| format!("transfer id must be 32 bytes, got {}", bytes.len()))?;
        Ok(Self(raw))
    }
}

impl Serialize for TransferId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TransferId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// What is paid out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payout {
    /// Reserve asset in whole drops.
    Reserve { drops: u64 },
    /// Freshly minted stablecoin.
    Stablecoin {
        amount: Amount,
        issuer: AccountId,
        currency: CurrencyCode,
    },
}

/// One outgoing payment produced by a committed transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundTransfer {
    pub recipient: AccountId,
    /// The vault (after any relocation) the payout belongs to.
    pub vault: VaultKey,
    pub payout: Payout,
}

impl OutboundTransfer {
    pub fn id(&self, sequence: u64) -> TransferId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(TRANSFER_DOMAIN);
        hasher.update(&sequence.to_be_bytes());
        hasher.update(self.recipient.as_bytes());
        hasher.update(&self.vault.to_bytes());
        match &self.payout {
            Payout::Reserve { drops } => {
                hasher.update(&[0]);
                hasher.update(&drops.to_be_bytes());
            }
            Payout::Stablecoin {
                amount,
                issuer,
                currency,
            } => {
                hasher.update(&[1]);
                hasher.update(&amount.to_bytes());
                hasher.update(issuer.as_bytes());
                hasher.update(&currency.0);
            }
        }
        TransferId(*hasher.finalize().as_bytes())
    }
}

/// A transfer as recorded by an emitter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedTransfer {
    pub id: TransferId,
    pub sequence: u64,
    pub transfer: OutboundTransfer,
    pub emitted_at: DateTime<Utc>,
}

impl EmittedTransfer {
    pub fn new(sequence: u64, transfer: OutboundTransfer) -> Self {
        Self {
            id: transfer.id(sequence),
            sequence,
            transfer,
            emitted_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Emitters
// ---------------------------------------------------------------------------

pub trait SettlementEmitter: Send + Sync {
    fn send(&self, transfer: &OutboundTransfer) -> Result<TransferId, EmitError>;
}

/// Keeps every sent transfer in a list. Can be switched offline to
/// exercise the post-commit failure path.
#[derive(Debug, Default)]
pub struct MemoryEmitter {
    sequence: AtomicU64,
    offline: AtomicBool,
    sent: Mutex<Vec<EmittedTransfer>>,
}

impl MemoryEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EmittedTransfer> {
        self.sent.lock().clone()
    }

    pub fn last(&self) -> Option<EmittedTransfer> {
        self.sent.lock().last().cloned()
    }
}

impl SettlementEmitter for MemoryEmitter {
    fn send(&self, transfer: &OutboundTransfer) -> Result<TransferId, EmitError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(EmitError::Unavailable("memory emitter is offline".into()));
        }
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let emitted = EmittedTransfer::new(sequence, transfer.clone());
        let id = emitted.id;
        self.sent.lock().push(emitted);
        Ok(id)
    }
}

/// Appends transfers to the `outbox` tree of a [`VaultDb`].
#[derive(Debug, Clone)]
pub struct OutboxEmitter {
    db: VaultDb,
}

impl OutboxEmitter {
    pub fn new(db: VaultDb) -> Self {
        Self { db }
    }

    pub fn get(&self, id: &TransferId) -> Result<Option<EmittedTransfer>, StoreError> {
        self.db.get_transfer(id)
    }
}

impl SettlementEmitter for OutboxEmitter {
    fn send(&self, transfer: &OutboundTransfer) -> Result<TransferId, EmitError> {
        let sequence = self.db.next_sequence()?;
        let emitted = EmittedTransfer::new(sequence, transfer.clone());
        self.db.put_transfer(&emitted)?;
        tracing::debug!(id = %emitted.id, sequence, "transfer queued in outbox");
        Ok(emitted.id)
    }
}
