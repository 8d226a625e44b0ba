//! # Collateral Engine
//!
//! Turns deposit events into vault updates and settlement payouts.
//!
//! ```text
//! event.rs       — DepositEvent, Mode
//! transition.rs  — the pure decision functions
//! error.rs       — EngineError, ErrorCategory, AcceptCode
//! ```
//!
//! ## Processing
//!
//! ```text
//! credential check → screen → oracle rate → read vault → transition
//!     → store.apply(writes) → emitter.send(payout)
//! ```
//!
//! A takeover deletes the target key and puts the vault at the depositor's
//! key in one batch; whatever the depositor held there is replaced.
//!
//! Each event runs under one engine-wide lock, so concurrent callers never
//! see a vault between its read and its write. Nothing is written unless the
//! transition succeeds. The payout is sent only after the write; if sending
//! fails the write stands and the error says so.

pub mod error;
pub mod event;
pub mod transition;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::amount::Amount;
use crate::config::EngineConfig;
use crate::credential::CredentialCheck;
use crate::oracle::PriceOracle;
use crate::settlement::{OutboundTransfer, SettlementEmitter, TransferId};
use crate::storage::{StoreResult, VaultStore};
use crate::vault::{Vault, VaultKey};

pub use error::{AcceptCode, EngineError, ErrorCategory};
pub use event::{DepositEvent, Mode};
pub use transition::{Authorization, Route, VaultChange};

use transition::Screen;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What an accepted deposit did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositOutcome {
    pub code: AcceptCode,
    /// The key the vault lives under afterwards. `None` for pass-through.
    pub vault_key: Option<VaultKey>,
    /// Set when a takeover moved the vault away from this key.
    pub previous_key: Option<VaultKey>,
    pub vault: Option<Vault>,
    pub transfer: Option<OutboundTransfer>,
    pub transfer_id: Option<TransferId>,
}

impl DepositOutcome {
    fn pass_through() -> Self {
        Self {
            code: AcceptCode::PassThrough,
            vault_key: None,
            previous_key: None,
            vault: None,
            transfer: None,
            transfer_id: None,
        }
    }
}

/// Transport-facing summary of one deposit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineResult {
    pub accepted: bool,
    pub code: u16,
    pub note: String,
    /// Whether vault state changed. True for a rejected emission.
    pub committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_key: Option<VaultKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault: Option<Vault>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<TransferId>,
}

impl From<&DepositOutcome> for EngineResult {
    fn from(outcome: &DepositOutcome) -> Self {
        Self {
            accepted: true,
            code: outcome.code.code(),
            note: outcome.code.note().to_string(),
            committed: outcome.code != AcceptCode::PassThrough,
            category: None,
            detail: None,
            vault_key: outcome.vault_key,
            vault: outcome.vault,
            transfer_id: outcome.transfer_id,
        }
    }
}

impl From<&EngineError> for EngineResult {
    fn from(error: &EngineError) -> Self {
        let (vault_key, vault) = match error {
            EngineError::Emission { key, vault, .. } => (Some(*key), Some(*vault)),
            _ => (None, None),
        };
        Self {
            accepted: false,
            code: error.code(),
            note: error.note().to_string(),
            committed: error.is_committed(),
            category: Some(error.category()),
            detail: Some(error.to_string()),
            vault_key,
            vault,
            transfer_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn VaultStore>,
    oracle: Arc<dyn PriceOracle>,
    credentials: Arc<dyn CredentialCheck>,
    emitter: Arc<dyn SettlementEmitter>,
    /// Serializes read-compute-write cycles.
    writer: Mutex<()>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn VaultStore>,
        oracle: Arc<dyn PriceOracle>,
        credentials: Arc<dyn CredentialCheck>,
        emitter: Arc<dyn SettlementEmitter>,
    ) -> Self {
        Self {
            config,
            store,
            oracle,
            credentials,
            emitter,
            writer: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reads a vault without taking the writer lock.
    pub fn vault(&self, key: &VaultKey) -> StoreResult<Option<Vault>> {
        self.store.get(key)
    }

    /// Processes one deposit and reports the result in transport form.
    pub fn on_deposit(&self, event: &DepositEvent) -> EngineResult {
        match self.process(event) {
            Ok(outcome) => EngineResult::from(&outcome),
            Err(error) => EngineResult::from(&error),
        }
    }

    /// Processes one deposit.
    pub fn process(&self, event: &DepositEvent) -> Result<DepositOutcome, EngineError> {
        let _writer = self.writer.lock();

        let result = self.process_locked(event);
        match &result {
            Ok(outcome) => tracing::debug!(
                sender = %event.sender,
                code = outcome.code.code(),
                "deposit accepted"
            ),
            Err(error) if error.is_committed() => tracing::error!(
                sender = %event.sender,
                code = error.code(),
                %error,
                "settlement emission failed after commit"
            ),
            Err(error) => tracing::warn!(
                sender = %event.sender,
                code = error.code(),
                %error,
                "deposit rejected"
            ),
        }
        result
    }

    fn process_locked(&self, event: &DepositEvent) -> Result<DepositOutcome, EngineError> {
        let authorization = Authorization::from(self.credentials.has_authorization(&event.sender));

        let route = match transition::screen(event, authorization, &self.config)? {
            Screen::PassThrough => return Ok(DepositOutcome::pass_through()),
            Screen::Route(route) => route,
        };

        let price = self.oracle.current_rate()?;
        let current = self.store.get(&route.key)?;

        let change = transition::apply(event, &route, current, price, &self.config)?;
        if change.relocates() {
            if let Some(replaced) = self.store.get(&change.to)? {
                tracing::warn!(
                    key = %change.to,
                    debt = %replaced.debt,
                    collateral = %replaced.collateral,
                    "takeover replaces the depositor's existing vault"
                );
            }
        }

        self.store.apply(&change.writes())?;
        self.log_commit(&change, price);

        let transfer_id = match &change.transfer {
            Some(transfer) => Some(self.emitter.send(transfer).map_err(|source| {
                EngineError::Emission {
                    key: change.to,
                    vault: change.after,
                    transfer: transfer.clone(),
                    source,
                }
            })?),
            None => None,
        };

        Ok(DepositOutcome {
            code: change.code,
            vault_key: Some(change.to),
            previous_key: change.relocates().then_some(change.from),
            vault: Some(change.after),
            transfer: change.transfer,
            transfer_id,
        })
    }

    fn log_commit(&self, change: &VaultChange, price: Amount) {
        match change.code {
            AcceptCode::AbsorbedReserve | AcceptCode::AbsorbedStablecoin => tracing::debug!(
                key = %change.to,
                debt = %change.after.debt,
                collateral = %change.after.collateral,
                "deposit absorbed"
            ),
            code if code.is_takeover() => tracing::info!(
                from = %change.from,
                to = %change.to,
                debt = %change.after.debt,
                collateral = %change.after.collateral,
                %price,
                "vault taken over"
            ),
            _ => tracing::info!(
                key = %change.to,
                debt = %change.after.debt,
                collateral = %change.after.collateral,
                %price,
                note = change.code.note(),
                "vault updated"
            ),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
