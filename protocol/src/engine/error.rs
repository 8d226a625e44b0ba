//! Engine rejections and the outcome codes reported to transports.
//!
//! Every [`EngineError`] has a stable numeric [`code`](EngineError::code) and
//! falls into one [`ErrorCategory`]. Accepted deposits carry an
//! [`AcceptCode`] from a disjoint range.
//!
//! ```text
//!   1..=7    accepted
//! 100..=199  precondition
//! 200        no such vault
//! 300        not yet liquidatable
//! 400        insufficient takeover deposit
//! 500        arithmetic
//! 600        internal computation
//! 700        storage
//! 800        emission (state already committed)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::{Amount, AmountError};
use crate::asset::CurrencyCode;
use crate::oracle::OracleError;
use crate::settlement::{EmitError, OutboundTransfer};
use crate::storage::StoreError;
use crate::vault::{AccountId, Vault, VaultKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Precondition,
    NoSuchVault,
    NotYetLiquidatable,
    InsufficientTakeoverDeposit,
    Arithmetic,
    InternalComputation,
    Storage,
    Emission,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// No trustline of the required size toward the engine.
    #[error("account {0} has no sufficient trustline to the engine")]
    Unauthorized(AccountId),

    #[error("issued asset from {got} is not the stablecoin (issuer {expected})")]
    ForeignIssuer { expected: AccountId, got: AccountId },

    #[error("currency {got} is not the stablecoin currency {expected}")]
    ForeignCurrency {
        expected: CurrencyCode,
        got: CurrencyCode,
    },

    #[error("oracle rate {0} is not positive")]
    InvalidPrice(Amount),

    #[error("oracle unavailable: {0}")]
    Oracle(#[from] OracleError),

    #[error("no vault at {0}")]
    NoSuchVault(VaultKey),

    #[error("vault {0} is not undercollateralized")]
    NotYetLiquidatable(VaultKey),

    #[error("deposit does not restore vault {0} to the target ratio")]
    InsufficientTakeoverDeposit(VaultKey),

    #[error("arithmetic failure: {0}")]
    Arithmetic(#[from] AmountError),

    /// A ceiling that can only be negative if a previous step went wrong.
    #[error("internal computation error: {0}")]
    InternalComputation(String),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    /// The vault write is committed; only the payout failed to go out.
    #[error("vault {key} committed but settlement failed: {source}")]
    Emission {
        key: VaultKey,
        vault: Vault,
        transfer: OutboundTransfer,
        #[source]
        source: EmitError,
    },
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::MalformedEvent(_)
            | EngineError::Unauthorized(_)
            | EngineError::ForeignIssuer { .. }
            | EngineError::ForeignCurrency { .. }
            | EngineError::InvalidPrice(_)
            | EngineError::Oracle(_) => ErrorCategory::Precondition,
            EngineError::NoSuchVault(_) => ErrorCategory::NoSuchVault,
            EngineError::NotYetLiquidatable(_) => ErrorCategory::NotYetLiquidatable,
            EngineError::InsufficientTakeoverDeposit(_) => {
                ErrorCategory::InsufficientTakeoverDeposit
            }
            EngineError::Arithmetic(_) => ErrorCategory::Arithmetic,
            EngineError::InternalComputation(_) => ErrorCategory::InternalComputation,
            EngineError::Storage(_) => ErrorCategory::Storage,
            EngineError::Emission { .. } => ErrorCategory::Emission,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            EngineError::MalformedEvent(_) => 101,
            EngineError::Unauthorized(_) => 102,
            EngineError::ForeignIssuer { .. } => 103,
            EngineError::ForeignCurrency { .. } => 104,
            EngineError::InvalidPrice(_) => 105,
            EngineError::Oracle(_) => 106,
            EngineError::NoSuchVault(_) => 200,
            EngineError::NotYetLiquidatable(_) => 300,
            EngineError::InsufficientTakeoverDeposit(_) => 400,
            EngineError::Arithmetic(_) => 500,
            EngineError::InternalComputation(_) => 600,
            EngineError::Storage(_) => 700,
            EngineError::Emission { .. } => 800,
        }
    }

    /// Short fixed text for the code, independent of the error's payload.
    pub fn note(&self) -> &'static str {
        match self {
            EngineError::MalformedEvent(_) => "Malformed deposit",
            EngineError::Unauthorized(_) => "Trustline to the engine missing or too small",
            EngineError::ForeignIssuer { .. } => "Issued asset has the wrong issuer",
            EngineError::ForeignCurrency { .. } => "Issued asset has the wrong currency",
            EngineError::InvalidPrice(_) => "Oracle rate is not positive",
            EngineError::Oracle(_) => "Oracle rate unavailable",
            EngineError::NoSuchVault(_) => "No such vault",
            EngineError::NotYetLiquidatable(_) => "Vault is not liquidatable",
            EngineError::InsufficientTakeoverDeposit(_) => "Takeover deposit too small",
            EngineError::Arithmetic(_) => "Arithmetic error",
            EngineError::InternalComputation(_) => "Internal computation error",
            EngineError::Storage(_) => "Vault storage failure",
            EngineError::Emission { .. } => "Vault updated but settlement emission failed",
        }
    }

    /// True only for failures that happen after the vault write.
    pub fn is_committed(&self) -> bool {
        matches!(self, EngineError::Emission { .. })
    }
}

/// Why a deposit was accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptCode {
    /// The engine's own outgoing payment; nothing to do.
    PassThrough,
    /// Reserve added as collateral, nothing minted.
    AbsorbedReserve,
    /// Stablecoin applied to debt, nothing redeemed.
    AbsorbedStablecoin,
    Minted,
    Redeemed,
    TakeoverMinted,
    TakeoverRedeemed,
}

impl AcceptCode {
    pub fn code(&self) -> u16 {
        match self {
            AcceptCode::PassThrough => 1,
            AcceptCode::AbsorbedReserve => 2,
            AcceptCode::AbsorbedStablecoin => 3,
            AcceptCode::Minted => 4,
            AcceptCode::Redeemed => 5,
            AcceptCode::TakeoverMinted => 6,
            AcceptCode::TakeoverRedeemed => 7,
        }
    }

    pub fn note(&self) -> &'static str {
        match self {
            AcceptCode::PassThrough => "Outgoing transaction",
            AcceptCode::AbsorbedReserve => "Collateral added",
            AcceptCode::AbsorbedStablecoin => "Debt repaid",
            AcceptCode::Minted => "Stablecoin minted",
            AcceptCode::Redeemed => "Collateral redeemed",
            AcceptCode::TakeoverMinted => "Vault taken over, stablecoin minted",
            AcceptCode::TakeoverRedeemed => "Vault taken over, collateral redeemed",
        }
    }

    pub fn is_takeover(&self) -> bool {
        matches!(self, AcceptCode::TakeoverMinted | AcceptCode::TakeoverRedeemed)
    }
}
