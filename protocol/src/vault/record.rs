//! The vault record and its fixed-width on-disk form.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::{Amount, AmountError, AmountResult, ENCODED_LEN};
use crate::config::VAULT_RECORD_LENGTH;

/// Errors decoding a stored vault record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("vault record must be {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },

    #[error("vault record field: {0}")]
    Field(#[from] AmountError),
}

/// One collateralized position.
///
/// `debt` is the outstanding stablecoin liability and `collateral` the
/// reserve asset held against it. Both are non-negative while the record is
/// reachable; nothing enforces a ratio at rest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub debt: Amount,
    pub collateral: Amount,
}

impl Vault {
    /// The baseline for a key that has never held a vault.
    pub const EMPTY: Vault = Vault {
        debt: Amount::ZERO,
        collateral: Amount::ZERO,
    };

    pub fn new(debt: Amount, collateral: Amount) -> Self {
        Self { debt, collateral }
    }

    /// Collateral valued in stablecoin units at `price`.
    pub fn collateral_value(&self, price: Amount) -> AmountResult<Amount> {
        self.collateral.checked_mul(price)
    }

    /// `debt / (collateral × price)`.
    ///
    /// `None` when the collateral is worth nothing but debt is outstanding,
    /// i.e. the ratio is unbounded.
    pub fn debt_ratio(&self, price: Amount) -> AmountResult<Option<Amount>> {
        let value = self.collateral_value(price)?;
        if value.is_zero() {
            return Ok(if self.debt.is_zero() {
                Some(Amount::ZERO)
            } else {
                None
            });
        }
        self.debt.checked_div(value).map(Some)
    }

    /// `debt ++ collateral`, 8 bytes each.
    pub fn to_bytes(&self) -> [u8; VAULT_RECORD_LENGTH] {
        let mut out = [0u8; VAULT_RECORD_LENGTH];
        out[..ENCODED_LEN].copy_from_slice(&self.debt.to_bytes());
        out[ENCODED_LEN..].copy_from_slice(&self.collateral.to_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() != VAULT_RECORD_LENGTH {
            return Err(RecordError::Length {
                expected: VAULT_RECORD_LENGTH,
                got: bytes.len(),
            });
        }

        let mut debt = [0u8; ENCODED_LEN];
        debt.copy_from_slice(&bytes[..ENCODED_LEN]);
        let mut collateral = [0u8; ENCODED_LEN];
        collateral.copy_from_slice(&bytes[ENCODED_LEN..]);

        Ok(Self {
            debt: Amount::from_bytes(debt)?,
            collateral: Amount::from_bytes(collateral)?,
        })
    }
}
