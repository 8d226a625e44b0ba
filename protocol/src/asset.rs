//! # Assets
//!
//! The engine deals in exactly two assets: the ledger's native reserve asset
//! and one issued stablecoin. Issued currencies are named by issuer account
//! plus a 20-byte currency code.
//!
//! ```text
//! standard code "USD":
//!   00 00 00 00 00 00 00 00 00 00 00 00 | 'U' 'S' 'D' | 00 00 00 00 00
//!   ^--------- 12 zero bytes ----------^               ^-- 5 zero --^
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::CURRENCY_CODE_LENGTH;
use crate::vault::AccountId;

const STANDARD_CODE_OFFSET: usize = 12;
const STANDARD_CODE_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    /// Standard codes are three printable ASCII characters.
    #[error("invalid standard currency code {0:?}")]
    InvalidStandardCode(String),

    #[error("invalid currency code: {0}")]
    InvalidCode(String),
}

// ---------------------------------------------------------------------------
// CurrencyCode
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CurrencyCode(pub [u8; CURRENCY_CODE_LENGTH]);

impl CurrencyCode {
    pub const ZERO: CurrencyCode = CurrencyCode([0; CURRENCY_CODE_LENGTH]);

    /// Lays a three-letter code out the way the ledger does.
    pub fn standard(code: &str) -> Result<Self, AssetError> {
        let bytes = code.as_bytes();
        if bytes.len() != STANDARD_CODE_LEN
            || !bytes.iter().all(|b| b.is_ascii_graphic())
        {
            return Err(AssetError::InvalidStandardCode(code.to_string()));
        }

        let mut out = [0u8; CURRENCY_CODE_LENGTH];
        out[STANDARD_CODE_OFFSET..STANDARD_CODE_OFFSET + STANDARD_CODE_LEN].copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// The three-letter form, if this code uses the standard layout.
    pub fn as_standard(&self) -> Option<&str> {
        let (prefix, rest) = self.0.split_at(STANDARD_CODE_OFFSET);
        let (code, suffix) = rest.split_at(STANDARD_CODE_LEN);
        let layout_ok = prefix.iter().all(|b| *b == 0)
            && suffix.iter().all(|b| *b == 0)
            && code.iter().all(|b| b.is_ascii_graphic());
        if !layout_ok {
            return None;
        }
        std::str::from_utf8(code).ok()
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_standard() {
            Some(code) => f.write_str(code),
            None => f.write_str(&hex::encode_upper(self.0)),
        }
    }
}

impl fmt::Debug for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurrencyCode({})", self)
    }
}

impl FromStr for CurrencyCode {
    type Err = AssetError;

    /// Accepts a three-letter code or 40 hex characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() == STANDARD_CODE_LEN {
            return Self::standard(s);
        }
        let bytes = hex::decode(s).map_err(|e| AssetError::InvalidCode(e.to_string()))?;
        let raw: [u8; CURRENCY_CODE_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AssetError::InvalidCode(format!("{} bytes", bytes.len())))?;
        Ok(Self(raw))
    }
}

impl Serialize for CurrencyCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Stablecoin identity & inbound assets
// ---------------------------------------------------------------------------

/// The issued currency the engine mints and accepts for redemption.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StablecoinIdentity {
    pub issuer: AccountId,
    pub currency: CurrencyCode,
}

/// What arrived with a deposit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundAsset {
    /// The ledger's native asset.
    Reserve,
    /// An issued currency. Only the configured stablecoin is accepted.
    Issued {
        issuer: AccountId,
        currency: CurrencyCode,
    },
}

impl InboundAsset {
    pub fn is_reserve(&self) -> bool {
        matches!(self, InboundAsset::Reserve)
    }
}

impl From<StablecoinIdentity> for InboundAsset {
    fn from(id: StablecoinIdentity) -> Self {
        InboundAsset::Issued {
            issuer: id.issuer,
            currency: id.currency,
        }
    }
}

impl fmt::Display for InboundAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundAsset::Reserve => f.write_str("reserve"),
            InboundAsset::Issued { issuer, currency } => write!(f, "{currency}/{issuer}"),
        }
    }
}
