//! Account identifiers, source tags, and the 24-byte vault key.
//!
//! ```text
//! VaultKey   = account (20 bytes) || source tag (4 bytes, big-endian)
//! Invoice id = account (20 bytes) || source tag (4 bytes) || 8 zero bytes
//! ```
//!
//! The invoice-id form is how a liquidator names someone else's vault when
//! taking it over.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{ACCOUNT_ID_LENGTH, INVOICE_ID_LENGTH, NO_SOURCE_TAG, VAULT_KEY_LENGTH};

/// Errors from parsing or decoding identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid hex: {0}")]
    Hex(String),

    #[error("expected {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },

    /// Bytes 24..32 of an invoice id must be zero.
    #[error("invoice id padding is not zero")]
    InvoicePadding,
}

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// A 20-byte ledger account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub [u8; ACCOUNT_ID_LENGTH]);

impl AccountId {
    pub fn as_bytes(&self) -> &[u8; ACCOUNT_ID_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.to_hex())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for AccountId {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(decode_fixed(s)?))
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// SourceTag
// ---------------------------------------------------------------------------

/// Sub-account discriminator carried on a payment.
///
/// A payment without a tag maps to [`SourceTag::NONE`] (`0xFFFFFFFF`), which
/// is a vault slot of its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceTag(pub u32);

impl SourceTag {
    pub const NONE: SourceTag = SourceTag(NO_SOURCE_TAG);

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl From<Option<u32>> for SourceTag {
    fn from(tag: Option<u32>) -> Self {
        tag.map(SourceTag).unwrap_or(Self::NONE)
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

// ---------------------------------------------------------------------------
// VaultKey
// ---------------------------------------------------------------------------

/// The address of one vault: owner account plus source tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VaultKey {
    pub account: AccountId,
    pub tag: SourceTag,
}

impl VaultKey {
    pub fn new(account: AccountId, tag: SourceTag) -> Self {
        Self { account, tag }
    }

    pub fn to_bytes(&self) -> [u8; VAULT_KEY_LENGTH] {
        let mut out = [0u8; VAULT_KEY_LENGTH];
        out[..ACCOUNT_ID_LENGTH].copy_from_slice(&self.account.0);
        out[ACCOUNT_ID_LENGTH..].copy_from_slice(&self.tag.0.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != VAULT_KEY_LENGTH {
            return Err(KeyError::Length {
                expected: VAULT_KEY_LENGTH,
                got: bytes.len(),
            });
        }

        let mut account = [0u8; ACCOUNT_ID_LENGTH];
        account.copy_from_slice(&bytes[..ACCOUNT_ID_LENGTH]);
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&bytes[ACCOUNT_ID_LENGTH..]);

        Ok(Self {
            account: AccountId(account),
            tag: SourceTag(u32::from_be_bytes(tag)),
        })
    }

    pub fn to_invoice_id(&self) -> [u8; INVOICE_ID_LENGTH] {
        let mut out = [0u8; INVOICE_ID_LENGTH];
        out[..VAULT_KEY_LENGTH].copy_from_slice(&self.to_bytes());
        out
    }

    pub fn from_invoice_id(invoice_id: &[u8]) -> Result<Self, KeyError> {
        if invoice_id.len() != INVOICE_ID_LENGTH {
            return Err(KeyError::Length {
                expected: INVOICE_ID_LENGTH,
                got: invoice_id.len(),
            });
        }
        if invoice_id[VAULT_KEY_LENGTH..].iter().any(|b| *b != 0) {
            return Err(KeyError::InvoicePadding);
        }
        Self::from_bytes(&invoice_id[..VAULT_KEY_LENGTH])
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.to_bytes())
    }
}

impl fmt::Display for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for VaultKey {
    type Err = KeyError;

    /// Accepts either the 48-hex-char key or the 64-hex-char invoice id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| KeyError::Hex(e.to_string()))?;
        match bytes.len() {
            INVOICE_ID_LENGTH => Self::from_invoice_id(&bytes),
            _ => Self::from_bytes(&bytes),
        }
    }
}

impl Serialize for VaultKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for VaultKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], KeyError> {
    let bytes = hex::decode(s.trim()).map_err(|e| KeyError::Hex(e.to_string()))?;
    bytes.as_slice().try_into().map_err(|_| KeyError::Length {
        expected: N,
        got: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> AccountId {
        AccountId([0xA1; 20])
    }

    #[test]
    fn key_layout_is_account_then_big_endian_tag() {
        let key = VaultKey::new(alice(), SourceTag(0x0102_0304));
        let bytes = key.to_bytes();
        assert_eq!(&bytes[..20], &[0xA1; 20]);
        assert_eq!(&bytes[20..], &[1, 2, 3, 4]);
        assert_eq!(VaultKey::from_bytes(&bytes).unwrap(), key);
    }

    #[test]
    fn missing_tag_is_all_ones() {
        let key = VaultKey::new(alice(), SourceTag::from(None));
        assert_eq!(&key.to_bytes()[20..], &[0xFF; 4]);
        assert!(key.tag.is_none());
        assert_eq!(key.tag.to_string(), "none");
    }

    #[test]
    fn same_account_different_tags_are_distinct() {
        let a = VaultKey::new(alice(), SourceTag(1));
        let b = VaultKey::new(alice(), SourceTag(2));
        assert_ne!(a, b);
        assert_ne!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn invoice_id_carries_key_and_zero_padding() {
        let key = VaultKey::new(alice(), SourceTag(7));
        let invoice = key.to_invoice_id();
        assert_eq!(&invoice[24..], &[0u8; 8]);
        assert_eq!(VaultKey::from_invoice_id(&invoice).unwrap(), key);

        let mut dirty = invoice;
        dirty[31] = 1;
        assert_eq!(
            VaultKey::from_invoice_id(&dirty),
            Err(KeyError::InvoicePadding)
        );
    }

    #[test]
    fn parse_accepts_key_or_invoice_hex() {
        let key = VaultKey::new(alice(), SourceTag(42));
        assert_eq!(key.to_hex().parse::<VaultKey>().unwrap(), key);
        let invoice_hex = hex::encode(key.to_invoice_id());
        assert_eq!(invoice_hex.parse::<VaultKey>().unwrap(), key);
        assert!("abcd".parse::<VaultKey>().is_err());
        assert!("zz".parse::<VaultKey>().is_err());
    }

    #[test]
    fn account_id_hex_roundtrip_via_serde() {
        let json = serde_json::to_string(&alice()).unwrap();
        assert_eq!(json, format!("\"{}\"", "A1".repeat(20)));
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, alice());
        assert!(serde_json::from_str::<AccountId>("\"A1A1\"").is_err());
    }
}
