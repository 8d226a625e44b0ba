//! # Vault Module — Keys and Records
//!
//! A vault is a `(debt, collateral)` pair addressed by a [`VaultKey`]. This
//! module holds the value types only; the state machine that mutates vaults
//! lives in [`crate::engine`] and persistence in [`crate::storage`].
//!
//! ```text
//! key.rs     — AccountId, SourceTag, VaultKey, invoice-id form
//! record.rs  — Vault and its 16-byte record encoding
//! ```

pub mod key;
pub mod record;

pub use key::{AccountId, KeyError, SourceTag, VaultKey};
pub use record::{RecordError, Vault};
