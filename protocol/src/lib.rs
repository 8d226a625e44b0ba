// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # PegVault Protocol — Core Library
//!
//! A collateralized-debt vault engine for an oracle-priced stablecoin.
//! Accounts lock the ledger's reserve asset in a vault and receive freshly
//! minted stablecoin against it; paying stablecoin back releases reserve.
//! When a vault's debt outgrows its collateral, anyone may take it over by
//! depositing enough to restore it, and the vault becomes theirs.
//!
//! ## Architecture
//!
//! - **amount** — 16-digit deterministic decimal. No floats near money.
//! - **vault** — vault keys, invoice ids, and the 16-byte vault record.
//! - **asset** — reserve vs. issued assets and the stablecoin identity.
//! - **engine** — the mint / redeem / takeover state machine.
//! - **storage** — the `VaultStore` seam, in-memory and sled backends.
//! - **oracle** — where the reserve price comes from.
//! - **credential** — who is allowed to deal with the engine at all.
//! - **settlement** — how payouts leave the engine.
//! - **config** — protocol constants and `EngineConfig`.
//!
//! ## Design Philosophy
//!
//! 1. The decision logic is a pure function; every side effect lives in
//!    `Engine`.
//! 2. A deposit either changes exactly the vault it names (and the key it
//!    moves to) or changes nothing.
//! 3. If it touches money, it has tests. Plural.

pub mod amount;
pub mod asset;
pub mod config;
pub mod credential;
pub mod engine;
pub mod oracle;
pub mod settlement;
pub mod storage;
pub mod vault;

pub use amount::Amount;
pub use engine::{DepositEvent, Engine, EngineError, EngineResult};
pub use vault::{AccountId, SourceTag, Vault, VaultKey};
