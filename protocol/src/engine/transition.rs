//! # Vault Transitions
//!
//! The decision logic of the engine as two pure functions:
//!
//! ```text
//! screen(event, authorization, config)            -> Screen | EngineError
//! apply(event, route, vault at route.key, price, config) -> VaultChange | EngineError
//! ```
//!
//! No I/O happens here. [`Engine`](super::Engine) screens the event, reads
//! the vault the route names, calls [`apply`], and commits the change.
//!
//! ## Liquidation
//!
//! A vault is liquidatable when `debt / (collateral × price)` exceeds the
//! liquidation ratio. A vault whose collateral is worthless but still owes
//! something is always liquidatable.
//!
//! ## Reserve deposit (mint)
//!
//! ```text
//! collateral' = collateral + amount
//! maxDebt     = collateral' × price × NEW_RATIO
//! toMint      = maxDebt − debt
//! toMint < 0  → owner: keep the collateral, mint nothing
//!               takeover: InsufficientTakeoverDeposit
//! otherwise   → debt' = debt + toMint, pay toMint stablecoin
//! ```
//!
//! ## Stablecoin deposit (redeem)
//!
//! ```text
//! debt'         = max(debt − amount, 0)
//! maxCollateral = debt' / price × NEW_RATIO
//! toRedeem      = collateral − maxCollateral
//! toRedeem < 0  → owner: keep the repayment, redeem nothing
//!                 takeover: InsufficientTakeoverDeposit
//! otherwise     → collateral' = maxCollateral, pay toRedeem reserve
//! ```
//!
//! The redemption ceiling applies NEW_RATIO to `debt' / price` directly, so a
//! redeemed vault is left with collateral worth half its debt.
//!
//! A successful takeover moves the vault from the target key to the
//! depositor's `(sender, tag)` key.

use crate::amount::{Amount, AmountResult, Ratio};
use crate::asset::InboundAsset;
use crate::config::{EngineConfig, RESERVE_DECIMALS};
use crate::settlement::{OutboundTransfer, Payout};
use crate::storage::VaultWrite;
use crate::vault::{Vault, VaultKey};

use super::error::{AcceptCode, EngineError};
use super::event::{DepositEvent, Mode};

/// Whether the sender passed the credential check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    Denied,
}

impl From<bool> for Authorization {
    fn from(granted: bool) -> Self {
        if granted {
            Authorization::Granted
        } else {
            Authorization::Denied
        }
    }
}

/// Which vault an event acts on, decided before any state is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    pub mode: Mode,
    /// Where the vault is read from.
    pub key: VaultKey,
    /// The sender's own key; where a takeover moves the vault.
    pub sender_key: VaultKey,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    PassThrough,
    Route(Route),
}

/// A committed change to one vault.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VaultChange {
    pub code: AcceptCode,
    pub from: VaultKey,
    pub to: VaultKey,
    pub before: Vault,
    pub after: Vault,
    pub transfer: Option<OutboundTransfer>,
}

impl VaultChange {
    pub fn relocates(&self) -> bool {
        self.from != self.to
    }

    /// The store writes that realize this change, in order.
    pub fn writes(&self) -> Vec<VaultWrite> {
        if self.relocates() {
            vec![
                VaultWrite::Delete(self.from),
                VaultWrite::Put(self.to, self.after),
            ]
        } else {
            vec![VaultWrite::Put(self.to, self.after)]
        }
    }
}

// ---------------------------------------------------------------------------
// Screening
// ---------------------------------------------------------------------------

/// Checks that need neither vault state nor a price.
pub fn screen(
    event: &DepositEvent,
    authorization: Authorization,
    config: &EngineConfig,
) -> Result<Screen, EngineError> {
    if event.sender == config.engine_account {
        return Ok(Screen::PassThrough);
    }
    if authorization == Authorization::Denied {
        return Err(EngineError::Unauthorized(event.sender));
    }
    if !event.amount.is_positive() {
        return Err(EngineError::MalformedEvent(format!(
            "deposit amount {} is not positive",
            event.amount
        )));
    }

    let sender_key = event.sender_key();
    let route = match event.takeover_target {
        Some(target) if target != sender_key => Route {
            mode: Mode::Takeover,
            key: target,
            sender_key,
        },
        _ => Route {
            mode: Mode::Owner,
            key: sender_key,
            sender_key,
        },
    };
    Ok(Screen::Route(route))
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// `debt / (collateral × price) > ratio`.
pub fn is_liquidatable(vault: &Vault, price: Amount, ratio: Ratio) -> AmountResult<bool> {
    match vault.debt_ratio(price)? {
        Some(current) => Ok(current > ratio.to_amount()?),
        None => Ok(true),
    }
}

/// Computes the change a screened event makes to the vault at `route.key`.
pub fn apply(
    event: &DepositEvent,
    route: &Route,
    current: Option<Vault>,
    price: Amount,
    config: &EngineConfig,
) -> Result<VaultChange, EngineError> {
    if !price.is_positive() {
        return Err(EngineError::InvalidPrice(price));
    }

    match event.asset {
        InboundAsset::Reserve => {
            let before = match (route.mode, current) {
                (_, Some(vault)) => vault,
                (Mode::Owner, None) => Vault::EMPTY,
                (Mode::Takeover, None) => return Err(EngineError::NoSuchVault(route.key)),
            };
            mint(event, route, before, price, config)
        }
        InboundAsset::Issued { issuer, currency } => {
            let before = current.ok_or(EngineError::NoSuchVault(route.key))?;
            if issuer != config.stablecoin.issuer {
                return Err(EngineError::ForeignIssuer {
                    expected: config.stablecoin.issuer,
                    got: issuer,
                });
            }
            if currency != config.stablecoin.currency {
                return Err(EngineError::ForeignCurrency {
                    expected: config.stablecoin.currency,
                    got: currency,
                });
            }
            redeem(event, route, before, price, config)
        }
    }
}

fn mint(
    event: &DepositEvent,
    route: &Route,
    before: Vault,
    price: Amount,
    config: &EngineConfig,
) -> Result<VaultChange, EngineError> {
    let liquidatable = is_liquidatable(&before, price, config.risk.liquidation_ratio)?;

    let collateral = before.collateral.checked_add(event.amount)?;
    let max_debt = collateral
        .checked_mul(price)?
        .scale(config.risk.new_ratio)?;
    if max_debt.is_negative() {
        return Err(EngineError::InternalComputation(format!(
            "debt ceiling {max_debt} is negative"
        )));
    }

    let to_mint = max_debt.checked_sub(before.debt)?;
    tracing::debug!(
        key = %route.key,
        %collateral,
        %max_debt,
        %to_mint,
        liquidatable,
        "reserve deposit evaluated"
    );

    if to_mint.is_negative() {
        return match route.mode {
            Mode::Owner => Ok(VaultChange {
                code: AcceptCode::AbsorbedReserve,
                from: route.key,
                to: route.key,
                before,
                after: Vault::new(before.debt, collateral),
                transfer: None,
            }),
            Mode::Takeover => Err(EngineError::InsufficientTakeoverDeposit(route.key)),
        };
    }

    let (code, to) = match route.mode {
        Mode::Owner => (AcceptCode::Minted, route.key),
        Mode::Takeover if liquidatable => (AcceptCode::TakeoverMinted, route.sender_key),
        Mode::Takeover => return Err(EngineError::NotYetLiquidatable(route.key)),
    };

    let after = Vault::new(before.debt.checked_add(to_mint)?, collateral);
    let transfer = (!to_mint.is_zero()).then(|| OutboundTransfer {
        recipient: event.sender,
        vault: to,
        payout: Payout::Stablecoin {
            amount: to_mint,
            issuer: config.stablecoin.issuer,
            currency: config.stablecoin.currency,
        },
    });

    Ok(VaultChange {
        code,
        from: route.key,
        to,
        before,
        after,
        transfer,
    })
}

fn redeem(
    event: &DepositEvent,
    route: &Route,
    before: Vault,
    price: Amount,
    config: &EngineConfig,
) -> Result<VaultChange, EngineError> {
    let liquidatable = is_liquidatable(&before, price, config.risk.liquidation_ratio)?;

    // Overpayment is kept by the engine; debt never goes negative.
    let debt = before.debt.checked_sub(event.amount)?.max(Amount::ZERO);
    let max_collateral = debt
        .checked_div(price)?
        .scale(config.risk.new_ratio)?;
    if max_collateral.is_negative() {
        return Err(EngineError::InternalComputation(format!(
            "collateral ceiling {max_collateral} is negative"
        )));
    }

    let to_redeem = before.collateral.checked_sub(max_collateral)?;
    tracing::debug!(
        key = %route.key,
        %debt,
        %max_collateral,
        %to_redeem,
        liquidatable,
        "stablecoin deposit evaluated"
    );

    if to_redeem.is_negative() {
        return match route.mode {
            Mode::Owner => Ok(VaultChange {
                code: AcceptCode::AbsorbedStablecoin,
                from: route.key,
                to: route.key,
                before,
                after: Vault::new(debt, before.collateral),
                transfer: None,
            }),
            Mode::Takeover => Err(EngineError::InsufficientTakeoverDeposit(route.key)),
        };
    }

    let (code, to) = match route.mode {
        Mode::Owner => (AcceptCode::Redeemed, route.key),
        Mode::Takeover if liquidatable => (AcceptCode::TakeoverRedeemed, route.sender_key),
        Mode::Takeover => return Err(EngineError::NotYetLiquidatable(route.key)),
    };

    let drops = to_redeem.to_minor_units(RESERVE_DECIMALS)?;
    let transfer = (drops > 0).then(|| OutboundTransfer {
        recipient: event.sender,
        vault: to,
        payout: Payout::Reserve { drops },
    });

    Ok(VaultChange {
        code,
        from: route.key,
        to,
        before,
        after: Vault::new(debt, max_collateral),
        transfer,
    })
}
