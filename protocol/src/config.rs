//! # Protocol Configuration & Constants
//!
//! Every fixed number the vault engine depends on lives here, plus the
//! runtime [`EngineConfig`] a host hands to the engine at construction.
//!
//! The collateral ratios and the record layouts are part of the stored
//! state's meaning. Changing them under a live database reinterprets every
//! vault in it, so treat them as a migration, not a tweak.

use serde::{Deserialize, Serialize};

use crate::amount::Ratio;
use crate::asset::{CurrencyCode, StablecoinIdentity};
use crate::vault::AccountId;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Version string reported by the node's `/status` and `version` command.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Collateralization
// ---------------------------------------------------------------------------

/// Debt-to-collateral-value ratio a vault is brought to when minting or
/// redeeming. 2/4 means every stablecoin unit is backed by two units of
/// reserve value.
pub const NEW_COLLATERAL_RATIO: Ratio = Ratio::new(2, 4);

/// Debt-to-collateral-value ratio above which a vault may be taken over.
pub const LIQUIDATION_RATIO: Ratio = Ratio::new(5, 6);

/// Minimum trustline limit (in stablecoin units) an account must extend to
/// the engine before any deposit from it is considered.
pub const REQUIRED_TRUSTLINE_LIMIT: u64 = 10_000_000_000;

/// Decimal places of the reserve asset's integer unit (drops).
pub const RESERVE_DECIMALS: u32 = 6;

/// Currency code of the default stablecoin.
pub const DEFAULT_CURRENCY: &str = "USD";

// ---------------------------------------------------------------------------
// Layouts
// ---------------------------------------------------------------------------

/// Ledger account identifier length.
pub const ACCOUNT_ID_LENGTH: usize = 20;

/// Account id plus a 4-byte source tag.
pub const VAULT_KEY_LENGTH: usize = ACCOUNT_ID_LENGTH + 4;

/// A vault key zero-padded to a 32-byte invoice id.
pub const INVOICE_ID_LENGTH: usize = 32;

/// Debt and collateral, 8 bytes each.
pub const VAULT_RECORD_LENGTH: usize = 16;

/// Currency code length in the ledger's 20-byte layout.
pub const CURRENCY_CODE_LENGTH: usize = 20;

/// Source tag stored for payments that carry none.
pub const NO_SOURCE_TAG: u32 = 0xFFFF_FFFF;

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// The two collateralization ratios the engine enforces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Ratio a mint or redemption brings the vault to.
    pub new_ratio: Ratio,
    /// Ratio strictly above which a vault is liquidatable.
    pub liquidation_ratio: Ratio,
}

impl RiskParams {
    /// Both ratios must be proper non-zero fractions and the liquidation
    /// threshold must sit above the target ratio, otherwise a freshly minted
    /// vault would be liquidatable.
    pub fn validate(&self) -> Result<(), String> {
        for (name, ratio) in [
            ("new_ratio", self.new_ratio),
            ("liquidation_ratio", self.liquidation_ratio),
        ] {
            if ratio.numerator == 0 || ratio.denominator == 0 {
                return Err(format!("{name} {ratio} has a zero term"));
            }
        }

        let new = u64::from(self.new_ratio.numerator) * u64::from(self.liquidation_ratio.denominator);
        let liq = u64::from(self.liquidation_ratio.numerator) * u64::from(self.new_ratio.denominator);
        if new >= liq {
            return Err(format!(
                "new_ratio {} must be below liquidation_ratio {}",
                self.new_ratio, self.liquidation_ratio
            ));
        }
        Ok(())
    }
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            new_ratio: NEW_COLLATERAL_RATIO,
            liquidation_ratio: LIQUIDATION_RATIO,
        }
    }
}

/// Everything the engine needs to know about the world it runs in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The engine's own ledger account. Payments from it are the engine's
    /// own settlements echoing back and are passed through untouched.
    pub engine_account: AccountId,
    /// Which issued currency counts as the stablecoin.
    pub stablecoin: StablecoinIdentity,
    #[serde(default)]
    pub risk: RiskParams,
}

impl EngineConfig {
    /// An engine that issues its own default-currency stablecoin.
    pub fn new(engine_account: AccountId) -> Self {
        Self {
            engine_account,
            stablecoin: StablecoinIdentity {
                issuer: engine_account,
                currency: CurrencyCode::standard(DEFAULT_CURRENCY)
                    .unwrap_or(CurrencyCode::ZERO),
            },
            risk: RiskParams::default(),
        }
    }
}
