//! Deposit events: what the host hands the engine for every inbound payment.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::asset::{InboundAsset, StablecoinIdentity};
use crate::vault::{AccountId, SourceTag, VaultKey};

/// One inbound payment to the engine's account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub asset: InboundAsset,
    /// Must be strictly positive.
    pub amount: Amount,
    pub sender: AccountId,
    /// `None` is stored as tag `0xFFFFFFFF`.
    #[serde(default)]
    pub source_tag: Option<u32>,
    /// The vault a liquidator wants to take over, if any.
    #[serde(default)]
    pub takeover_target: Option<VaultKey>,
}

impl DepositEvent {
    pub fn reserve(sender: AccountId, amount: Amount) -> Self {
        Self {
            asset: InboundAsset::Reserve,
            amount,
            sender,
            source_tag: None,
            takeover_target: None,
        }
    }

    pub fn stablecoin(sender: AccountId, amount: Amount, coin: StablecoinIdentity) -> Self {
        Self {
            asset: coin.into(),
            ..Self::reserve(sender, amount)
        }
    }

    pub fn with_tag(mut self, tag: u32) -> Self {
        self.source_tag = Some(tag);
        self
    }

    pub fn taking_over(mut self, target: VaultKey) -> Self {
        self.takeover_target = Some(target);
        self
    }

    pub fn tag(&self) -> SourceTag {
        SourceTag::from(self.source_tag)
    }

    /// The sender's own vault for this tag.
    pub fn sender_key(&self) -> VaultKey {
        VaultKey::new(self.sender, self.tag())
    }
}

/// Whose vault the event acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// The sender's own vault.
    Owner,
    /// Someone else's vault, which moves to the sender on success.
    Takeover,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tag_keys_to_sentinel() {
        let event = DepositEvent::reserve(AccountId([1; 20]), Amount::from_integer(5));
        assert_eq!(event.sender_key().tag, SourceTag::NONE);
        assert_eq!(event.clone().with_tag(3).sender_key().tag, SourceTag(3));
    }

    #[test]
    fn json_accepts_invoice_id_target() {
        let target = VaultKey::new(AccountId([0xAB; 20]), SourceTag(9));
        let json = format!(
            r#"{{"asset":{{"kind":"reserve"}},"amount":"150","sender":"{}","source_tag":4,"takeover_target":"{}"}}"#,
            AccountId([0xCD; 20]),
            hex::encode(target.to_invoice_id()),
        );
        let event: DepositEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.takeover_target, Some(target));
        assert_eq!(event.amount, Amount::from_integer(150));
        assert_eq!(event.tag(), SourceTag(4));
    }
}
