//! # Credentials
//!
//! An account may only deal with the engine once it has opened a trustline
//! toward it for the stablecoin with a limit of at least
//! [`REQUIRED_TRUSTLINE_LIMIT`]. Without the line a minted payout could not
//! be delivered, so the deposit is refused before any vault is read.

use dashmap::DashMap;

use crate::config::REQUIRED_TRUSTLINE_LIMIT;
use crate::vault::AccountId;

pub trait CredentialCheck: Send + Sync {
    fn has_authorization(&self, account: &AccountId) -> bool;
}

/// Known trustline limits, keyed by account.
#[derive(Debug)]
pub struct TrustlineRegistry {
    limits: DashMap<AccountId, u64>,
    required: u64,
}

impl TrustlineRegistry {
    pub fn new() -> Self {
        Self::with_required_limit(REQUIRED_TRUSTLINE_LIMIT)
    }

    pub fn with_required_limit(required: u64) -> Self {
        Self {
            limits: DashMap::new(),
            required,
        }
    }

    /// Records (or replaces) the account's limit. A limit of zero removes
    /// the line.
    pub fn set_limit(&self, account: AccountId, limit: u64) {
        if limit == 0 {
            self.limits.remove(&account);
        } else {
            self.limits.insert(account, limit);
        }
        tracing::debug!(%account, limit, "trustline updated");
    }

    pub fn limit(&self, account: &AccountId) -> Option<u64> {
        self.limits.get(account).map(|entry| *entry.value())
    }

    pub fn required_limit(&self) -> u64 {
        self.required
    }
}

impl Default for TrustlineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialCheck for TrustlineRegistry {
    fn has_authorization(&self, account: &AccountId) -> bool {
        self.limit(account).is_some_and(|limit| limit >= self.required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_threshold_is_inclusive() {
        let registry = TrustlineRegistry::new();
        let alice = AccountId([1; 20]);
        assert!(!registry.has_authorization(&alice));

        registry.set_limit(alice, REQUIRED_TRUSTLINE_LIMIT - 1);
        assert!(!registry.has_authorization(&alice));

        registry.set_limit(alice, REQUIRED_TRUSTLINE_LIMIT);
        assert!(registry.has_authorization(&alice));

        registry.set_limit(alice, 0);
        assert_eq!(registry.limit(&alice), None);
        assert!(!registry.has_authorization(&alice));
    }
}
