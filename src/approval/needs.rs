//! Which signatures a ward transaction requires
//!
//! Derived from the ward account's on-chain configuration, read fresh for
//! every initiation, and copied into the request so both devices agree on it.

use crate::felt::Felt;
use crate::intent::TransactionIntent;
use crate::tokens::TokenRegistry;
use crate::{Error, Result};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Guardian configuration stored on the ward account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WardPolicy {
    pub guardian_address: Felt,
    /// Per-transaction limit in base units; `None` means no limit.
    #[serde(default)]
    pub spending_limit: Option<U256>,
    #[serde(default)]
    pub require_guardian_for_all: bool,
    #[serde(default)]
    pub ward_2fa_enabled: bool,
    #[serde(default)]
    pub guardian_2fa_enabled: bool,
    #[serde(default)]
    pub frozen: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WardApprovalNeeds {
    pub needs_guardian: bool,
    pub needs_ward_2fa: bool,
    pub needs_guardian_2fa: bool,
    pub guardian_address: Felt,
}

impl WardPolicy {
    /// Evaluate the policy for one intent.
    ///
    /// Intents without an amount (e.g. rollover) only need the guardian when
    /// the policy requires it for everything.
    pub fn evaluate(
        &self,
        intent: &TransactionIntent,
        tokens: &TokenRegistry,
    ) -> Result<WardApprovalNeeds> {
        if self.frozen {
            return Err(Error::Config(
                "Ward account is frozen by its guardian".to_string(),
            ));
        }
        if self.guardian_address == Felt::ZERO {
            return Err(Error::Config(
                "Ward account has no guardian configured".to_string(),
            ));
        }

        let over_limit = match (self.spending_limit, intent.amount.as_deref()) {
            (Some(limit), Some(amount)) => {
                let base_units = tokens.base_units(&intent.token, amount)?;
                tracing::debug!(
                    token = %intent.token,
                    amount = %amount,
                    limit = %limit,
                    "Checking ward spending limit"
                );
                base_units > limit
            }
            _ => false,
        };

        let needs_guardian = self.require_guardian_for_all || over_limit;
        Ok(WardApprovalNeeds {
            needs_guardian,
            needs_ward_2fa: self.ward_2fa_enabled,
            needs_guardian_2fa: needs_guardian && self.guardian_2fa_enabled,
            guardian_address: self.guardian_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Action;

    fn policy() -> WardPolicy {
        WardPolicy {
            guardian_address: Felt::from(0x222u64),
            spending_limit: Some(U256::from(10_000_000u64)), // 10 USDC
            require_guardian_for_all: false,
            ward_2fa_enabled: false,
            guardian_2fa_enabled: true,
            frozen: false,
        }
    }

    fn transfer(amount: &str) -> TransactionIntent {
        TransactionIntent::new(Action::Transfer, "USDC").with_amount(amount)
    }

    #[test]
    fn under_limit_skips_guardian() {
        let needs = policy().evaluate(&transfer("10"), &TokenRegistry::new()).unwrap();
        assert!(!needs.needs_guardian);
        assert!(!needs.needs_guardian_2fa);
    }

    #[test]
    fn over_limit_needs_guardian_and_its_second_factor() {
        let needs = policy()
            .evaluate(&transfer("10.000001"), &TokenRegistry::new())
            .unwrap();
        assert!(needs.needs_guardian);
        assert!(needs.needs_guardian_2fa);
        assert_eq!(needs.guardian_address, Felt::from(0x222u64));
    }

    #[test]
    fn guardian_for_all_covers_amountless_intents() {
        let mut p = policy();
        p.require_guardian_for_all = true;
        let rollover = TransactionIntent::new(Action::Rollover, "STRK");
        assert!(p.evaluate(&rollover, &TokenRegistry::new()).unwrap().needs_guardian);
    }

    #[test]
    fn frozen_ward_is_a_configuration_error() {
        let mut p = policy();
        p.frozen = true;
        let err = p.evaluate(&transfer("1"), &TokenRegistry::new()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn unknown_token_with_limit_is_rejected() {
        let intent = TransactionIntent::new(Action::Transfer, "DOGE").with_amount("1");
        assert!(policy().evaluate(&intent, &TokenRegistry::new()).is_err());
    }
}
