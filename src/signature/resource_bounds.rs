//! Resource bounds: fee limits bound into the transaction hash
//!
//! In memory every quantity is an exact `U256`; on the wire each is a hex
//! string. No floating point anywhere: the safety margin on gas prices is an
//! integer percentage.

use crate::chain::GasPrices;
use crate::felt::Felt;
use crate::{Error, Result};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Short-string names the chain uses when packing bounds into the hash.
const L1_GAS_NAME: &str = "L1_GAS";
const L2_GAS_NAME: &str = "L2_GAS";
const L1_DATA_GAS_NAME: &str = "L1_DATA";

/// Limits for a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "ResourceBoundWire", try_from = "ResourceBoundWire")]
pub struct ResourceBound {
    pub max_amount: U256,
    pub max_price_per_unit: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResourceBoundWire {
    max_amount: String,
    max_price_per_unit: String,
}

impl From<ResourceBound> for ResourceBoundWire {
    fn from(bound: ResourceBound) -> Self {
        Self {
            max_amount: Felt::from_u256(bound.max_amount).to_hex(),
            max_price_per_unit: Felt::from_u256(bound.max_price_per_unit).to_hex(),
        }
    }
}

impl TryFrom<ResourceBoundWire> for ResourceBound {
    type Error = Error;

    fn try_from(wire: ResourceBoundWire) -> Result<Self> {
        Ok(Self {
            max_amount: Felt::from_hex(&wire.max_amount)?.as_u256(),
            max_price_per_unit: Felt::from_hex(&wire.max_price_per_unit)?.as_u256(),
        })
    }
}

impl ResourceBound {
    pub fn new(max_amount: U256, max_price_per_unit: U256) -> Self {
        Self {
            max_amount,
            max_price_per_unit,
        }
    }

    /// `name << 192 | max_amount << 128 | max_price_per_unit`
    ///
    /// Fails instead of truncating when an amount exceeds 64 bits or a
    /// price exceeds 128 bits.
    pub(crate) fn hash_word(&self, name: &str) -> Result<Felt> {
        if self.max_amount.bit_len() > 64 {
            return Err(Error::InvalidArgument(format!(
                "{} max_amount does not fit in 64 bits",
                name
            )));
        }
        if self.max_price_per_unit.bit_len() > 128 {
            return Err(Error::InvalidArgument(format!(
                "{} max_price_per_unit does not fit in 128 bits",
                name
            )));
        }
        let name = Felt::from_short_string(name)?.as_u256();
        let word = (name << 192) | (self.max_amount << 128) | self.max_price_per_unit;
        Ok(Felt::from_u256(word))
    }
}

/// Fee limits for all three resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceBounds {
    pub l1_gas: ResourceBound,
    pub l2_gas: ResourceBound,
    pub l1_data_gas: ResourceBound,
}

/// Gas quantities we are willing to spend per transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasAllowance {
    pub l1_gas: u64,
    pub l2_gas: u64,
    pub l1_data_gas: u64,
}

impl Default for GasAllowance {
    fn default() -> Self {
        Self {
            l1_gas: 0,
            l2_gas: 30_000_000,
            l1_data_gas: 2_000,
        }
    }
}

impl ResourceBounds {
    /// Derive bounds from current block prices plus a percentage margin.
    ///
    /// `price_margin_percent = 150` means prices are capped at 1.5x the
    /// observed block price, rounded up.
    pub fn from_gas_prices(
        prices: &GasPrices,
        allowance: &GasAllowance,
        price_margin_percent: u64,
    ) -> Self {
        let margin = |price: U256| -> U256 {
            let scaled = price * U256::from(price_margin_percent);
            let hundred = U256::from(100u64);
            let (quotient, remainder) = scaled.div_rem(hundred);
            if remainder.is_zero() {
                quotient
            } else {
                quotient + U256::from(1u64)
            }
        };

        Self {
            l1_gas: ResourceBound::new(U256::from(allowance.l1_gas), margin(prices.l1_gas_price)),
            l2_gas: ResourceBound::new(U256::from(allowance.l2_gas), margin(prices.l2_gas_price)),
            l1_data_gas: ResourceBound::new(
                U256::from(allowance.l1_data_gas),
                margin(prices.l1_data_gas_price),
            ),
        }
    }

    /// Packed words in the order the transaction hash commits to them.
    pub(crate) fn hash_words(&self) -> Result<[Felt; 3]> {
        Ok([
            self.l1_gas.hash_word(L1_GAS_NAME)?,
            self.l2_gas.hash_word(L2_GAS_NAME)?,
            self.l1_data_gas.hash_word(L1_DATA_GAS_NAME)?,
        ])
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn prices() -> GasPrices {
        GasPrices {
            l1_gas_price: U256::from(1_000u64),
            l2_gas_price: U256::from(3u64),
            l1_data_gas_price: U256::from(7u64),
        }
    }

    #[test]
    fn wire_format_is_hex_strings() {
        let bounds = ResourceBounds {
            l1_gas: ResourceBound::new(U256::ZERO, U256::from(255u64)),
            l2_gas: ResourceBound::new(U256::from(16u64), U256::from(1u64)),
            l1_data_gas: ResourceBound::default(),
        };
        let value: serde_json::Value = serde_json::from_str(&bounds.to_json().unwrap()).unwrap();
        assert_eq!(value["l1_gas"]["max_amount"], "0x0");
        assert_eq!(value["l1_gas"]["max_price_per_unit"], "0xff");
        assert_eq!(value["l2_gas"]["max_amount"], "0x10");
    }

    #[test]
    fn margin_rounds_up() {
        let bounds = ResourceBounds::from_gas_prices(&prices(), &GasAllowance::default(), 150);
        assert_eq!(bounds.l1_gas.max_price_per_unit, U256::from(1_500u64));
        // 3 * 1.5 = 4.5 -> 5
        assert_eq!(bounds.l2_gas.max_price_per_unit, U256::from(5u64));
        // 7 * 1.5 = 10.5 -> 11
        assert_eq!(bounds.l1_data_gas.max_price_per_unit, U256::from(11u64));
        assert_eq!(bounds.l2_gas.max_amount, U256::from(30_000_000u64));
    }

    #[test]
    fn hash_word_packs_name_amount_price() {
        let bound = ResourceBound::new(U256::from(2u64), U256::from(3u64));
        let word = bound.hash_word("L2_GAS").unwrap().as_u256();
        let name = Felt::from_short_string("L2_GAS").unwrap().as_u256();
        assert_eq!(word >> 192, name);
        assert_eq!((word >> 128) & U256::from(u64::MAX), U256::from(2u64));
        assert_eq!(word & U256::from(u128::MAX), U256::from(3u64));
    }

    #[test]
    fn hash_words_use_the_chain_resource_names() {
        let words = ResourceBounds::default().hash_words().unwrap();
        let names: Vec<U256> = words.iter().map(|w| w.as_u256() >> 192).collect();
        assert_eq!(
            names,
            vec![
                U256::from(0x4c315f474153u64),
                U256::from(0x4c325f474153u64),
                U256::from(0x4c315f44415441u64),
            ]
        );
    }

    #[test]
    fn hash_word_refuses_to_truncate() {
        let wide_amount = ResourceBound::new(U256::from(1u64) << 64, U256::ZERO);
        assert!(wide_amount.hash_word("L1_GAS").is_err());
        let wide_price = ResourceBound::new(U256::ZERO, U256::from(1u64) << 128);
        assert!(wide_price.hash_word("L1_GAS").is_err());
    }

    #[test]
    fn malformed_wire_is_rejected() {
        let json = r#"{"l1_gas":{"max_amount":"12","max_price_per_unit":"nope"},
            "l2_gas":{"max_amount":"0x0","max_price_per_unit":"0x0"},
            "l1_data_gas":{"max_amount":"0x0","max_price_per_unit":"0x0"}}"#;
        assert!(ResourceBounds::from_json(json).is_err());
    }

    fn arb_u256() -> impl Strategy<Value = U256> {
        (any::<u128>(), any::<u128>(), 0u32..=256).prop_map(|(hi, lo, bits)| {
            let value = (U256::from(hi) << 128) | U256::from(lo);
            if bits == 256 {
                value
            } else {
                value & ((U256::from(1u64) << bits as usize) - U256::from(1u64))
            }
        })
    }

    proptest! {
        #[test]
        fn json_round_trip_is_lossless(
            a in arb_u256(), b in arb_u256(), c in arb_u256(),
            d in arb_u256(), e in arb_u256(), f in arb_u256(),
        ) {
            let bounds = ResourceBounds {
                l1_gas: ResourceBound::new(a, b),
                l2_gas: ResourceBound::new(c, d),
                l1_data_gas: ResourceBound::new(e, f),
            };
            let json = bounds.to_json().unwrap();
            prop_assert_eq!(ResourceBounds::from_json(&json).unwrap(), bounds);
        }

        #[test]
        fn round_trip_at_two_pow_128(offset in 0u64..1_000) {
            let value = (U256::from(1u64) << 128) + U256::from(offset);
            let bound = ResourceBound::new(value, value - U256::from(1u64));
            let json = serde_json::to_string(&bound).unwrap();
            let back: ResourceBound = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, bound);
        }
    }
}
