//! Shared token registry
//!
//! Token metadata (symbol, decimals) used to turn a user-facing amount such
//! as `"12.5"` into base units before it is compared against a ward's
//! spending limit. Conversion is exact integer arithmetic.

use crate::{Error, Result};
use alloy::primitives::U256;
use std::collections::HashMap;

/// Token metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    /// Token symbol (e.g., "STRK", "USDC")
    pub symbol: &'static str,
    /// Number of decimals
    pub decimals: u8,
}

impl TokenInfo {
    pub const fn new(symbol: &'static str, decimals: u8) -> Self {
        Self { symbol, decimals }
    }

    /// Convert a decimal amount to base units.
    ///
    /// `"1.5"` with 18 decimals is `1_500_000_000_000_000_000`. A `0x`
    /// prefixed value is taken as base units already. More fractional
    /// digits than the token has is an error, never a rounding.
    pub fn to_base_units(&self, amount: &str) -> Result<U256> {
        let amount = amount.trim();
        if let Some(hex) = amount.strip_prefix("0x") {
            return U256::from_str_radix(hex, 16)
                .map_err(|e| Error::InvalidArgument(format!("Invalid hex amount: {}", e)));
        }

        let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(Error::InvalidArgument("Empty amount".to_string()));
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidArgument(format!("Invalid amount: {}", amount)));
        }
        if fraction.len() > self.decimals as usize {
            return Err(Error::InvalidArgument(format!(
                "{} supports at most {} decimals",
                self.symbol, self.decimals
            )));
        }

        let padded = format!(
            "{}{}{}",
            whole,
            fraction,
            "0".repeat(self.decimals as usize - fraction.len())
        );
        let digits = padded.trim_start_matches('0');
        if digits.is_empty() {
            return Ok(U256::ZERO);
        }
        U256::from_str_radix(digits, 10)
            .map_err(|e| Error::InvalidArgument(format!("Amount out of range: {}", e)))
    }
}

/// Well-known tokens
pub mod known {
    use super::TokenInfo;

    pub const STRK: TokenInfo = TokenInfo::new("STRK", 18);
    pub const ETH: TokenInfo = TokenInfo::new("ETH", 18);
    pub const USDC: TokenInfo = TokenInfo::new("USDC", 6);
}

/// Token registry providing token info lookups by symbol (case-insensitive)
pub struct TokenRegistry {
    tokens: HashMap<String, TokenInfo>,
}

impl TokenRegistry {
    /// Create a new token registry with all known tokens
    pub fn new() -> Self {
        let mut registry = Self {
            tokens: HashMap::new(),
        };
        for info in [known::STRK, known::ETH, known::USDC] {
            registry.register(info);
        }
        registry
    }

    pub fn register(&mut self, info: TokenInfo) {
        self.tokens.insert(info.symbol.to_ascii_uppercase(), info);
    }

    pub fn get(&self, symbol: &str) -> Option<&TokenInfo> {
        self.tokens.get(&symbol.to_ascii_uppercase())
    }

    /// Amount of `symbol` in base units.
    pub fn base_units(&self, symbol: &str, amount: &str) -> Result<U256> {
        let info = self
            .get(symbol)
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown token: {}", symbol)))?;
        info.to_base_units(amount)
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}
