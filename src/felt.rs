//! Field element newtype shared by calls, hashes and signatures
//!
//! Held as an arbitrary-precision `U256` in memory and as a minimal
//! `0x`-prefixed lowercase hex string on the wire. Conversion into the
//! Stark field happens only at the hashing/signing boundary.

use crate::{Error, Result};
use alloy::hex;
use alloy::primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use starknet_crypto::FieldElement;
use std::fmt;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Felt(U256);

impl Felt {
    pub const ZERO: Felt = Felt(U256::ZERO);

    pub const fn from_u256(value: U256) -> Self {
        Self(value)
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    /// Parse a hex string, with or without `0x` prefix.
    pub fn from_hex(input: &str) -> Result<Self> {
        let trimmed = input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))
            .unwrap_or(input);
        if trimmed.is_empty() || trimmed.len() > 64 {
            return Err(Error::InvalidArgument(format!(
                "Invalid felt hex: {:?}",
                input
            )));
        }
        U256::from_str_radix(trimmed, 16)
            .map(Self)
            .map_err(|e| Error::InvalidArgument(format!("Invalid felt hex {:?}: {}", input, e)))
    }

    /// Encode an ASCII short string (at most 31 bytes) as a felt.
    pub fn from_short_string(s: &str) -> Result<Self> {
        if !s.is_ascii() || s.len() > 31 {
            return Err(Error::InvalidArgument(format!(
                "Not a short string: {:?}",
                s
            )));
        }
        Ok(Self(U256::from_be_slice(s.as_bytes())))
    }

    pub fn to_hex(&self) -> String {
        let encoded = hex::encode(self.0.to_be_bytes::<32>());
        let trimmed = encoded.trim_start_matches('0');
        if trimmed.is_empty() {
            "0x0".to_string()
        } else {
            format!("0x{}", trimmed)
        }
    }

    pub(crate) fn to_field(self) -> Result<FieldElement> {
        FieldElement::from_bytes_be(&self.0.to_be_bytes::<32>()).map_err(|_| {
            Error::InvalidArgument(format!("{} is outside the Stark field", self.to_hex()))
        })
    }

    pub(crate) fn from_field(value: FieldElement) -> Self {
        Self(U256::from_be_slice(&value.to_bytes_be()))
    }
}

impl From<u64> for Felt {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for Felt {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl fmt::Display for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Felt({})", self.to_hex())
    }
}

impl std::str::FromStr for Felt {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Felt {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Felt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Felt::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
