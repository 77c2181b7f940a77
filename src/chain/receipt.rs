//! Transaction receipts and revert-reason extraction
//!
//! SECURITY NOTE:
//! - Receipts are public chain data; nothing here touches key material

use crate::felt::Felt;
use crate::{Error, Result};
use alloy::hex;
use serde::{Deserialize, Serialize};

/// Execution status reported by the chain for an accepted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Succeeded,
    Reverted { reason: String },
}

/// Receipt returned by `wait_for_transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: Felt,
    pub execution: ExecutionStatus,
}

impl TxReceipt {
    pub fn succeeded(tx_hash: Felt) -> Self {
        Self {
            tx_hash,
            execution: ExecutionStatus::Succeeded,
        }
    }

    pub fn reverted(tx_hash: Felt, reason: impl Into<String>) -> Self {
        Self {
            tx_hash,
            execution: ExecutionStatus::Reverted {
                reason: reason.into(),
            },
        }
    }

    /// Turn a reverted receipt into a `ChainRejection` carrying the
    /// human-readable reason.
    pub fn into_result(self) -> Result<Felt> {
        match self.execution {
            ExecutionStatus::Succeeded => Ok(self.tx_hash),
            ExecutionStatus::Reverted { reason } => {
                Err(Error::ChainRejection(parse_revert_reason(&reason)))
            }
        }
    }
}

/// Extract the user-facing part of a revert trace.
///
/// Traces look like `... Failure reason: 0x4e6f ('No').` or end in a bare
/// short-string felt. Anything else is returned unchanged.
pub fn parse_revert_reason(raw: &str) -> String {
    if let Some(start) = raw.find("Failure reason:") {
        let tail = raw[start + "Failure reason:".len()..].trim();

        // Quoted decoded text: ('...')
        if let Some(open) = tail.find("('") {
            let quoted = &tail[open + 2..];
            if let Some(close) = quoted.find("')") {
                return quoted[..close].to_string();
            }
        }

        // Bare felt: decode as a short string
        let token: String = tail
            .chars()
            .take_while(|c| c.is_ascii_hexdigit() || *c == 'x')
            .collect();
        if let Some(decoded) = decode_short_string(&token) {
            return decoded;
        }
        return tail.trim_end_matches('.').to_string();
    }

    raw.to_string()
}

fn decode_short_string(token: &str) -> Option<String> {
    let digits = token.strip_prefix("0x")?;
    let padded = if digits.len() % 2 == 1 {
        format!("0{}", digits)
    } else {
        digits.to_string()
    };
    let bytes = hex::decode(padded).ok()?;
    let filtered: Vec<u8> = bytes.into_iter().filter(|&b| b != 0).collect();
    if filtered.is_empty() || !filtered.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        return None;
    }
    String::from_utf8(filtered).ok()
}
