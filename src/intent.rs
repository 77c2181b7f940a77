//! User intents and the prepared call sets they turn into

use crate::felt::Felt;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shielded-pool operations a user can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Fund,
    Transfer,
    Withdraw,
    Rollover,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Fund => "fund",
            Action::Transfer => "transfer",
            Action::Withdraw => "withdraw",
            Action::Rollover => "rollover",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fund" => Ok(Action::Fund),
            "transfer" => Ok(Action::Transfer),
            "withdraw" => Ok(Action::Withdraw),
            "rollover" => Ok(Action::Rollover),
            other => Err(Error::InvalidArgument(format!("Unknown action: {}", other))),
        }
    }
}

/// A single user action. Created per tap, consumed once by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub action: Action,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl TransactionIntent {
    pub fn new(action: Action, token: impl Into<String>) -> Self {
        Self {
            action,
            token: token.into(),
            amount: None,
            recipient: None,
        }
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }
}

/// One on-chain contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub contract_address: Felt,
    pub entrypoint_selector: Felt,
    pub calldata: Vec<Felt>,
}

/// Ordered calls produced by preparing an intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallSet(Vec<Call>);

impl CallSet {
    pub fn new(calls: Vec<Call>) -> Self {
        Self(calls)
    }

    pub fn calls(&self) -> &[Call] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Account `__execute__` calldata:
    /// `[n_calls, (to, selector, calldata_len, calldata...)*]`.
    pub fn execute_calldata(&self) -> Vec<Felt> {
        let mut out = Vec::with_capacity(1 + self.0.iter().map(|c| 3 + c.calldata.len()).sum::<usize>());
        out.push(Felt::from(self.0.len() as u64));
        for call in &self.0 {
            out.push(call.contract_address);
            out.push(call.entrypoint_selector);
            out.push(Felt::from(call.calldata.len() as u64));
            out.extend(call.calldata.iter().copied());
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Successful outcome of any authorization path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutcome {
    pub tx_hash: Felt,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_call() -> Call {
        Call {
            contract_address: Felt::from(0x100u64),
            entrypoint_selector: Felt::from(0x200u64),
            calldata: vec![Felt::from(1u64), Felt::from(2u64)],
        }
    }

    #[test]
    fn intent_serializes_lowercase_action() {
        let intent = TransactionIntent::new(Action::Fund, "STRK").with_amount("2");
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["action"], "fund");
        assert_eq!(json["amount"], "2");
        assert!(json.get("recipient").is_none());
    }

    #[test]
    fn execute_calldata_layout() {
        let calls = CallSet::new(vec![transfer_call(), transfer_call()]);
        let calldata = calls.execute_calldata();
        assert_eq!(calldata.len(), 1 + 2 * 5);
        assert_eq!(calldata[0], Felt::from(2u64));
        assert_eq!(calldata[1], Felt::from(0x100u64));
        assert_eq!(calldata[3], Felt::from(2u64));
    }

    #[test]
    fn call_set_json_is_stable() {
        let calls = CallSet::new(vec![transfer_call()]);
        let json = calls.to_json().unwrap();
        assert!(json.starts_with("[{"));
        assert_eq!(CallSet::from_json(&json).unwrap(), calls);
    }
}
