//! Approval request record
//!
//! One row of the approval table. Field names are the wire names both
//! devices read and write.

use super::state::ApprovalStatus;
use crate::felt::Felt;
use crate::intent::{Action, CallSet, TransactionIntent};
use crate::signature::{ResourceBounds, SignaturePair};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const DEFAULT_TABLE: &str = "ward_approval_requests";

/// Column names used in filters.
pub mod columns {
    pub const ID: &str = "id";
    pub const WARD_ADDRESS: &str = "ward_address";
    pub const GUARDIAN_ADDRESS: &str = "guardian_address";
    pub const STATUS: &str = "status";
    pub const TX_HASH: &str = "tx_hash";
    pub const CREATED_AT: &str = "created_at";
    pub const EXPIRES_AT: &str = "expires_at";
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    #[serde(default)]
    pub id: String,
    pub ward_address: Felt,
    pub guardian_address: Felt,
    pub action: Action,
    pub token: String,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    pub calls_json: String,
    pub status: ApprovalStatus,
    #[serde(default)]
    pub nonce: Option<Felt>,
    #[serde(default)]
    pub resource_bounds_json: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<Felt>,
    #[serde(default)]
    pub ward_sig_json: Option<String>,
    #[serde(default)]
    pub ward_2fa_sig_json: Option<String>,
    #[serde(default)]
    pub guardian_sig_json: Option<String>,
    #[serde(default)]
    pub guardian_2fa_sig_json: Option<String>,
    #[serde(default)]
    pub needs_guardian: bool,
    #[serde(default)]
    pub needs_ward_2fa: bool,
    #[serde(default)]
    pub needs_guardian_2fa: bool,
    #[serde(default)]
    pub final_tx_hash: Option<Felt>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
}

fn parse_signature(field: &Option<String>) -> Result<Option<SignaturePair>> {
    field.as_deref().map(SignaturePair::from_json).transpose()
}

impl ApprovalRequest {
    pub fn from_record(record: Value) -> Result<Self> {
        Ok(serde_json::from_value(record)?)
    }

    /// Record for insertion; an empty id is left for the store to assign.
    pub fn to_insert_record(&self) -> Result<Value> {
        let mut record = serde_json::to_value(self)?;
        if self.id.is_empty() {
            if let Some(obj) = record.as_object_mut() {
                obj.remove(columns::ID);
            }
        }
        Ok(record)
    }

    pub fn intent(&self) -> TransactionIntent {
        TransactionIntent {
            action: self.action,
            token: self.token.clone(),
            amount: self.amount.clone(),
            recipient: self.recipient.clone(),
        }
    }

    pub fn call_set(&self) -> Result<CallSet> {
        CallSet::from_json(&self.calls_json)
    }

    pub fn resource_bounds(&self) -> Result<Option<ResourceBounds>> {
        self.resource_bounds_json
            .as_deref()
            .map(ResourceBounds::from_json)
            .transpose()
    }

    pub fn ward_signature(&self) -> Result<Option<SignaturePair>> {
        parse_signature(&self.ward_sig_json)
    }

    pub fn ward_second_signature(&self) -> Result<Option<SignaturePair>> {
        parse_signature(&self.ward_2fa_sig_json)
    }

    pub fn guardian_signature(&self) -> Result<Option<SignaturePair>> {
        parse_signature(&self.guardian_sig_json)
    }

    pub fn guardian_second_signature(&self) -> Result<Option<SignaturePair>> {
        parse_signature(&self.guardian_2fa_sig_json)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Nonce, bounds and hash bound on an earlier attempt, if all present.
    pub fn bound_transaction(&self) -> Result<Option<(Felt, ResourceBounds, Felt)>> {
        match (self.nonce, self.resource_bounds()?, self.tx_hash) {
            (Some(nonce), Some(bounds), Some(hash)) => Ok(Some((nonce, bounds, hash))),
            (None, None, None) => Ok(None),
            _ => Err(Error::InvalidArgument(format!(
                "request {} has a partially bound transaction",
                self.id
            ))),
        }
    }
}

impl fmt::Debug for ApprovalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalRequest")
            .field("id", &self.id)
            .field("ward_address", &self.ward_address)
            .field("guardian_address", &self.guardian_address)
            .field("action", &self.action)
            .field("token", &self.token)
            .field("amount", &self.amount)
            .field("status", &self.status)
            .field("tx_hash", &self.tx_hash)
            .field("has_ward_sig", &self.ward_sig_json.is_some())
            .field("has_guardian_sig", &self.guardian_sig_json.is_some())
            .field("needs_guardian", &self.needs_guardian)
            .field("final_tx_hash", &self.final_tx_hash)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
