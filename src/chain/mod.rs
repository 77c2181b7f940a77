//! Chain RPC collaborator
//!
//! The pipeline never talks to a node directly; it consumes this trait.
//! Implementations wrap whatever RPC client the host application uses.

mod receipt;

pub use receipt::{parse_revert_reason, ExecutionStatus, TxReceipt};

use crate::approval::{DeployedWard, WardDeployment, WardPolicy};
use crate::felt::Felt;
use crate::intent::CallSet;
use crate::signature::ResourceBounds;
use crate::wallet::TransactionSigner;
use crate::Result;
use alloy::primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Gas prices of the latest block, in the fee token's smallest unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GasPrices {
    pub l1_gas_price: U256,
    pub l2_gas_price: U256,
    pub l1_data_gas_price: U256,
}

/// An invoke to submit from `sender_address`.
///
/// `nonce` and `resource_bounds` are pinned when a signature was produced in
/// advance over a specific hash; otherwise the client fills them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequest {
    pub sender_address: Felt,
    pub calls: CallSet,
    pub nonce: Option<Felt>,
    pub resource_bounds: Option<ResourceBounds>,
}

impl InvokeRequest {
    pub fn new(sender_address: Felt, calls: CallSet) -> Self {
        Self {
            sender_address,
            calls,
            nonce: None,
            resource_bounds: None,
        }
    }

    pub fn pinned(mut self, nonce: Felt, resource_bounds: ResourceBounds) -> Self {
        self.nonce = Some(nonce);
        self.resource_bounds = Some(resource_bounds);
        self
    }
}

/// What the chain knows about a transaction hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Never seen, so it is safe to broadcast.
    NotFound,
    /// Accepted into the mempool but not executed yet.
    Received,
    Executed(TxReceipt),
}

impl TxStatus {
    pub fn is_known(&self) -> bool {
        !matches!(self, TxStatus::NotFound)
    }
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_nonce(&self, address: &Felt) -> Result<Felt>;

    async fn chain_id(&self) -> Result<Felt>;

    async fn block_gas_prices(&self) -> Result<GasPrices>;

    /// Compute the transaction hash, obtain the signature from `signer` and
    /// broadcast. Returns the hash the chain accepted.
    async fn submit_invoke(
        &self,
        request: InvokeRequest,
        signer: &dyn TransactionSigner,
    ) -> Result<Felt>;

    async fn wait_for_transaction(&self, tx_hash: &Felt) -> Result<TxReceipt>;

    /// Look a hash up without waiting. An unknown hash is `NotFound`, not
    /// an error.
    async fn transaction_status(&self, tx_hash: &Felt) -> Result<TxStatus>;

    /// Read the ward account's guardian configuration.
    async fn ward_policy(&self, ward_address: &Felt) -> Result<WardPolicy>;

    async fn deploy_ward(&self, deployment: &WardDeployment) -> Result<DeployedWard>;

    async fn is_deployed(&self, address: &Felt) -> Result<bool>;
}
