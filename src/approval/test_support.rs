//! Shared fixtures for unit tests

use super::provisioning::{DeployedWard, WardDeployment};
use super::request::ApprovalRequest;
use super::state::ApprovalStatus;
use super::WardPolicy;
use crate::chain::{ChainClient, GasPrices, InvokeRequest, TxReceipt, TxStatus};
use crate::felt::Felt;
use crate::intent::{Action, Call, CallSet};
use crate::signature::ResourceBounds;
use crate::wallet::{compute_invoke_v3_hash, InvokeHashParams, TransactionSigner};
use crate::{Error, Result};
use alloy::primitives::U256;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Mutex;

pub(crate) fn sample_calls() -> CallSet {
    CallSet::new(vec![Call {
        contract_address: Felt::from(0x0511u64),
        entrypoint_selector: Felt::from(0x0222u64),
        calldata: vec![Felt::from(7u64), Felt::from(1000u64)],
    }])
}

pub(crate) fn sample_request() -> ApprovalRequest {
    let now = Utc::now();
    ApprovalRequest {
        id: "req-1".to_string(),
        ward_address: Felt::from(0x111u64),
        guardian_address: Felt::from(0x222u64),
        action: Action::Transfer,
        token: "STRK".to_string(),
        amount: Some("1.5".to_string()),
        recipient: Some("0x333".to_string()),
        calls_json: sample_calls().to_json().unwrap(),
        status: ApprovalStatus::PendingWardSig,
        nonce: None,
        resource_bounds_json: None,
        tx_hash: None,
        ward_sig_json: None,
        ward_2fa_sig_json: None,
        guardian_sig_json: None,
        guardian_2fa_sig_json: None,
        needs_guardian: true,
        needs_ward_2fa: false,
        needs_guardian_2fa: false,
        final_tx_hash: None,
        error_message: None,
        created_at: now,
        expires_at: now + chrono::Duration::seconds(600),
        responded_at: None,
    }
}

#[derive(Default)]
struct ChainState {
    nonce: u64,
    submissions: usize,
    last_signature: Vec<Felt>,
    revert: Option<String>,
    unreachable: bool,
    accepted: HashSet<Felt>,
    deployed: HashSet<Felt>,
    deploy_calls: usize,
}

/// Chain double that hashes and signs the way a real client would.
pub(crate) struct MockChain {
    policy: WardPolicy,
    state: Mutex<ChainState>,
}

impl MockChain {
    pub(crate) const CHAIN_ID: &'static str = "SN_SEPOLIA";

    pub(crate) fn new(policy: WardPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(ChainState::default()),
        }
    }

    pub(crate) fn submissions(&self) -> usize {
        self.state.lock().unwrap().submissions
    }

    pub(crate) fn deploy_calls(&self) -> usize {
        self.state.lock().unwrap().deploy_calls
    }

    pub(crate) fn last_signature_len(&self) -> usize {
        self.state.lock().unwrap().last_signature.len()
    }

    pub(crate) fn set_nonce(&self, nonce: Felt) {
        self.state.lock().unwrap().nonce = nonce.as_u256().to::<u64>();
    }

    pub(crate) fn revert_with(&self, reason: &str) {
        self.state.lock().unwrap().revert = Some(reason.to_string());
    }

    /// Make every broadcast fail as if the node could not be reached.
    pub(crate) fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    fn receipt(state: &ChainState, tx_hash: &Felt) -> TxReceipt {
        match &state.revert {
            Some(reason) => TxReceipt::reverted(*tx_hash, reason.clone()),
            None => TxReceipt::succeeded(*tx_hash),
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_nonce(&self, _address: &Felt) -> Result<Felt> {
        Ok(Felt::from(self.state.lock().unwrap().nonce))
    }

    async fn chain_id(&self) -> Result<Felt> {
        Felt::from_short_string(Self::CHAIN_ID)
    }

    async fn block_gas_prices(&self) -> Result<GasPrices> {
        Ok(GasPrices {
            l1_gas_price: U256::from(30_000_000_000u64),
            l2_gas_price: U256::from(8_000_000u64),
            l1_data_gas_price: U256::from(1_000u64),
        })
    }

    async fn submit_invoke(
        &self,
        request: InvokeRequest,
        signer: &dyn TransactionSigner,
    ) -> Result<Felt> {
        let nonce = match request.nonce {
            Some(nonce) => nonce,
            None => Felt::from(self.state.lock().unwrap().nonce),
        };
        let bounds = match request.resource_bounds {
            Some(bounds) => bounds,
            None => ResourceBounds::from_gas_prices(
                &self.block_gas_prices().await?,
                &Default::default(),
                150,
            ),
        };
        let calldata = request.calls.execute_calldata();
        let hash = compute_invoke_v3_hash(&InvokeHashParams {
            sender_address: request.sender_address,
            calldata: &calldata,
            chain_id: self.chain_id().await?,
            nonce,
            resource_bounds: &bounds,
        })?;
        let signature = signer.sign_transaction(&hash).await?;

        let mut state = self.state.lock().unwrap();
        if state.unreachable {
            return Err(Error::Network("connection refused".to_string()));
        }
        state.submissions += 1;
        state.accepted.insert(hash);
        state.last_signature = signature;
        state.nonce += 1;
        Ok(hash)
    }

    async fn wait_for_transaction(&self, tx_hash: &Felt) -> Result<TxReceipt> {
        Ok(Self::receipt(&self.state.lock().unwrap(), tx_hash))
    }

    async fn transaction_status(&self, tx_hash: &Felt) -> Result<TxStatus> {
        let state = self.state.lock().unwrap();
        if state.accepted.contains(tx_hash) {
            Ok(TxStatus::Executed(Self::receipt(&state, tx_hash)))
        } else {
            Ok(TxStatus::NotFound)
        }
    }

    async fn ward_policy(&self, _ward_address: &Felt) -> Result<WardPolicy> {
        Ok(self.policy.clone())
    }

    async fn deploy_ward(&self, deployment: &WardDeployment) -> Result<DeployedWard> {
        let mut state = self.state.lock().unwrap();
        state.deploy_calls += 1;
        if deployment.public_key == Felt::ZERO {
            return Err(Error::InvalidArgument("zero public key".to_string()));
        }
        let address = Felt::from_u256(deployment.public_key.as_u256() + U256::from(0x1000u64));
        state.deployed.insert(address);
        Ok(DeployedWard {
            address,
            tx_hash: Felt::from(0xdeadu64),
        })
    }

    async fn is_deployed(&self, address: &Felt) -> Result<bool> {
        Ok(self.state.lock().unwrap().deployed.contains(address))
    }
}
