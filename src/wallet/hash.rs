//! Invoke (v3) transaction hash
//!
//! The hash every signer in the pipeline commits to:
//!
//! ```text
//! poseidon(
//!     "invoke", version, sender_address,
//!     poseidon(tip, l1_gas_bound, l2_gas_bound, l1_data_gas_bound),
//!     poseidon(paymaster_data), chain_id, nonce, data_availability_modes,
//!     poseidon(account_deployment_data), poseidon(calldata),
//! )
//! ```

use crate::felt::Felt;
use crate::signature::ResourceBounds;
use crate::Result;
use starknet_crypto::{poseidon_hash_many, FieldElement};

const INVOKE_PREFIX: &str = "invoke";
pub const TRANSACTION_VERSION: u64 = 3;

/// Everything the hash binds.
#[derive(Debug, Clone, Copy)]
pub struct InvokeHashParams<'a> {
    pub sender_address: Felt,
    pub calldata: &'a [Felt],
    pub chain_id: Felt,
    pub nonce: Felt,
    pub resource_bounds: &'a ResourceBounds,
}

fn to_fields(values: &[Felt]) -> Result<Vec<FieldElement>> {
    values.iter().map(|v| v.to_field()).collect()
}

/// Deterministic: identical parameters always give the identical hash.
pub fn compute_invoke_v3_hash(params: &InvokeHashParams<'_>) -> Result<Felt> {
    let words = params.resource_bounds.hash_words()?;
    invoke_hash(params, &words)
}

/// The hash over an explicit list of packed resource words. Transactions
/// from before the `L1_DATA` bound existed commit to `[l1_gas, l2_gas]` only.
fn invoke_hash(params: &InvokeHashParams<'_>, resource_words: &[Felt]) -> Result<Felt> {
    let tip = FieldElement::ZERO;
    let mut fee_fields = Vec::with_capacity(1 + resource_words.len());
    fee_fields.push(tip);
    fee_fields.extend(to_fields(resource_words)?);
    let fee_fields_hash = poseidon_hash_many(&fee_fields);

    // No paymaster, no deployment data, L1 data availability for both
    // nonce and fee.
    let paymaster_hash = poseidon_hash_many(&[]);
    let deployment_hash = poseidon_hash_many(&[]);
    let data_availability_modes = FieldElement::ZERO;

    let calldata_hash = poseidon_hash_many(&to_fields(params.calldata)?);

    let hash = poseidon_hash_many(&[
        Felt::from_short_string(INVOKE_PREFIX)?.to_field()?,
        FieldElement::from(TRANSACTION_VERSION),
        params.sender_address.to_field()?,
        fee_fields_hash,
        paymaster_hash,
        params.chain_id.to_field()?,
        params.nonce.to_field()?,
        data_availability_modes,
        deployment_hash,
        calldata_hash,
    ]);

    Ok(Felt::from_field(hash))
}
