//! Key handling, transaction hashing and signing
//!
//! This module handles private key storage and transaction signing.
//! Private keys NEVER leave this module.

mod hash;
mod keys;
mod signer;

pub use hash::{compute_invoke_v3_hash, InvokeHashParams, TRANSACTION_VERSION};
pub use keys::{env_vars, KeyStore, LocalKeyStore};
pub use signer::{
    verify_signature, DualKeySigner, HashSigner, PresignedSigner, SingleKeySigner,
    StarkKeySigner, TransactionSigner,
};
