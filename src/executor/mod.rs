//! Authorization path executors
//!
//! The router hands a prepared `CallSet` to exactly one of these. Each
//! returns the accepted transaction hash or a typed error and never retries
//! on another path.

mod direct;
mod dual_sig;

pub use direct::DirectExecutor;
pub use dual_sig::{BiometricGate, BiometricOutcome, DualSigExecutor};

use crate::intent::{CallSet, TransactionIntent, TxOutcome};
use crate::Result;
use async_trait::async_trait;

/// Turns an intent into the unsigned calls that implement it.
#[async_trait]
pub trait CallPreparer: Send + Sync {
    async fn prepare(&self, intent: &TransactionIntent) -> Result<CallSet>;
}

/// Guardian-mediated path for ward accounts.
#[async_trait]
pub trait WardExecutor: Send + Sync {
    async fn execute_ward(&self, intent: &TransactionIntent, calls: CallSet) -> Result<TxOutcome>;
}

/// Device-local two-key path.
#[async_trait]
pub trait DualSigPath: Send + Sync {
    async fn execute_dual_sig(&self, calls: CallSet) -> Result<TxOutcome>;
}

/// Single-key path.
#[async_trait]
pub trait DirectPath: Send + Sync {
    async fn execute_direct(&self, intent: &TransactionIntent, calls: CallSet)
        -> Result<TxOutcome>;
}
