//! Single-key execution

use super::DirectPath;
use crate::chain::{ChainClient, InvokeRequest};
use crate::intent::{CallSet, TransactionIntent, TxOutcome};
use crate::wallet::{KeyStore, SingleKeySigner};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub struct DirectExecutor {
    chain: Arc<dyn ChainClient>,
    keys: Arc<dyn KeyStore>,
}

impl DirectExecutor {
    pub fn new(chain: Arc<dyn ChainClient>, keys: Arc<dyn KeyStore>) -> Self {
        Self { chain, keys }
    }
}

#[async_trait]
impl DirectPath for DirectExecutor {
    async fn execute_direct(
        &self,
        intent: &TransactionIntent,
        calls: CallSet,
    ) -> Result<TxOutcome> {
        let sender = self.keys.account_address();
        tracing::info!(
            sender = %sender,
            action = %intent.action,
            amount = intent.amount.as_deref().unwrap_or("-"),
            "Submitting transaction"
        );
        let signer = SingleKeySigner::new(self.keys.primary());
        let tx_hash = self
            .chain
            .submit_invoke(InvokeRequest::new(sender, calls), &signer)
            .await?;
        Ok(TxOutcome { tx_hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::test_support::{sample_calls, MockChain};
    use crate::approval::WardPolicy;
    use crate::felt::Felt;
    use crate::intent::Action;
    use crate::wallet::{LocalKeyStore, StarkKeySigner};

    #[tokio::test]
    async fn signs_with_primary_only() {
        let chain = Arc::new(MockChain::new(WardPolicy {
            guardian_address: Felt::from(1u64),
            spending_limit: None,
            require_guardian_for_all: false,
            ward_2fa_enabled: false,
            guardian_2fa_enabled: false,
            frozen: false,
        }));
        let keys = LocalKeyStore::new(
            Felt::from(0xaaau64),
            Arc::new(StarkKeySigner::from_hex("0x1234").unwrap()),
        );
        let exec = DirectExecutor::new(chain.clone(), Arc::new(keys));
        let intent = TransactionIntent::new(Action::Fund, "STRK").with_amount("1");

        let outcome = exec.execute_direct(&intent, sample_calls()).await.unwrap();
        assert_ne!(outcome.tx_hash, Felt::ZERO);
        assert_eq!(chain.last_signature_len(), 2);
    }
}
