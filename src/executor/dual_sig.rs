//! Dual-factor (2-of-2) local signing

use super::DualSigPath;
use crate::chain::{ChainClient, InvokeRequest};
use crate::intent::{CallSet, TxOutcome};
use crate::wallet::{DualKeySigner, KeyStore};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiometricOutcome {
    Confirmed,
    /// The user backed out of the prompt.
    Cancelled,
    /// The platform refused (lockout, no enrolled biometrics).
    Denied,
}

/// Platform biometric prompt.
#[async_trait]
pub trait BiometricGate: Send + Sync {
    async fn confirm(&self, reason: &str) -> Result<BiometricOutcome>;
}

pub struct DualSigExecutor {
    chain: Arc<dyn ChainClient>,
    keys: Arc<dyn KeyStore>,
    biometric: Arc<dyn BiometricGate>,
}

impl DualSigExecutor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        keys: Arc<dyn KeyStore>,
        biometric: Arc<dyn BiometricGate>,
    ) -> Self {
        Self {
            chain,
            keys,
            biometric,
        }
    }
}

#[async_trait]
impl DualSigPath for DualSigExecutor {
    async fn execute_dual_sig(&self, calls: CallSet) -> Result<TxOutcome> {
        match self.biometric.confirm("Confirm transaction").await? {
            BiometricOutcome::Confirmed => {}
            BiometricOutcome::Cancelled => {
                return Err(Error::UserCancelled("Biometric prompt cancelled".to_string()))
            }
            BiometricOutcome::Denied => {
                return Err(Error::UserCancelled("Biometric authentication denied".to_string()))
            }
        }

        let secondary = self.keys.secondary().ok_or_else(|| {
            Error::Config("Dual-factor signing is enabled but no secondary key is stored".to_string())
        })?;
        let signer = DualKeySigner::new(self.keys.primary(), secondary);

        let sender = self.keys.account_address();
        tracing::info!(sender = %sender, calls = calls.len(), "Submitting dual-signed transaction");
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
    use crate::wallet::{LocalKeyStore, StarkKeySigner};

    struct Gate(BiometricOutcome);

    #[async_trait]
    impl BiometricGate for Gate {
        async fn confirm(&self, _reason: &str) -> Result<BiometricOutcome> {
            Ok(self.0)
        }
    }

    fn chain() -> Arc<MockChain> {
        Arc::new(MockChain::new(WardPolicy {
            guardian_address: Felt::from(1u64),
            spending_limit: None,
            require_guardian_for_all: false,
            ward_2fa_enabled: false,
            guardian_2fa_enabled: false,
            frozen: false,
        }))
    }

    fn keys(with_secondary: bool) -> Arc<dyn KeyStore> {
        let mut keys = LocalKeyStore::new(
            Felt::from(0xaaau64),
            Arc::new(StarkKeySigner::from_hex("0x1234").unwrap()),
        );
        if with_secondary {
            keys = keys.with_secondary(Arc::new(StarkKeySigner::from_hex("0x5678").unwrap()));
        }
        Arc::new(keys)
    }

    #[tokio::test]
    async fn submits_two_signatures() {
        let chain = chain();
        let exec = DualSigExecutor::new(chain.clone(), keys(true), Arc::new(Gate(BiometricOutcome::Confirmed)));
        exec.execute_dual_sig(sample_calls()).await.unwrap();
        assert_eq!(chain.submissions(), 1);
        assert_eq!(chain.last_signature_len(), 4);
    }

    #[tokio::test]
    async fn cancelled_prompt_never_signs() {
        let chain = chain();
        for outcome in [BiometricOutcome::Cancelled, BiometricOutcome::Denied] {
            let exec = DualSigExecutor::new(chain.clone(), keys(true), Arc::new(Gate(outcome)));
            let err = exec.execute_dual_sig(sample_calls()).await.unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::UserCancelled);
        }
        assert_eq!(chain.submissions(), 0);
    }

    #[tokio::test]
    async fn missing_secondary_key_is_configuration() {
        let chain = chain();
        let exec = DualSigExecutor::new(chain.clone(), keys(false), Arc::new(Gate(BiometricOutcome::Confirmed)));
        let err = exec.execute_dual_sig(sample_calls()).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert_eq!(chain.submissions(), 0);
    }
}
