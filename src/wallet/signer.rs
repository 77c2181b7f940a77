//! Stark-curve key signers
//!
//! SECURITY: This is the ONLY place where private keys are used.
//! - Keys are held in `secrecy::SecretString` and exposed only to sign
//! - Keys are never serialized
//! - Keys and signatures are never logged

use crate::felt::Felt;
use crate::signature::{AssembledSignature, SignaturePair};
use crate::{Error, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use starknet_crypto::{get_public_key, rfc6979_generate_k, sign, FieldElement, SignError};
use std::sync::Arc;

/// Retries with a fresh RFC 6979 seed when a generated nonce is unusable.
const MAX_K_ATTEMPTS: u64 = 16;

/// Signs 252-bit hashes with one key.
#[async_trait]
pub trait HashSigner: Send + Sync {
    fn public_key(&self) -> Felt;

    async fn sign_hash(&self, hash: &Felt) -> Result<SignaturePair>;
}

/// Produces the complete signature array for a transaction hash.
///
/// This is the signer the chain client calls back into during submission.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_transaction(&self, tx_hash: &Felt) -> Result<Vec<Felt>>;
}

/// Private key held in memory.
pub struct StarkKeySigner {
    secret: SecretString,
    public_key: Felt,
}

impl StarkKeySigner {
    /// Create a signer from an environment variable holding a hex key.
    pub fn from_env(var_name: &str) -> Result<Self> {
        let key_hex = std::env::var(var_name).map_err(|_| {
            Error::Config(format!(
                "Environment variable {} not set. Required for signer initialization.",
                var_name
            ))
        })?;

        Self::from_hex(&key_hex)
    }

    /// Create a signer from a hex-encoded private key.
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let key = parse_private_key(key_hex)?;
        let public_key = Felt::from_field(get_public_key(&key));
        Ok(Self {
            secret: SecretString::from(key_hex.trim().to_string()),
            public_key,
        })
    }

    fn private_key(&self) -> Result<FieldElement> {
        parse_private_key(self.secret.expose_secret())
    }
}

fn parse_private_key(key_hex: &str) -> Result<FieldElement> {
    let key = FieldElement::from_hex_be(key_hex.trim())
        .map_err(|e| Error::Config(format!("Invalid private key: {:?}", e)))?;
    if key == FieldElement::ZERO {
        return Err(Error::Config("Invalid private key: zero".to_string()));
    }
    Ok(key)
}

#[async_trait]
impl HashSigner for StarkKeySigner {
    fn public_key(&self) -> Felt {
        self.public_key
    }

    async fn sign_hash(&self, hash: &Felt) -> Result<SignaturePair> {
        let key = self.private_key()?;
        let message = hash.to_field()?;

        let mut seed = FieldElement::ZERO;
        for _ in 0..MAX_K_ATTEMPTS {
            let k = rfc6979_generate_k(&message, &key, Some(&seed));
            match sign(&key, &message, &k) {
                Ok(sig) => {
                    return Ok(SignaturePair::new(
                        Felt::from_field(sig.r),
                        Felt::from_field(sig.s),
                    ))
                }
                Err(SignError::InvalidK) => seed = seed + FieldElement::ONE,
                Err(e) => return Err(Error::Signing(format!("{:?}", e))),
            }
        }
        Err(Error::Signing("no usable nonce found".to_string()))
    }
}

impl std::fmt::Debug for StarkKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StarkKeySigner")
            .field("public_key", &self.public_key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Check an `(r, s)` signature against a public key.
pub fn verify_signature(public_key: &Felt, hash: &Felt, sig: &SignaturePair) -> Result<bool> {
    starknet_crypto::verify(
        &public_key.to_field()?,
        &hash.to_field()?,
        &sig.r.to_field()?,
        &sig.s.to_field()?,
    )
    .map_err(|e| Error::Signing(format!("{:?}", e)))
}

/// Ordinary single-owner signature.
pub struct SingleKeySigner {
    key: Arc<dyn HashSigner>,
}

impl SingleKeySigner {
    pub fn new(key: Arc<dyn HashSigner>) -> Self {
        Self { key }
    }
}

#[async_trait]
impl TransactionSigner for SingleKeySigner {
    async fn sign_transaction(&self, tx_hash: &Felt) -> Result<Vec<Felt>> {
        let sig = self.key.sign_hash(tx_hash).await?;
        Ok(vec![sig.r, sig.s])
    }
}

/// 2-of-2 signature from two locally held keys: `[r1, s1, r2, s2]`.
pub struct DualKeySigner {
    primary: Arc<dyn HashSigner>,
    secondary: Arc<dyn HashSigner>,
}

impl DualKeySigner {
    pub fn new(primary: Arc<dyn HashSigner>, secondary: Arc<dyn HashSigner>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl TransactionSigner for DualKeySigner {
    async fn sign_transaction(&self, tx_hash: &Felt) -> Result<Vec<Felt>> {
        let first = self.primary.sign_hash(tx_hash).await?;
        let second = self.secondary.sign_hash(tx_hash).await?;
        Ok(vec![first.r, first.s, second.r, second.s])
    }
}

/// Hands back a signature collected ahead of time.
///
/// Refuses any hash other than the one the signature was made for, so a
/// submission whose parameters drifted fails instead of broadcasting an
/// invalid authorization.
pub struct PresignedSigner {
    expected_hash: Felt,
    signature: AssembledSignature,
}

impl PresignedSigner {
    pub fn new(expected_hash: Felt, signature: AssembledSignature) -> Self {
        Self {
            expected_hash,
            signature,
        }
    }
}

#[async_trait]
impl TransactionSigner for PresignedSigner {
    async fn sign_transaction(&self, tx_hash: &Felt) -> Result<Vec<Felt>> {
        if *tx_hash != self.expected_hash {
            return Err(Error::Signing(format!(
                "transaction hash {} differs from approved hash {}",
                tx_hash, self.expected_hash
            )));
        }
        Ok(self.signature.as_felts().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::assemble_segments;

    const TEST_KEY: &str = "0x1234567890abcdef1234567890abcdef";
    const OTHER_KEY: &str = "0xfedcba0987654321";

    #[tokio::test]
    async fn signs_and_verifies() {
        let signer = StarkKeySigner::from_hex(TEST_KEY).unwrap();
        let hash = Felt::from_hex("0x2a").unwrap();

        let sig = signer.sign_hash(&hash).await.unwrap();
        assert!(verify_signature(&signer.public_key(), &hash, &sig).unwrap());

        let other = Felt::from_hex("0x2b").unwrap();
        assert!(!verify_signature(&signer.public_key(), &other, &sig).unwrap());
    }

    #[tokio::test]
    async fn signing_is_deterministic() {
        let signer = StarkKeySigner::from_hex(TEST_KEY).unwrap();
        let hash = Felt::from(99u64);
        let a = signer.sign_hash(&hash).await.unwrap();
        let b = signer.sign_hash(&hash).await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(StarkKeySigner::from_hex("0x0").is_err());
        assert!(StarkKeySigner::from_hex("not-hex").is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let signer = StarkKeySigner::from_hex(TEST_KEY).unwrap();
        let debug_str = format!("{:?}", signer);
        assert!(!debug_str.contains("1234567890abcdef"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn dual_key_signer_orders_primary_first() {
        let primary: Arc<dyn HashSigner> = Arc::new(StarkKeySigner::from_hex(TEST_KEY).unwrap());
        let secondary: Arc<dyn HashSigner> =
            Arc::new(StarkKeySigner::from_hex(OTHER_KEY).unwrap());
        let hash = Felt::from(7u64);

        let felts = DualKeySigner::new(primary.clone(), secondary.clone())
            .sign_transaction(&hash)
            .await
            .unwrap();
        assert_eq!(felts.len(), 4);

        let first = SignaturePair::new(felts[0], felts[1]);
        let second = SignaturePair::new(felts[2], felts[3]);
        assert!(verify_signature(&primary.public_key(), &hash, &first).unwrap());
        assert!(verify_signature(&secondary.public_key(), &hash, &second).unwrap());
    }

    #[tokio::test]
    async fn presigned_signer_refuses_other_hashes() {
        let sig = SignaturePair::new(Felt::from(1u64), Felt::from(2u64));
        let signer = PresignedSigner::new(Felt::from(10u64), assemble_segments(&sig, None, None, None));

        let felts = signer.sign_transaction(&Felt::from(10u64)).await.unwrap();
        assert_eq!(felts, vec![Felt::from(1u64), Felt::from(2u64)]);
        assert!(signer.sign_transaction(&Felt::from(11u64)).await.is_err());
    }
}
