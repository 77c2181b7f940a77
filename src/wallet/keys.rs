//! Device key store
//!
//! Holds the account address plus the primary key and, on devices with
//! dual-factor signing set up, the secondary key.

use crate::felt::Felt;
use crate::wallet::signer::{HashSigner, StarkKeySigner};
use crate::Result;
use std::sync::Arc;

/// Environment variable names
pub mod env_vars {
    pub const ACCOUNT_ADDRESS: &str = "WARD_AUTHZ_ACCOUNT_ADDRESS";
    pub const PRIMARY_KEY: &str = "WARD_AUTHZ_PRIMARY_KEY";
    pub const SECONDARY_KEY: &str = "WARD_AUTHZ_SECONDARY_KEY";
}

pub trait KeyStore: Send + Sync {
    /// Address of the account this device controls.
    fn account_address(&self) -> Felt;

    fn primary(&self) -> Arc<dyn HashSigner>;

    /// `None` when no second factor is provisioned on this device.
    fn secondary(&self) -> Option<Arc<dyn HashSigner>>;
}

pub struct LocalKeyStore {
    address: Felt,
    primary: Arc<dyn HashSigner>,
    secondary: Option<Arc<dyn HashSigner>>,
}

impl LocalKeyStore {
    pub fn new(address: Felt, primary: Arc<dyn HashSigner>) -> Self {
        Self {
            address,
            primary,
            secondary: None,
        }
    }

    pub fn with_secondary(mut self, secondary: Arc<dyn HashSigner>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Load address and keys from the environment. The secondary key is
    /// optional.
    pub fn from_env() -> Result<Self> {
        let address = std::env::var(env_vars::ACCOUNT_ADDRESS).map_err(|_| {
            crate::Error::Config(format!(
                "Environment variable {} not set",
                env_vars::ACCOUNT_ADDRESS
            ))
        })?;
        let address = Felt::from_hex(&address)?;
        let primary = Arc::new(StarkKeySigner::from_env(env_vars::PRIMARY_KEY)?);

        let mut store = Self::new(address, primary);
        if std::env::var(env_vars::SECONDARY_KEY).is_ok() {
            store = store.with_secondary(Arc::new(StarkKeySigner::from_env(
                env_vars::SECONDARY_KEY,
            )?));
        } else {
            tracing::debug!("No secondary key configured; dual-factor signing unavailable");
        }
        Ok(store)
    }
}

impl KeyStore for LocalKeyStore {
    fn account_address(&self) -> Felt {
        self.address
    }

    fn primary(&self) -> Arc<dyn HashSigner> {
        self.primary.clone()
    }

    fn secondary(&self) -> Option<Arc<dyn HashSigner>> {
        self.secondary.clone()
    }
}

impl std::fmt::Debug for LocalKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyStore")
            .field("address", &self.address)
            .field("has_secondary", &self.secondary.is_some())
            .finish()
    }
}
