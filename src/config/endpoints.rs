//! Remote endpoint configuration
//!
//! Read from the environment (a `.env` file is loaded by the binary):
//!
//! ```bash
//! export WARD_STORE_URL="https://project.example.co"
//! export WARD_STORE_KEY="service-or-anon-key"
//! export STARKNET_RPC_URL="https://starknet-sepolia.example.io/rpc/v0_8"
//! ```
//!
//! The store key is held as a secret and never appears in Debug output.

use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Environment variable names
pub mod env_vars {
    pub const STORE_URL: &str = "WARD_STORE_URL";
    pub const STORE_KEY: &str = "WARD_STORE_KEY";
    pub const RPC_URL: &str = "STARKNET_RPC_URL";
}

/// Public RPC endpoint (rate limited, for testing only)
const PUBLIC_SEPOLIA_RPC: &str = "https://starknet-sepolia.public.blastapi.io/rpc/v0_8";

#[derive(Clone)]
pub struct Endpoints {
    store_url: Option<Url>,
    store_key: Option<SecretString>,
    rpc_url: Url,
}

fn parse_url(var: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::Config(format!("{} is not a valid URL: {}", var, e)))
}

impl Endpoints {
    /// Priority for the RPC URL: `STARKNET_RPC_URL`, then the public
    /// Sepolia endpoint. The store has no fallback.
    pub fn from_env() -> Result<Self> {
        let store_url = match std::env::var(env_vars::STORE_URL) {
            Ok(raw) => Some(parse_url(env_vars::STORE_URL, &raw)?),
            Err(_) => None,
        };
        let store_key = std::env::var(env_vars::STORE_KEY)
            .ok()
            .map(SecretString::from);

        let rpc_url = match std::env::var(env_vars::RPC_URL) {
            Ok(raw) => {
                tracing::debug!("Using {} for chain RPC", env_vars::RPC_URL);
                parse_url(env_vars::RPC_URL, &raw)?
            }
            Err(_) => {
                tracing::warn!("No chain RPC configured, using public RPC (rate limited)");
                parse_url("public RPC", PUBLIC_SEPOLIA_RPC)?
            }
        };

        Ok(Self {
            store_url,
            store_key,
            rpc_url,
        })
    }

    pub fn new(store_url: Url, store_key: SecretString, rpc_url: Url) -> Self {
        Self {
            store_url: Some(store_url),
            store_key: Some(store_key),
            rpc_url,
        }
    }

    /// Store URL and key, or a configuration error naming what is missing.
    pub fn store(&self) -> Result<(&Url, &SecretString)> {
        let url = self.store_url.as_ref().ok_or_else(|| {
            Error::Config(format!("Environment variable {} not set", env_vars::STORE_URL))
        })?;
        let key = self.store_key.as_ref().ok_or_else(|| {
            Error::Config(format!("Environment variable {} not set", env_vars::STORE_KEY))
        })?;
        Ok((url, key))
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    pub fn has_store(&self) -> bool {
        self.store_url.is_some() && self.store_key.is_some()
    }
}

impl std::fmt::Debug for Endpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoints")
            .field("store_url", &self.store_url.as_ref().map(Url::as_str))
            .field(
                "store_key",
                &self.store_key.as_ref().map(|k| {
                    if k.expose_secret().is_empty() {
                        "<empty>"
                    } else {
                        "<redacted>"
                    }
                }),
            )
            .field("rpc_url", &self.rpc_url.as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Endpoints {
        Endpoints::new(
            Url::parse("https://store.example.co").unwrap(),
            SecretString::from("super-secret-key".to_string()),
            Url::parse("https://rpc.example.io").unwrap(),
        )
    }

    #[test]
    fn debug_redacts_store_key() {
        let printed = format!("{:?}", endpoints());
        assert!(!printed.contains("super-secret-key"));
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("store.example.co"));
    }

    #[test]
    fn missing_store_is_a_config_error() {
        let mut e = endpoints();
        assert!(e.has_store());
        e.store_key = None;
        let err = e.store().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert!(err.to_string().contains(env_vars::STORE_KEY));
    }
}
