//! Configuration for the authorization pipeline

pub mod endpoints;

use crate::approval::DEFAULT_TABLE;
use crate::signature::GasAllowance;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub use endpoints::Endpoints;

/// Approval-flow settings shared by ward and guardian devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalSettings {
    /// Store table holding approval requests
    #[serde(default = "default_table")]
    pub table: String,
    /// Poll interval for pending requests (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Lifetime of a request before it is treated as dead (seconds)
    #[serde(default = "default_request_ttl_secs")]
    pub request_ttl_secs: u64,
    /// Resource-bound price cap as a percentage of the block gas price
    #[serde(default = "default_price_margin_percent")]
    pub price_margin_percent: u64,
    #[serde(default)]
    pub gas_allowance: GasAllowance,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_request_ttl_secs() -> u64 {
    600
}

fn default_price_margin_percent() -> u64 {
    150
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            table: default_table(),
            poll_interval_ms: default_poll_interval_ms(),
            request_ttl_secs: default_request_ttl_secs(),
            price_margin_percent: default_price_margin_percent(),
            gas_allowance: GasAllowance::default(),
        }
    }
}

impl ApprovalSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.request_ttl_secs as i64)
    }
}

/// Local account-flag cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCacheSettings {
    /// Where the cache entry is persisted; in-memory only when unset
    #[serde(default)]
    pub path: Option<String>,
    /// A verified entry older than this is treated as stale (seconds)
    #[serde(default = "default_verify_ttl_secs")]
    pub verify_ttl_secs: u64,
}

fn default_verify_ttl_secs() -> u64 {
    300
}

impl Default for AccountCacheSettings {
    fn default() -> Self {
        Self {
            path: Some("account_flags.json".to_string()),
            verify_ttl_secs: default_verify_ttl_secs(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub approval: ApprovalSettings,
    #[serde(default)]
    pub account_cache: AccountCacheSettings,
    /// Path to audit log file
    #[serde(default)]
    pub audit_log_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            approval: ApprovalSettings::default(),
            account_cache: AccountCacheSettings::default(),
            audit_log_path: Some("audit.jsonl".to_string()),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}
