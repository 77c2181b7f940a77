//! Account flag cache
//!
//! The router needs two facts about the local account before every
//! transaction: is it a ward, and is dual-factor signing enabled. They are
//! cached locally as a versioned entry tagged `Stale` or `Verified { at }`
//! and pulled from an `AccountFlagSource` when stale.
//!
//! The entry is persisted as JSON with a blake3 checksum. A corrupt or
//! older-schema file loads as "no entry".

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountFlags {
    pub is_ward: bool,
    pub dual_sig_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Freshness {
    Stale,
    Verified { at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub schema_version: u32,
    pub revision: u64,
    pub flags: AccountFlags,
    pub freshness: Freshness,
    pub checksum: String,
}

impl CacheEntry {
    fn new(revision: u64, flags: AccountFlags, freshness: Freshness) -> Self {
        let mut entry = Self {
            schema_version: SCHEMA_VERSION,
            revision,
            flags,
            freshness,
            checksum: String::new(),
        };
        entry.checksum = entry.compute_checksum();
        entry
    }

    fn compute_checksum(&self) -> String {
        let payload = serde_json::json!({
            "schema_version": self.schema_version,
            "revision": self.revision,
            "flags": self.flags,
            "freshness": self.freshness,
        });
        let bytes = serde_json::to_vec(&payload).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    pub fn is_intact(&self) -> bool {
        self.schema_version == SCHEMA_VERSION && self.checksum == self.compute_checksum()
    }

    pub fn is_verified_within(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.freshness {
            Freshness::Verified { at } => now - at < ttl,
            Freshness::Stale => false,
        }
    }
}

/// Authoritative source of account flags (chain reads, wallet backend).
#[async_trait]
pub trait AccountFlagSource: Send + Sync {
    async fn fetch_flags(&self) -> Result<AccountFlags>;
}

pub struct AccountFlagCache {
    entry: RwLock<Option<CacheEntry>>,
    path: Option<PathBuf>,
    source: Option<Arc<dyn AccountFlagSource>>,
    verify_ttl: chrono::Duration,
}

impl AccountFlagCache {
    pub fn new(verify_ttl: chrono::Duration) -> Self {
        Self {
            entry: RwLock::new(None),
            path: None,
            source: None,
            verify_ttl,
        }
    }

    /// Persist to `path`, loading whatever valid entry is already there.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.entry = RwLock::new(load_entry(&path));
        self.path = Some(path);
        self
    }

    pub fn with_source(mut self, source: Arc<dyn AccountFlagSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub async fn current(&self) -> Option<CacheEntry> {
        self.entry.read().await.clone()
    }

    /// Store freshly verified flags.
    pub async fn set_verified(&self, flags: AccountFlags) -> Result<CacheEntry> {
        self.replace(flags, Freshness::Verified { at: Utc::now() })
            .await
    }

    /// Keep the flags but require re-verification before next use.
    pub async fn mark_stale(&self) -> Result<()> {
        let flags = match self.entry.read().await.as_ref() {
            Some(entry) => entry.flags,
            None => return Ok(()),
        };
        self.replace(flags, Freshness::Stale).await?;
        Ok(())
    }

    async fn replace(&self, flags: AccountFlags, freshness: Freshness) -> Result<CacheEntry> {
        let mut slot = self.entry.write().await;
        let revision = slot.as_ref().map_or(1, |e| e.revision + 1);
        let entry = CacheEntry::new(revision, flags, freshness);
        if let Some(path) = &self.path {
            save_entry(path, &entry)?;
        }
        *slot = Some(entry.clone());
        Ok(entry)
    }

    /// Pull flags from the source and store them as verified.
    pub async fn refresh(&self) -> Result<AccountFlags> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| Error::Config("No account flag source configured".to_string()))?;
        let flags = source.fetch_flags().await.map_err(|e| {
            tracing::warn!(error = %e, "Account flag refresh failed");
            Error::Network(format!("Could not verify account flags: {}", e))
        })?;
        let entry = self.set_verified(flags).await?;
        tracing::debug!(revision = entry.revision, is_ward = flags.is_ward, dual_sig = flags.dual_sig_enabled, "Account flags verified");
        Ok(flags)
    }

    /// Verified flags, refreshing when stale. Never returns unverified
    /// flags.
    pub async fn flags(&self) -> Result<AccountFlags> {
        let current = self.current().await;
        match current {
            Some(entry) if entry.is_verified_within(self.verify_ttl, Utc::now()) => Ok(entry.flags),
            Some(_) if self.source.is_none() => Err(Error::Network(
                "Account flags are stale and no source is available to verify them".to_string(),
            )),
            Some(_) => self.refresh().await,
            None if self.source.is_none() => Err(Error::Config(
                "Account flags not loaded".to_string(),
            )),
            None => self.refresh().await,
        }
    }
}

fn load_entry(path: &Path) -> Option<CacheEntry> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read account flag cache");
            return None;
        }
    };
    match serde_json::from_str::<CacheEntry>(&content) {
        Ok(entry) if entry.is_intact() => Some(entry),
        Ok(entry) => {
            tracing::warn!(
                path = %path.display(),
                schema_version = entry.schema_version,
                "Discarding account flag cache with bad checksum or schema"
            );
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Discarding unreadable account flag cache");
            None
        }
    }
}

fn save_entry(path: &Path, entry: &CacheEntry) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(entry)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource {
        flags: Option<AccountFlags>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AccountFlagSource for FixedSource {
        async fn fetch_flags(&self) -> Result<AccountFlags> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.flags
                .ok_or_else(|| Error::Network("rpc unavailable".to_string()))
        }
    }

    fn source(flags: Option<AccountFlags>) -> Arc<FixedSource> {
        Arc::new(FixedSource {
            flags,
            calls: AtomicUsize::new(0),
        })
    }

    const WARD: AccountFlags = AccountFlags {
        is_ward: true,
        dual_sig_enabled: false,
    };

    #[tokio::test]
    async fn missing_flags_without_source_is_configuration() {
        let cache = AccountFlagCache::new(chrono::Duration::seconds(60));
        let err = cache.flags().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn stale_flags_pull_refresh() {
        let src = source(Some(WARD));
        let cache = AccountFlagCache::new(chrono::Duration::seconds(60)).with_source(src.clone());
        assert_eq!(cache.flags().await.unwrap(), WARD);
        // Fresh entry is served without another pull.
        assert_eq!(cache.flags().await.unwrap(), WARD);
        assert_eq!(src.calls.load(Ordering::SeqCst), 1);

        cache.mark_stale().await.unwrap();
        assert_eq!(cache.flags().await.unwrap(), WARD);
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.current().await.unwrap().revision, 3);
    }

    #[tokio::test]
    async fn failed_refresh_is_network_error() {
        let cache = AccountFlagCache::new(chrono::Duration::seconds(60)).with_source(source(None));
        let err = cache.flags().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Network);
    }

    #[tokio::test]
    async fn persisted_entry_survives_reload_and_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");

        let cache = AccountFlagCache::new(chrono::Duration::seconds(60)).with_path(&path);
        cache.set_verified(WARD).await.unwrap();

        let reloaded = AccountFlagCache::new(chrono::Duration::seconds(60)).with_path(&path);
        assert_eq!(reloaded.flags().await.unwrap(), WARD);

        let tampered = std::fs::read_to_string(&path)
            .unwrap()
            .replace("\"is_ward\": true", "\"is_ward\": false");
        std::fs::write(&path, tampered).unwrap();
        let reloaded = AccountFlagCache::new(chrono::Duration::seconds(60)).with_path(&path);
        assert!(reloaded.current().await.is_none());
    }
}
