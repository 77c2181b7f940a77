//! Transaction router
//!
//! Single entry point for every outgoing transaction. Precedence is strict:
//! a ward account always takes the ward path, even with dual-factor signing
//! enabled; otherwise dual-factor; otherwise direct. A failed path is never
//! retried on a weaker one.

use crate::account::{AccountFlagCache, AccountFlags};
use crate::audit::AuditLog;
use crate::executor::{CallPreparer, DirectPath, DualSigPath, WardExecutor};
use crate::intent::{TransactionIntent, TxOutcome};
use crate::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationPath {
    Ward,
    DualSig,
    Direct,
}

impl fmt::Display for AuthorizationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthorizationPath::Ward => "ward",
            AuthorizationPath::DualSig => "dual_sig",
            AuthorizationPath::Direct => "direct",
        })
    }
}

pub fn select_path(flags: AccountFlags) -> AuthorizationPath {
    if flags.is_ward {
        AuthorizationPath::Ward
    } else if flags.dual_sig_enabled {
        AuthorizationPath::DualSig
    } else {
        AuthorizationPath::Direct
    }
}

/// Failure of `execute`, carrying the underlying error unchanged.
#[derive(Debug)]
pub struct RoutingError {
    /// `None` when the failure happened before a path was chosen.
    pub path: Option<AuthorizationPath>,
    pub source: Error,
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path {
            Some(path) => write!(f, "{} authorization failed: {}", path, self.source),
            None => write!(f, "Authorization not attempted: {}", self.source),
        }
    }
}

impl std::error::Error for RoutingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl RoutingError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    pub fn into_inner(self) -> Error {
        self.source
    }
}

pub struct TransactionRouter {
    flags: Arc<AccountFlagCache>,
    preparer: Arc<dyn CallPreparer>,
    ward: Arc<dyn WardExecutor>,
    dual_sig: Arc<dyn DualSigPath>,
    direct: Arc<dyn DirectPath>,
    audit: Option<Arc<AuditLog>>,
    last_path: RwLock<Option<AuthorizationPath>>,
}

impl TransactionRouter {
    pub fn new(
        flags: Arc<AccountFlagCache>,
        preparer: Arc<dyn CallPreparer>,
        ward: Arc<dyn WardExecutor>,
        dual_sig: Arc<dyn DualSigPath>,
        direct: Arc<dyn DirectPath>,
    ) -> Self {
        Self {
            flags,
            preparer,
            ward,
            dual_sig,
            direct,
            audit: None,
            last_path: RwLock::new(None),
        }
    }

    pub fn with_audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Path taken by the most recent `execute`.
    pub async fn last_path(&self) -> Option<AuthorizationPath> {
        *self.last_path.read().await
    }

    pub async fn execute(&self, intent: TransactionIntent) -> Result<TxOutcome, RoutingError> {
        let flags = self
            .flags
            .flags()
            .await
            .map_err(|source| RoutingError { path: None, source })?;
        let path = select_path(flags);

        *self.last_path.write().await = Some(path);
        tracing::info!(
            path = %path,
            action = %intent.action,
            token = %intent.token,
            is_ward = flags.is_ward,
            dual_sig = flags.dual_sig_enabled,
            "Routing transaction"
        );
        if let Some(audit) = &self.audit {
            audit.record_route(path, intent.action, &intent.token).await;
        }

        let wrap = |source: Error| RoutingError {
            path: Some(path),
            source,
        };
        let calls = self.preparer.prepare(&intent).await.map_err(wrap)?;

        let result = match path {
            AuthorizationPath::Ward => self.ward.execute_ward(&intent, calls).await,
            AuthorizationPath::DualSig => self.dual_sig.execute_dual_sig(calls).await,
            AuthorizationPath::Direct => self.direct.execute_direct(&intent, calls).await,
        };

        match result {
            Ok(outcome) => {
                tracing::info!(path = %path, tx_hash = %outcome.tx_hash, "Transaction submitted");
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(path = %path, kind = ?e.kind(), error = %e, "Transaction failed");
                Err(wrap(e))
            }
        }
    }
}
