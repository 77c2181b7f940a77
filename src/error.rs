//! Error types for the authorization pipeline

use crate::approval::{ApprovalEvent, ApprovalStatus};
use thiserror::Error;

/// Coarse classification used by callers to decide what to show the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Biometric declined or explicit rejection. Not retried.
    UserCancelled,
    /// Device or account needs remediation. Never falls back to a weaker path.
    Configuration,
    /// RPC or store call failed. Re-invoking the same operation is safe.
    Network,
    /// The chain refused or reverted the transaction.
    ChainRejection,
    /// The approval request outlived its `expires_at`.
    Expired,
    /// Programming or data errors (illegal transition, malformed record, ...).
    Internal,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Cancelled by user: {0}")]
    UserCancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Transaction rejected by chain: {0}")]
    ChainRejection(String),

    #[error("Approval request {request_id} has expired; start a new transaction")]
    Expired { request_id: String },

    #[error("Illegal status transition from {from} on {event:?}")]
    InvalidTransition {
        from: ApprovalStatus,
        event: ApprovalEvent,
    },

    #[error("Approval request {id} is not actionable in status {status}")]
    NotActionable { id: String, status: ApprovalStatus },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UserCancelled(_) => ErrorKind::UserCancelled,
            Error::Config(_) => ErrorKind::Configuration,
            Error::Network(_) | Error::Http(_) => ErrorKind::Network,
            Error::ChainRejection(_) => ErrorKind::ChainRejection,
            Error::Expired { .. } => ErrorKind::Expired,
            Error::InvalidTransition { .. }
            | Error::NotActionable { .. }
            | Error::Signing(_)
            | Error::InvalidArgument(_)
            | Error::Json(_)
            | Error::Io(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_and_network_share_a_kind() {
        assert_eq!(
            Error::Network("timeout".into()).kind(),
            ErrorKind::Network
        );
        assert_eq!(
            Error::Expired {
                request_id: "r1".into()
            }
            .kind(),
            ErrorKind::Expired
        );
    }

    #[test]
    fn expired_message_prompts_reinitiation() {
        let err = Error::Expired {
            request_id: "abc".into(),
        };
        assert!(err.to_string().contains("start a new transaction"));
    }
}
