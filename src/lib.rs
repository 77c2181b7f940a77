//! Ward Authorization Pipeline
//!
//! Decides, for every outgoing transaction of a shielded-payment wallet,
//! which authorization path it takes and collects the signatures it needs:
//! - Direct: one key on this device
//! - Dual-sig: two keys on this device behind a biometric prompt
//! - Ward: the ward signs, a guardian on another device co-signs, and the
//!   two coordinate through a shared request store
//!
//! # Security Model
//!
//! - Private keys never leave the `wallet` module
//! - Signatures and keys are never logged
//! - Every request status change is a conditional store write, so a
//!   request is submitted at most once
//! - Full audit trail of routing decisions and status changes

pub mod account;
pub mod approval;
pub mod audit;
pub mod chain;
pub mod config;
pub mod executor;
pub mod felt;
pub mod intent;
pub mod router;
pub mod signature;
pub mod store;
pub mod tokens;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use approval::{ApprovalRequest, ApprovalStatus, DeviceRole, WardApprovalCoordinator};
pub use config::{Config, Endpoints};
pub use error::{Error, ErrorKind, Result};
pub use felt::Felt;
pub use intent::{Action, CallSet, TransactionIntent, TxOutcome};
pub use router::{AuthorizationPath, RoutingError, TransactionRouter};
