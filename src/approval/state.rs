//! Approval request lifecycle
//!
//! ```text
//! created -> pending_ward_sig -> [pending_guardian] -> approved | rejected | expired
//! ```
//!
//! `transition` is the only place a status changes. Every accepted
//! transition strictly increases `rank`, so a request never moves backwards.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Created,
    PendingWardSig,
    PendingGuardian,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 6] = [
        ApprovalStatus::Created,
        ApprovalStatus::PendingWardSig,
        ApprovalStatus::PendingGuardian,
        ApprovalStatus::Approved,
        ApprovalStatus::Rejected,
        ApprovalStatus::Expired,
    ];

    /// Position in the total order. Terminal states share the top rank.
    pub fn rank(&self) -> u8 {
        match self {
            ApprovalStatus::Created => 0,
            ApprovalStatus::PendingWardSig => 1,
            ApprovalStatus::PendingGuardian => 2,
            ApprovalStatus::Approved | ApprovalStatus::Rejected | ApprovalStatus::Expired => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }

    /// Waiting on a ward or guardian signature.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ApprovalStatus::PendingWardSig | ApprovalStatus::PendingGuardian
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Created => "created",
            ApprovalStatus::PendingWardSig => "pending_ward_sig",
            ApprovalStatus::PendingGuardian => "pending_guardian",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ApprovalStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown approval status: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ApprovalEvent {
    /// Request persisted and awaiting the ward's signature.
    Recorded,
    WardSigned { needs_guardian: bool },
    GuardianSigned,
    Rejected,
    Expired,
}

pub fn transition(from: ApprovalStatus, event: ApprovalEvent) -> Result<ApprovalStatus> {
    use ApprovalEvent as E;
    use ApprovalStatus as S;

    let to = match (from, event) {
        (S::Created, E::Recorded) => S::PendingWardSig,
        (S::PendingWardSig, E::WardSigned { needs_guardian: true }) => S::PendingGuardian,
        (S::PendingWardSig, E::WardSigned { needs_guardian: false }) => S::Approved,
        (S::PendingGuardian, E::GuardianSigned) => S::Approved,
        (S::PendingWardSig | S::PendingGuardian, E::Rejected) => S::Rejected,
        (S::Created | S::PendingWardSig | S::PendingGuardian, E::Expired) => S::Expired,
        _ => return Err(Error::InvalidTransition { from, event }),
    };
    debug_assert!(to.rank() > from.rank());
    Ok(to)
}

/// Whether an observed sequence of statuses (e.g. from successive polls)
/// is consistent with forward-only movement.
pub fn is_monotonic(observed: &[ApprovalStatus]) -> bool {
    observed.windows(2).all(|pair| {
        let (a, b) = (pair[0], pair[1]);
        a == b || (!a.is_terminal() && b.rank() > a.rank())
    })
}
