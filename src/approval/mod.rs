//! Ward approval flow
//!
//! A ward account's transactions are authorized through a request record
//! shared with the guardian's device via the store:
//!
//! - `state`: status enum and the single transition function
//! - `request`: the stored record
//! - `needs`: which signatures a transaction requires
//! - `coordinator`: initiate / approve / reject / wait
//! - `poller`: background discovery of requests waiting on this device
//! - `provisioning`: resumable ward account setup

mod coordinator;
mod guard;
mod needs;
mod poller;
mod provisioning;
mod request;
mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::{DeviceRole, WardApprovalCoordinator};
pub use guard::SubmissionGuard;
pub use needs::{WardApprovalNeeds, WardPolicy};
pub use poller::ApprovalPoller;
pub use provisioning::{
    DeployedWard, PartialWard, ProvisioningStep, WardDeployment, WardProvisioner,
    DEFAULT_RELATIONSHIPS_TABLE,
};
pub use request::{columns, ApprovalRequest, DEFAULT_TABLE};
pub use state::{is_monotonic, transition, ApprovalEvent, ApprovalStatus};
