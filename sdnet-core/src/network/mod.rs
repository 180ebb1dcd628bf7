//! Network provisioning for sdnet.
//!
//! Handles subnet allocation, create-or-wait coordination, readiness
//! tracking and workload attachment.
//!
//! ## Flow
//!
//! An agent's [`AttachmentService`] asks the [`ProvisioningCoordinator`] to
//! ensure the workload's network. The coordinator claims a subnet from the
//! [`SubnetPool`]; the first claimant creates the network through a
//! [`NetworkLifecycle`] and publishes it in the [`NetworkRegistry`], everyone
//! else polls the registry until it shows up.

pub mod attachment;
pub mod coordinator;
pub mod ipam;
pub mod lifecycle;
pub mod membership;
pub mod pool;
pub mod provider;
pub mod registry;

pub use attachment::{provision_subnet, AttachmentService};
pub use coordinator::{EnsureOutcome, ProvisioningCoordinator, WaitPolicy};
pub use ipam::AgentAddressAllocator;
pub use lifecycle::{LocalLifecycle, NetworkLifecycle};
pub use membership::{DynamicGroup, MembershipTracker, WorkloadSource};
pub use pool::{Allocation, SubnetPool};
pub use provider::SdnProvider;
pub use registry::{NetworkRecord, NetworkRegistry, TrackerFactory};
