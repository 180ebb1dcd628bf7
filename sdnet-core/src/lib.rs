//! sdnet Core Library
//!
//! Subnet allocation and create-or-wait network provisioning for an SDN
//! overlay shared by many host agents.

pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod network;
pub mod observability;
pub mod types;

// Re-export commonly used items
pub use config::Config;
pub use driver::{LocalDriver, SdnDriver};
pub use error::{Result, SdnError};
pub use events::{Event, EventBus, EventType};
pub use network::{
    AttachmentService, EnsureOutcome, NetworkRegistry, ProvisioningCoordinator, SdnProvider,
    SubnetPool, WaitPolicy,
};
pub use observability::init as init_observability;
pub use types::{AddressRange, LogicalNetwork, NetworkState, WorkloadAttachment};
