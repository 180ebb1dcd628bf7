//! Core domain types for sdnet.

pub mod network;

// Re-exports
pub use network::{AddressRange, LogicalNetwork, NetworkState, WorkloadAttachment};
