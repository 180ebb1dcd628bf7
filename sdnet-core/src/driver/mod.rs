//! SDN driver abstraction.
//!
//! The driver performs the host-side plumbing (bridges, tunnels, interfaces)
//! for a network technology. The coordinator only talks to it through the
//! `SdnDriver` trait:
//! - `local`: in-memory driver for single-process deployments and tests

use crate::error::Result;
use crate::types::AddressRange;
use async_trait::async_trait;
use std::net::IpAddr;

/// SDN driver trait.
///
/// Methods are instrumented by implementations, not here.
#[async_trait]
pub trait SdnDriver: Send + Sync {
    /// Materialize the subnet of a network on this host.
    ///
    /// May be slow and may fail.
    async fn create_subnet(&self, network_id: &str, range: AddressRange) -> Result<()>;

    /// Connect a workload to an existing subnet and return its interface address.
    async fn attach(&self, workload_id: &str, network_id: &str) -> Result<IpAddr>;

    /// Get driver name (for logging/metrics).
    fn name(&self) -> &str;
}

pub mod local;

pub use local::LocalDriver;
