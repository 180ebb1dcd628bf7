//! Per-agent workload attachment.
//!
//! Each host agent owns an [`AttachmentService`]. Attaching a workload makes
//! sure its network exists first, so the first workload on a network pays
//! for creating it and later workloads reuse it.

use super::coordinator::ProvisioningCoordinator;
use super::pool::SubnetPool;
use super::registry::NetworkRegistry;
use crate::driver::SdnDriver;
use crate::error::Result;
use crate::events::{Event, EventBus, EventType};
use crate::types::{AddressRange, WorkloadAttachment};
use metrics::counter;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Reserve a subnet for `network_id` and have the driver create it.
///
/// An explicit range is recorded as given; without one the next block is
/// drawn from the pool. Returns the range the driver created.
pub async fn provision_subnet(
    pool: &SubnetPool,
    driver: &dyn SdnDriver,
    network_id: &str,
    explicit: Option<AddressRange>,
) -> Result<AddressRange> {
    let allocation = match explicit {
        Some(range) => pool.record_explicit(network_id, range)?,
        None => pool.allocate_or_lookup(network_id)?,
    };

    debug!(
        driver = driver.name(),
        "Creating subnet {} for {} (new allocation: {})",
        allocation.range,
        network_id,
        allocation.newly_allocated
    );
    driver.create_subnet(network_id, allocation.range).await?;
    Ok(allocation.range)
}

/// Attaches workloads on one agent to logical networks.
pub struct AttachmentService {
    agent_id: String,
    agent_address: Option<Ipv4Addr>,
    coordinator: Arc<ProvisioningCoordinator>,
    driver: Arc<dyn SdnDriver>,
}

impl AttachmentService {
    pub fn new(
        agent_id: &str,
        coordinator: Arc<ProvisioningCoordinator>,
        driver: Arc<dyn SdnDriver>,
    ) -> Self {
        Self { agent_id: agent_id.to_string(), agent_address: None, coordinator, driver }
    }

    /// Set the agent's own address on the agent network.
    pub fn with_agent_address(mut self, address: Ipv4Addr) -> Self {
        self.agent_address = Some(address);
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn agent_address(&self) -> Option<Ipv4Addr> {
        self.agent_address
    }

    pub fn coordinator(&self) -> &Arc<ProvisioningCoordinator> {
        &self.coordinator
    }

    fn pool(&self) -> &SubnetPool {
        self.coordinator.pool()
    }

    fn registry(&self) -> &NetworkRegistry {
        self.coordinator.registry()
    }

    fn events(&self) -> &EventBus {
        self.coordinator.events()
    }

    /// Attach a workload to a network, creating the network if needed.
    ///
    /// Blocks until the network is ready. A failing membership rescan is
    /// logged and does not fail the attachment.
    #[instrument(skip(self), fields(agent = %self.agent_id))]
    pub async fn attach(&self, workload_id: &str, network_id: &str) -> Result<WorkloadAttachment> {
        self.coordinator.ensure_network(network_id, None).await?;

        let address = self.driver.attach(workload_id, network_id).await?;

        if let Err(e) = self.registry().rescan(network_id).await {
            counter!("sdnet_rescan_failures_total").increment(1);
            warn!("Membership rescan for {} failed: {}", network_id, e);
        }

        info!("Attached workload {} to {}: {}", workload_id, network_id, address);
        counter!("sdnet_workload_attached_total").increment(1);
        self.events().publish(
            Event::new(EventType::WorkloadAttached, workload_id, "Workload attached")
                .with_metadata("network", network_id)
                .with_metadata("address", &address.to_string())
                .with_metadata("agent", &self.agent_id),
        );

        Ok(WorkloadAttachment::new(workload_id, network_id, address))
    }

    /// Create a network's subnet directly, without the create-or-wait protocol.
    ///
    /// The caller owns creation, so the network is marked ready as soon as
    /// the driver has created the subnet. Returns the network ID unchanged.
    #[instrument(skip(self), fields(agent = %self.agent_id))]
    pub async fn provision(
        &self,
        network_id: &str,
        explicit: Option<AddressRange>,
    ) -> Result<String> {
        let range = provision_subnet(self.pool(), self.driver.as_ref(), network_id, explicit).await?;

        if !self.registry().is_ready(network_id).await {
            self.registry().mark_ready(network_id, range).await;
        }

        info!("Provisioned network {} with subnet {}", network_id, range);
        self.events().publish(
            Event::new(EventType::NetworkProvisioned, network_id, "Network provisioned")
                .with_metadata("range", &range.to_string()),
        );
        Ok(network_id.to_string())
    }
}
