//! Deployment-wide SDN provider.
//!
//! Owns the state every agent shares: the subnet pool, the network registry,
//! the agent address pool and the event bus. Agents get their
//! [`AttachmentService`] from here.

use super::attachment::AttachmentService;
use super::coordinator::{ProvisioningCoordinator, WaitPolicy};
use super::ipam::AgentAddressAllocator;
use super::lifecycle::{LocalLifecycle, NetworkLifecycle};
use super::membership::{DynamicGroup, MembershipTracker, WorkloadSource};
use super::pool::SubnetPool;
use super::registry::{NetworkRegistry, TrackerFactory};
use crate::config::Config;
use crate::driver::{LocalDriver, SdnDriver};
use crate::error::Result;
use crate::events::EventBus;
use std::sync::Arc;
use tracing::{info, instrument};

pub struct SdnProvider {
    coordinator: Arc<ProvisioningCoordinator>,
    agent_addresses: AgentAddressAllocator,
}

impl SdnProvider {
    pub fn new(
        pool: Arc<SubnetPool>,
        registry: Arc<NetworkRegistry>,
        lifecycle: Arc<dyn NetworkLifecycle>,
        agent_addresses: AgentAddressAllocator,
        policy: WaitPolicy,
    ) -> Self {
        let coordinator = ProvisioningCoordinator::new(pool, registry, lifecycle, policy);
        Self { coordinator: Arc::new(coordinator), agent_addresses }
    }

    /// Provider backed by an in-process driver.
    ///
    /// Networks start through [`LocalLifecycle`] and every ready network gets
    /// a [`DynamicGroup`] fed by the driver.
    pub fn local(config: &Config, driver: Arc<LocalDriver>) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(SubnetPool::from_config(&config.pool)?);
        let source: Arc<dyn WorkloadSource> = driver.clone();
        let factory: TrackerFactory = Arc::new(move |network_id: &str| {
            Arc::new(DynamicGroup::new(network_id, source.clone())) as Arc<dyn MembershipTracker>
        });
        let registry = Arc::new(NetworkRegistry::with_tracker_factory(factory));
        let lifecycle = Arc::new(LocalLifecycle::new(pool.clone(), driver));

        Ok(Self::new(
            pool,
            registry,
            lifecycle,
            AgentAddressAllocator::from_config(&config.pool)?,
            WaitPolicy::from(&config.provisioning),
        ))
    }

    pub fn coordinator(&self) -> &Arc<ProvisioningCoordinator> {
        &self.coordinator
    }

    pub fn pool(&self) -> &Arc<SubnetPool> {
        self.coordinator.pool()
    }

    pub fn registry(&self) -> &Arc<NetworkRegistry> {
        self.coordinator.registry()
    }

    pub fn events(&self) -> &EventBus {
        self.coordinator.events()
    }

    pub fn agent_addresses(&self) -> &AgentAddressAllocator {
        &self.agent_addresses
    }

    /// Build the attachment service of an agent.
    ///
    /// The agent's address comes from the agent pool; asking again for the
    /// same agent ID yields the same address.
    #[instrument(skip(self, driver))]
    pub fn agent(&self, agent_id: &str, driver: Arc<dyn SdnDriver>) -> Result<AttachmentService> {
        let address = self.agent_addresses.allocate(agent_id)?;
        info!(driver = driver.name(), "Agent {} joined with address {}", agent_id, address);

        Ok(AttachmentService::new(agent_id, self.coordinator.clone(), driver)
            .with_agent_address(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SdnError;
    use std::net::Ipv4Addr;

    fn provider(driver: Arc<LocalDriver>) -> SdnProvider {
        let mut config = Config::default();
        config.pool.superset = "10.10.0.0/22".to_string();
        SdnProvider::local(&config, driver).unwrap()
    }

    #[test]
    fn test_agent_addresses_stable() {
        let provider = provider(Arc::new(LocalDriver::new()));
        let driver = Arc::new(LocalDriver::new());

        let a1 = provider.agent("agent-1", driver.clone()).unwrap();
        let a2 = provider.agent("agent-2", driver.clone()).unwrap();
        let again = provider.agent("agent-1", driver).unwrap();

        assert_eq!(a1.agent_address(), Some(Ipv4Addr::new(10, 9, 0, 1)));
        assert_eq!(a2.agent_address(), Some(Ipv4Addr::new(10, 9, 0, 2)));
        assert_eq!(again.agent_address(), a1.agent_address());
    }

    #[test]
    fn test_local_rejects_invalid_config() {
        let mut config = Config::default();
        config.pool.block_prefix = 8;
        let result = SdnProvider::local(&config, Arc::new(LocalDriver::new()));
        assert!(matches!(result, Err(SdnError::InvalidConfig { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_agents_share_networks() {
        let driver = Arc::new(LocalDriver::new());
        let provider = provider(driver.clone());
        let agent1 = provider.agent("agent-1", driver.clone()).unwrap();
        let agent2 = provider.agent("agent-2", driver.clone()).unwrap();

        let (w1, w2) = tokio::join!(agent1.attach("w1", "n1"), agent2.attach("w2", "n1"));
        let (w1, w2) = (w1.unwrap(), w2.unwrap());

        assert_ne!(w1.address, w2.address);
        assert_eq!(driver.subnet_count().await, 1);
        assert_eq!(provider.registry().list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_provision_publishes_event() {
        let driver = Arc::new(LocalDriver::new());
        let provider = provider(driver.clone());
        let mut sub = provider.events().subscribe(vec!["network.provisioned".to_string()]);

        provider.agent("agent-1", driver).unwrap().provision("n1", None).await.unwrap();

        let event = sub.recv().await.expect("no event");
        assert_eq!(event.resource_id, "n1");
    }
}
