//! IP Address Management (IPAM) for SDN agents.
//!
//! Every SDN agent gets one address on the agent range when it is created.
//! Addresses are handed out lowest-first and reused after release.

use crate::config::PoolConfig;
use crate::error::{Result, SdnError};
use crate::types::AddressRange;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, instrument};

#[derive(Debug, Default)]
struct Leases {
    by_agent: HashMap<String, Ipv4Addr>,
    by_addr: BTreeMap<Ipv4Addr, String>,
}

/// IP address allocator for SDN agents.
///
/// Allocates from the configured agent range, skipping the network and
/// broadcast addresses.
#[derive(Debug)]
pub struct AgentAddressAllocator {
    range: AddressRange,
    pool_start: Ipv4Addr,
    pool_end: Ipv4Addr,
    leases: Mutex<Leases>,
}

impl AgentAddressAllocator {
    /// Create a new allocator over `range`.
    #[instrument]
    pub fn new(range: AddressRange) -> Self {
        let pool_start = Self::next_ip(range.network());
        let pool_end = Ipv4Addr::from(u32::from(range.broadcast()).saturating_sub(1));
        info!("Creating agent address allocator (pool: {} - {})", pool_start, pool_end);
        Self { range, pool_start, pool_end, leases: Mutex::new(Leases::default()) }
    }

    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        Ok(Self::new(config.agent_range()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Leases>> {
        self.leases
            .lock()
            .map_err(|_| SdnError::Internal("agent address lock poisoned".to_string()))
    }

    /// Allocate an address for an agent.
    ///
    /// Calling this again for the same agent returns the same address.
    ///
    /// # Errors
    ///
    /// Returns `SdnError::IpPoolExhausted` if no addresses are available
    #[instrument(skip(self))]
    pub fn allocate(&self, agent_id: &str) -> Result<Ipv4Addr> {
        let mut leases = self.lock()?;
        if let Some(existing) = leases.by_agent.get(agent_id) {
            return Ok(*existing);
        }

        // Find next available IP
        let mut current = self.pool_start;

        while current <= self.pool_end {
            if !leases.by_addr.contains_key(&current) {
                leases.by_agent.insert(agent_id.to_string(), current);
                leases.by_addr.insert(current, agent_id.to_string());

                info!("Allocated agent address {} to {}", current, agent_id);
                metrics::gauge!("sdnet_agent_addresses_allocated").set(leases.by_agent.len() as f64);

                return Ok(current);
            }

            if current == Ipv4Addr::BROADCAST {
                break;
            }
            current = Self::next_ip(current);
        }

        Err(SdnError::IpPoolExhausted { cidr: self.range.to_string() })
    }

    /// Release the address held by an agent.
    ///
    /// Returns the released address, if the agent held one.
    #[instrument(skip(self))]
    pub fn release(&self, agent_id: &str) -> Result<Option<Ipv4Addr>> {
        let mut leases = self.lock()?;
        let released = leases.by_agent.remove(agent_id);
        if let Some(addr) = released {
            leases.by_addr.remove(&addr);
            info!("Released agent address {} from {}", addr, agent_id);
            metrics::gauge!("sdnet_agent_addresses_allocated").set(leases.by_agent.len() as f64);
        }
        Ok(released)
    }

    /// Get the current address of an agent.
    pub fn get_allocation(&self, agent_id: &str) -> Result<Option<Ipv4Addr>> {
        Ok(self.lock()?.by_agent.get(agent_id).copied())
    }

    pub fn range(&self) -> AddressRange {
        self.range
    }

    /// Calculate the next IP address.
    fn next_ip(ip: Ipv4Addr) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(ip).wrapping_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator(cidr: &str) -> AgentAddressAllocator {
        AgentAddressAllocator::new(cidr.parse().unwrap())
    }

    #[test]
    fn test_sequential_allocation() {
        let ipam = allocator("10.9.0.0/16");

        assert_eq!(ipam.allocate("agent-1").unwrap(), Ipv4Addr::new(10, 9, 0, 1));
        assert_eq!(ipam.allocate("agent-2").unwrap(), Ipv4Addr::new(10, 9, 0, 2));
        assert_eq!(ipam.get_allocation("agent-1").unwrap(), Some(Ipv4Addr::new(10, 9, 0, 1)));
    }

    #[test]
    fn test_allocate_is_idempotent_per_agent() {
        let ipam = allocator("10.9.0.0/16");

        let first = ipam.allocate("agent-1").unwrap();
        let again = ipam.allocate("agent-1").unwrap();
        assert_eq!(first, again);
        assert_eq!(ipam.allocate("agent-2").unwrap(), Ipv4Addr::new(10, 9, 0, 2));
    }

    #[test]
    fn test_release_and_reuse() {
        let ipam = allocator("10.9.0.0/16");

        ipam.allocate("agent-1").unwrap();
        let ip2 = ipam.allocate("agent-2").unwrap();
        ipam.allocate("agent-3").unwrap();

        assert_eq!(ipam.release("agent-2").unwrap(), Some(ip2));
        assert_eq!(ipam.get_allocation("agent-2").unwrap(), None);
        assert_eq!(ipam.release("agent-2").unwrap(), None);

        // Lowest free address is reused
        assert_eq!(ipam.allocate("agent-4").unwrap(), ip2);
    }

    #[test]
    fn test_exhaustion() {
        // /30 leaves two usable addresses
        let ipam = allocator("10.9.0.0/30");

        ipam.allocate("a").unwrap();
        ipam.allocate("b").unwrap();
        let result = ipam.allocate("c");
        assert!(matches!(result, Err(SdnError::IpPoolExhausted { .. })));
    }

    #[test]
    fn test_next_ip() {
        let ip = Ipv4Addr::new(192, 168, 1, 1);
        assert_eq!(AgentAddressAllocator::next_ip(ip), Ipv4Addr::new(192, 168, 1, 2));

        // Test overflow within octet
        let ip = Ipv4Addr::new(192, 168, 1, 255);
        assert_eq!(AgentAddressAllocator::next_ip(ip), Ipv4Addr::new(192, 168, 2, 0));
    }
}
