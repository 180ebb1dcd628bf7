//! In-memory SDN driver.
//!
//! Keeps subnets and workload interfaces in process memory. Workload
//! addresses start after the gateway address of each subnet.

use super::SdnDriver;
use crate::error::{Result, SdnError};
use crate::network::membership::WorkloadSource;
use crate::types::AddressRange;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

const DRIVER_NAME: &str = "local";

#[derive(Debug)]
struct LocalSubnet {
    range: AddressRange,
    /// Workload ID -> interface address
    interfaces: BTreeMap<String, Ipv4Addr>,
}

impl LocalSubnet {
    /// Lowest free address between the gateway and the broadcast address.
    fn next_free(&self) -> Option<Ipv4Addr> {
        let first = u32::from(self.range.gateway()).checked_add(1)?;
        let last = u32::from(self.range.broadcast()).checked_sub(1)?;
        (first..=last).map(Ipv4Addr::from).find(|ip| !self.interfaces.values().any(|used| used == ip))
    }
}

/// Driver that performs no host plumbing.
#[derive(Debug, Default)]
pub struct LocalDriver {
    subnets: Mutex<HashMap<String, LocalSubnet>>,
    create_delay: Duration,
}

impl LocalDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate slow subnet creation.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    /// Whether the subnet for a network exists.
    pub async fn has_subnet(&self, network_id: &str) -> bool {
        self.subnets.lock().await.contains_key(network_id)
    }

    /// Number of subnets created so far.
    pub async fn subnet_count(&self) -> usize {
        self.subnets.lock().await.len()
    }
}

#[async_trait]
impl SdnDriver for LocalDriver {
    #[instrument(skip(self), fields(driver = DRIVER_NAME))]
    async fn create_subnet(&self, network_id: &str, range: AddressRange) -> Result<()> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }

        let mut subnets = self.subnets.lock().await;
        if let Some(existing) = subnets.get(network_id) {
            if existing.range == range {
                debug!("Subnet {} for {} already exists", range, network_id);
                return Ok(());
            }
            return Err(SdnError::driver(
                DRIVER_NAME,
                format!("network {} already has subnet {}", network_id, existing.range),
            ));
        }

        subnets.insert(
            network_id.to_string(),
            LocalSubnet { range, interfaces: BTreeMap::new() },
        );
        info!("Created subnet {} for network {}", range, network_id);
        Ok(())
    }

    #[instrument(skip(self), fields(driver = DRIVER_NAME))]
    async fn attach(&self, workload_id: &str, network_id: &str) -> Result<IpAddr> {
        let mut subnets = self.subnets.lock().await;
        let subnet = subnets.get_mut(network_id).ok_or_else(|| {
            SdnError::driver(DRIVER_NAME, format!("no subnet created for network {}", network_id))
        })?;

        if let Some(existing) = subnet.interfaces.get(workload_id) {
            return Ok(IpAddr::V4(*existing));
        }

        let address = subnet.next_free().ok_or_else(|| {
            SdnError::driver(DRIVER_NAME, format!("subnet {} has no free addresses", subnet.range))
        })?;
        subnet.interfaces.insert(workload_id.to_string(), address);

        Ok(IpAddr::V4(address))
    }

    fn name(&self) -> &str {
        DRIVER_NAME
    }
}

#[async_trait]
impl WorkloadSource for LocalDriver {
    async fn workloads_on(&self, network_id: &str) -> Result<Vec<String>> {
        let subnets = self.subnets.lock().await;
        Ok(subnets
            .get(network_id)
            .map(|subnet| subnet.interfaces.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(s: &str) -> AddressRange {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_attach_assigns_hosts_after_gateway() {
        let driver = LocalDriver::new();
        driver.create_subnet("net-a", range("10.10.0.0/24")).await.unwrap();

        let w1 = driver.attach("w1", "net-a").await.unwrap();
        let w2 = driver.attach("w2", "net-a").await.unwrap();

        assert_eq!(w1, IpAddr::V4(Ipv4Addr::new(10, 10, 0, 2)));
        assert_eq!(w2, IpAddr::V4(Ipv4Addr::new(10, 10, 0, 3)));

        // Re-attaching returns the same interface
        assert_eq!(driver.attach("w1", "net-a").await.unwrap(), w1);
        assert_eq!(driver.workloads_on("net-a").await.unwrap(), vec!["w1", "w2"]);
    }

    #[tokio::test]
    async fn test_attach_without_subnet_fails() {
        let driver = LocalDriver::new();
        let result = driver.attach("w1", "missing").await;
        assert!(matches!(result, Err(SdnError::DriverError { .. })));
    }

    #[tokio::test]
    async fn test_create_subnet_idempotent() {
        let driver = LocalDriver::new();
        driver.create_subnet("net-a", range("10.10.0.0/24")).await.unwrap();
        driver.create_subnet("net-a", range("10.10.0.0/24")).await.unwrap();
        assert_eq!(driver.subnet_count().await, 1);

        let result = driver.create_subnet("net-a", range("10.10.1.0/24")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_small_subnet_runs_out() {
        let driver = LocalDriver::new();
        // /30: network, gateway, one host, broadcast
        driver.create_subnet("tiny", range("10.10.0.0/30")).await.unwrap();

        driver.attach("w1", "tiny").await.unwrap();
        assert!(driver.attach("w2", "tiny").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_delay() {
        let driver = LocalDriver::new().with_create_delay(Duration::from_secs(5));
        let started = tokio::time::Instant::now();

        driver.create_subnet("slow", range("10.10.0.0/24")).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(driver.has_subnet("slow").await);
    }
}
