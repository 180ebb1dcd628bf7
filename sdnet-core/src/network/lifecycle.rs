//! Network lifecycle management.
//!
//! Starting a network is delegated to a [`NetworkLifecycle`]; the
//! coordinator polls `is_running` until the network comes up.

use super::attachment::provision_subnet;
use super::pool::SubnetPool;
use crate::driver::SdnDriver;
use crate::error::Result;
use crate::types::AddressRange;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument};

/// Starts network objects and reports whether they are running.
#[async_trait]
pub trait NetworkLifecycle: Send + Sync {
    /// Create and start the network object for `network_id`.
    async fn start(&self, network_id: &str, range: AddressRange) -> Result<()>;

    /// Whether the network object reports running.
    async fn is_running(&self, network_id: &str) -> Result<bool>;
}

/// Lifecycle that provisions networks in-process through a driver.
pub struct LocalLifecycle {
    pool: Arc<SubnetPool>,
    driver: Arc<dyn SdnDriver>,
    running: RwLock<HashSet<String>>,
}

impl LocalLifecycle {
    pub fn new(pool: Arc<SubnetPool>, driver: Arc<dyn SdnDriver>) -> Self {
        Self { pool, driver, running: RwLock::new(HashSet::new()) }
    }
}

#[async_trait]
impl NetworkLifecycle for LocalLifecycle {
    #[instrument(skip(self))]
    async fn start(&self, network_id: &str, range: AddressRange) -> Result<()> {
        provision_subnet(&self.pool, self.driver.as_ref(), network_id, Some(range)).await?;
        self.running.write().await.insert(network_id.to_string());
        info!(driver = self.driver.name(), "Network {} started", network_id);
        Ok(())
    }

    async fn is_running(&self, network_id: &str) -> Result<bool> {
        Ok(self.running.read().await.contains(network_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LocalDriver;

    #[tokio::test]
    async fn test_start_creates_subnet_and_runs() {
        let pool = Arc::new(SubnetPool::new("10.10.0.0/22".parse().unwrap(), 24).unwrap());
        let driver = Arc::new(LocalDriver::new());
        let lifecycle = LocalLifecycle::new(pool.clone(), driver.clone());

        let range = pool.allocate_or_lookup("net-a").unwrap().range;
        assert!(!lifecycle.is_running("net-a").await.unwrap());

        lifecycle.start("net-a", range).await.unwrap();

        assert!(lifecycle.is_running("net-a").await.unwrap());
        assert!(driver.has_subnet("net-a").await);
    }
}
