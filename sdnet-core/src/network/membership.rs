//! Workload membership views for provisioned networks.
//!
//! A [`MembershipTracker`] is refreshed only when someone calls
//! `recompute()`; nothing here watches workloads on its own.

use crate::error::{Result, SdnError};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Observer that rebuilds its view of a network's members on demand.
#[async_trait]
pub trait MembershipTracker: Send + Sync {
    /// Recompute membership for `network_id` from the tracker's source of truth.
    async fn recompute(&self, network_id: &str) -> Result<()>;
}

/// Source of truth for which workloads sit on which network.
#[async_trait]
pub trait WorkloadSource: Send + Sync {
    /// IDs of the workloads currently attached to `network_id`.
    async fn workloads_on(&self, network_id: &str) -> Result<Vec<String>>;
}

/// Group of workloads on one network, rebuilt from a [`WorkloadSource`].
pub struct DynamicGroup {
    network_id: String,
    source: Arc<dyn WorkloadSource>,
    members: RwLock<BTreeSet<String>>,
}

impl DynamicGroup {
    pub fn new(network_id: &str, source: Arc<dyn WorkloadSource>) -> Self {
        Self { network_id: network_id.to_string(), source, members: RwLock::new(BTreeSet::new()) }
    }

    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    /// Members as of the last rescan, sorted.
    pub async fn members(&self) -> Vec<String> {
        self.members.read().await.iter().cloned().collect()
    }

    pub async fn contains(&self, workload_id: &str) -> bool {
        self.members.read().await.contains(workload_id)
    }
}

#[async_trait]
impl MembershipTracker for DynamicGroup {
    #[instrument(skip(self))]
    async fn recompute(&self, network_id: &str) -> Result<()> {
        if network_id != self.network_id {
            return Err(SdnError::RescanFailed {
                network_id: network_id.to_string(),
                reason: format!("group tracks network {}", self.network_id),
            });
        }

        let workloads = self.source.workloads_on(network_id).await?;
        let mut members = self.members.write().await;
        *members = workloads.into_iter().collect();

        debug!("Rescanned network {}: {} members", network_id, members.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StaticSource {
        workloads: Mutex<HashMap<String, Vec<String>>>,
    }

    impl StaticSource {
        fn set(&self, network_id: &str, workloads: &[&str]) {
            self.workloads
                .lock()
                .unwrap()
                .insert(network_id.to_string(), workloads.iter().map(|w| w.to_string()).collect());
        }
    }

    #[async_trait]
    impl WorkloadSource for StaticSource {
        async fn workloads_on(&self, network_id: &str) -> Result<Vec<String>> {
            Ok(self.workloads.lock().unwrap().get(network_id).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_view_changes_only_on_recompute() {
        let source = Arc::new(StaticSource::default());
        let group = DynamicGroup::new("net-a", source.clone());

        source.set("net-a", &["w2", "w1"]);
        assert!(group.members().await.is_empty());

        group.recompute("net-a").await.unwrap();
        assert_eq!(group.members().await, vec!["w1", "w2"]);

        source.set("net-a", &["w1"]);
        assert!(group.contains("w2").await);
        group.recompute("net-a").await.unwrap();
        assert!(!group.contains("w2").await);
    }

    #[tokio::test]
    async fn test_recompute_rejects_other_network() {
        let group = DynamicGroup::new("net-a", Arc::new(StaticSource::default()));
        let result = group.recompute("net-b").await;
        assert!(matches!(result, Err(SdnError::RescanFailed { .. })));
    }
}
