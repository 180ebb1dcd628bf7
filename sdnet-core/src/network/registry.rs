//! Registry of provisioned networks.
//!
//! A network appears here only after its creation finished and it reported
//! running, so presence in the registry is the readiness barrier losing
//! callers wait on. The registry also routes rescans to the membership
//! tracker of each network.

use super::membership::MembershipTracker;
use crate::error::{Result, SdnError};
use crate::types::AddressRange;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// A running network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkRecord {
    /// Network ID
    pub network_id: String,
    /// Subnet assigned to the network
    pub range: AddressRange,
    /// When the network was marked ready
    pub ready_at: SystemTime,
}

/// Builds the membership tracker for a network when it becomes ready.
pub type TrackerFactory = Arc<dyn Fn(&str) -> Arc<dyn MembershipTracker> + Send + Sync>;

/// Registry of running networks and their membership trackers.
///
/// Uses RwLock for read-heavy workloads (many readiness polls, few writes).
#[derive(Clone, Default)]
pub struct NetworkRegistry {
    networks: Arc<RwLock<HashMap<String, NetworkRecord>>>,
    trackers: Arc<RwLock<HashMap<String, Arc<dyn MembershipTracker>>>>,
    tracker_factory: Option<TrackerFactory>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that gives every ready network a tracker from `factory`.
    pub fn with_tracker_factory(factory: TrackerFactory) -> Self {
        Self { tracker_factory: Some(factory), ..Self::default() }
    }

    /// Whether a running network with this ID exists.
    pub async fn is_ready(&self, network_id: &str) -> bool {
        self.networks.read().await.contains_key(network_id)
    }

    /// Record that a network finished creation and is running.
    #[instrument(skip(self))]
    pub async fn mark_ready(&self, network_id: &str, range: AddressRange) {
        let record = NetworkRecord {
            network_id: network_id.to_string(),
            range,
            ready_at: SystemTime::now(),
        };

        // Tracker first, so a caller that observes readiness can always rescan
        if let Some(factory) = &self.tracker_factory {
            let mut trackers = self.trackers.write().await;
            trackers.entry(network_id.to_string()).or_insert_with(|| factory(network_id));
        }

        let previous = self.networks.write().await.insert(network_id.to_string(), record);
        if previous.is_some() {
            warn!("Network {} was already marked ready", network_id);
        } else {
            counter!("sdnet_network_ready_total").increment(1);
            info!("Network {} ({}) is ready", network_id, range);
        }
    }

    /// Look up a running network.
    pub async fn get(&self, network_id: &str) -> Option<NetworkRecord> {
        self.networks.read().await.get(network_id).cloned()
    }

    /// List all running networks, sorted by ID.
    pub async fn list(&self) -> Vec<NetworkRecord> {
        let mut records: Vec<_> = self.networks.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.network_id.cmp(&b.network_id));
        records
    }

    /// Register (or replace) the membership tracker of a network.
    #[instrument(skip(self, tracker))]
    pub async fn register_tracker(&self, network_id: &str, tracker: Arc<dyn MembershipTracker>) {
        self.trackers.write().await.insert(network_id.to_string(), tracker);
        debug!("Registered membership tracker for {}", network_id);
    }

    /// Get the membership tracker of a network.
    pub async fn tracker(&self, network_id: &str) -> Option<Arc<dyn MembershipTracker>> {
        self.trackers.read().await.get(network_id).cloned()
    }

    /// Ask the network's membership tracker to recompute its view.
    ///
    /// # Errors
    ///
    /// Returns `SdnError::MembershipNotFound` when no tracker is registered;
    /// tracker errors are returned as-is.
    #[instrument(skip(self))]
    pub async fn rescan(&self, network_id: &str) -> Result<()> {
        // Never hold the map lock while the tracker runs
        let tracker = self
            .tracker(network_id)
            .await
            .ok_or_else(|| SdnError::MembershipNotFound { network_id: network_id.to_string() })?;

        tracker.recompute(network_id).await?;
        counter!("sdnet_rescan_total").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTracker {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MembershipTracker for CountingTracker {
        async fn recompute(&self, _network_id: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn range(s: &str) -> AddressRange {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_mark_ready_and_lookup() {
        let registry = NetworkRegistry::new();
        assert!(!registry.is_ready("net-a").await);

        registry.mark_ready("net-a", range("10.10.0.0/24")).await;

        assert!(registry.is_ready("net-a").await);
        let record = registry.get("net-a").await.expect("record missing");
        assert_eq!(record.range, range("10.10.0.0/24"));
        assert!(registry.get("net-b").await.is_none());
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let registry = NetworkRegistry::new();
        registry.mark_ready("net-b", range("10.10.1.0/24")).await;
        registry.mark_ready("net-a", range("10.10.0.0/24")).await;

        let ids: Vec<_> = registry.list().await.into_iter().map(|r| r.network_id).collect();
        assert_eq!(ids, vec!["net-a", "net-b"]);
    }

    #[tokio::test]
    async fn test_rescan_without_tracker() {
        let registry = NetworkRegistry::new();
        registry.mark_ready("net-a", range("10.10.0.0/24")).await;

        let result = registry.rescan("net-a").await;
        assert!(matches!(result, Err(SdnError::MembershipNotFound { .. })));
    }

    #[tokio::test]
    async fn test_rescan_calls_tracker() {
        let registry = NetworkRegistry::new();
        let tracker = Arc::new(CountingTracker::default());
        registry.register_tracker("net-a", tracker.clone()).await;

        registry.rescan("net-a").await.unwrap();
        registry.rescan("net-a").await.unwrap();
        assert_eq!(tracker.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_factory_creates_tracker_once() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let registry = NetworkRegistry::with_tracker_factory(Arc::new(move |_id: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(CountingTracker::default()) as Arc<dyn MembershipTracker>
        }));

        registry.mark_ready("net-a", range("10.10.0.0/24")).await;
        registry.mark_ready("net-a", range("10.10.0.0/24")).await;

        assert_eq!(built.load(Ordering::SeqCst), 1);
        registry.rescan("net-a").await.unwrap();
    }
}
