//! Create-or-wait coordination per logical network.
//!
//! The first caller to claim a network ID from the [`SubnetPool`] is the
//! winner and creates the network; every other caller is a loser and polls
//! the [`NetworkRegistry`] until the winner marks it ready or the wait
//! window closes.
//!
//! ```text
//! Unallocated --claim--> Allocating --running + mark_ready--> Ready
//! ```
//!
//! There is no rollback: if the winner fails, the network stays Allocating
//! and later callers time out.

use super::lifecycle::NetworkLifecycle;
use super::pool::SubnetPool;
use super::registry::NetworkRegistry;
use crate::config::ProvisioningConfig;
use crate::error::{Result, SdnError};
use crate::events::{Event, EventBus, EventType};
use crate::types::{AddressRange, LogicalNetwork, NetworkState};
use metrics::{counter, histogram};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Polling and timeout policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Loser poll interval
    pub poll_interval: Duration,
    /// Loser wait window, measured from when the loser starts waiting
    pub wait_timeout: Duration,
    /// Winner's limit for the new network to report running
    pub startup_timeout: Duration,
    /// Winner poll interval for the running state
    pub running_poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::from(&ProvisioningConfig::default())
    }
}

impl From<&ProvisioningConfig> for WaitPolicy {
    fn from(config: &ProvisioningConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            wait_timeout: config.wait_timeout(),
            startup_timeout: config.startup_timeout(),
            running_poll_interval: config.running_poll_interval(),
        }
    }
}

/// Result of [`ProvisioningCoordinator::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsureOutcome {
    /// Range owned by the network
    pub range: AddressRange,
    /// True if this call claimed the network and created it
    pub created: bool,
}

/// Orchestrates the create-or-wait decision for each logical network.
pub struct ProvisioningCoordinator {
    pool: Arc<SubnetPool>,
    registry: Arc<NetworkRegistry>,
    lifecycle: Arc<dyn NetworkLifecycle>,
    events: EventBus,
    policy: WaitPolicy,
}

impl ProvisioningCoordinator {
    pub fn new(
        pool: Arc<SubnetPool>,
        registry: Arc<NetworkRegistry>,
        lifecycle: Arc<dyn NetworkLifecycle>,
        policy: WaitPolicy,
    ) -> Self {
        Self { pool, registry, lifecycle, events: EventBus::new(), policy }
    }

    /// Publish lifecycle events on `events` instead of a private bus.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn pool(&self) -> &Arc<SubnetPool> {
        &self.pool
    }

    pub fn registry(&self) -> &Arc<NetworkRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    /// Make sure `network_id` is provisioned and return its range.
    ///
    /// Blocks until the network is ready: as the winner for the duration of
    /// creation, as a loser for at most the wait window.
    ///
    /// # Errors
    ///
    /// - `SubnetPoolExhausted` / `SubnetConflict` from the pool
    /// - start errors and `NetworkStartTimeout` for the winner
    /// - `ProvisioningTimeout` for a loser whose window elapsed
    pub async fn ensure_network(
        &self,
        network_id: &str,
        explicit: Option<AddressRange>,
    ) -> Result<AddressRange> {
        self.ensure(network_id, explicit).await.map(|outcome| outcome.range)
    }

    /// Like [`ensure_network`](Self::ensure_network), also reporting whether this call created the network.
    #[instrument(skip(self))]
    pub async fn ensure(
        &self,
        network_id: &str,
        explicit: Option<AddressRange>,
    ) -> Result<EnsureOutcome> {
        let allocation = self.pool.claim(network_id, explicit)?;

        if !allocation.newly_allocated {
            if let Some(requested) = explicit.filter(|r| *r != allocation.range) {
                warn!(
                    "Network {} already owns {}, ignoring requested {}",
                    network_id, allocation.range, requested
                );
            }
            self.wait_for_ready(network_id).await?;
            return Ok(EnsureOutcome { range: allocation.range, created: false });
        }

        self.events.publish(
            Event::new(EventType::NetworkAllocated, network_id, "Subnet allocated")
                .with_metadata("range", &allocation.range.to_string()),
        );

        if let Err(e) = self.create(network_id, allocation.range).await {
            error!("Creating network {} failed: {}", network_id, e);
            counter!("sdnet_network_create_failures_total").increment(1);
            self.events.publish(
                Event::new(EventType::NetworkFailed, network_id, &e.to_string())
                    .with_metadata("range", &allocation.range.to_string()),
            );
            return Err(e);
        }

        Ok(EnsureOutcome { range: allocation.range, created: true })
    }

    /// Current lifecycle state of a network.
    pub async fn state(&self, network_id: &str) -> Result<NetworkState> {
        Ok(self.network(network_id).await?.state)
    }

    /// Snapshot of a logical network.
    pub async fn network(&self, network_id: &str) -> Result<LogicalNetwork> {
        let range = self.pool.lookup(network_id)?;
        let state = match range {
            None => NetworkState::Unallocated,
            Some(_) if self.registry.is_ready(network_id).await => NetworkState::Ready,
            Some(_) => NetworkState::Allocating,
        };
        Ok(LogicalNetwork { id: network_id.to_string(), range, state })
    }

    /// Winner path: start the network, wait for running, then mark it ready.
    async fn create(&self, network_id: &str, range: AddressRange) -> Result<()> {
        let started = Instant::now();
        info!("Creating virtual network {} with subnet {}", network_id, range);

        self.lifecycle.start(network_id, range).await?;

        let lifecycle = &self.lifecycle;
        let running = poll_until(
            self.policy.running_poll_interval,
            self.policy.startup_timeout,
            move || lifecycle.is_running(network_id),
        )
        .await?;
        if !running {
            return Err(SdnError::NetworkStartTimeout {
                network_id: network_id.to_string(),
                timeout: self.policy.startup_timeout,
            });
        }

        // Readiness is published only after the network is running
        self.registry.mark_ready(network_id, range).await;

        counter!("sdnet_network_created_total").increment(1);
        histogram!("sdnet_network_create_seconds").record(started.elapsed().as_secs_f64());
        self.events.publish(
            Event::new(EventType::NetworkReady, network_id, "Network ready")
                .with_metadata("range", &range.to_string()),
        );
        Ok(())
    }

    /// Loser path: poll the registry until the network is ready or time runs out.
    async fn wait_for_ready(&self, network_id: &str) -> Result<()> {
        let started = Instant::now();
        debug!("Waiting until virtual network {} is available", network_id);

        let registry = &self.registry;
        let ready = poll_until(self.policy.poll_interval, self.policy.wait_timeout, move || async move {
            Ok::<bool, SdnError>(registry.is_ready(network_id).await)
        })
        .await?;

        let waited = started.elapsed();
        histogram!("sdnet_network_wait_seconds").record(waited.as_secs_f64());

        if !ready {
            counter!("sdnet_provisioning_timeouts_total").increment(1);
            return Err(SdnError::ProvisioningTimeout { network_id: network_id.to_string(), waited });
        }
        Ok(())
    }
}

/// Run `probe` now and then every `interval` until it returns true or `limit` elapses.
///
/// The final sleep is clamped to the deadline, so a failing probe gives up
/// at `limit` (one last check runs exactly at the deadline).
async fn poll_until<F, Fut>(interval: Duration, limit: Duration, mut probe: F) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + limit;
    loop {
        if probe().await? {
            return Ok(true);
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
