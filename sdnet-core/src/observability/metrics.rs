//! Core metrics definitions.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - `_seconds` suffix for histograms measuring duration

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};

/// Register all core metrics with descriptions.
///
/// This ensures metrics appear in `/metrics` with proper metadata.
pub fn register_core_metrics() {
    // Subnet pool metrics
    describe_counter!(
        "sdnet_subnet_allocated_total",
        "Total number of subnets assigned to networks (by kind: drawn, explicit)"
    );
    describe_gauge!("sdnet_subnet_pool_available", "Blocks left in the subnet pool");
    describe_counter!("sdnet_subnet_exhausted_total", "Total number of draws from an empty pool");
    describe_gauge!("sdnet_agent_addresses_allocated", "Current number of agent address leases");

    // Provisioning metrics
    describe_counter!("sdnet_network_created_total", "Total number of networks created");
    describe_counter!(
        "sdnet_network_create_failures_total",
        "Total number of network creations that failed"
    );
    describe_histogram!(
        "sdnet_network_create_seconds",
        "Time taken to create a network until it is ready"
    );
    describe_histogram!(
        "sdnet_network_wait_seconds",
        "Time callers spent waiting for a network created by someone else"
    );
    describe_counter!(
        "sdnet_provisioning_timeouts_total",
        "Total number of waits that gave up before the network was ready"
    );
    describe_counter!("sdnet_network_ready_total", "Total number of networks marked ready");

    // Attachment metrics
    describe_counter!("sdnet_workload_attached_total", "Total number of workload attachments");
    describe_counter!("sdnet_rescan_total", "Total number of membership rescans");
    describe_counter!(
        "sdnet_rescan_failures_total",
        "Total number of membership rescans that failed during attach"
    );
}

/// Count a subnet assignment and publish the remaining pool size.
pub fn record_subnet_allocated(kind: &'static str, available: u64) {
    counter!("sdnet_subnet_allocated_total", "kind" => kind).increment(1);
    gauge!("sdnet_subnet_pool_available").set(available as f64);
}
