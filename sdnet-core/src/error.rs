//! Error types for sdnet.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for sdnet operations.
pub type Result<T> = std::result::Result<T, SdnError>;

/// Main error type for sdnet.
#[derive(Error, Debug)]
pub enum SdnError {
    // Subnet pool errors
    #[error("Subnet pool exhausted: no free /{prefix_len} block left in {space}")]
    SubnetPoolExhausted { space: String, prefix_len: u8 },

    #[error("Subnet conflict for network {network_id}: {reason}")]
    SubnetConflict { network_id: String, reason: String },

    #[error("Invalid address range {range}: {reason}")]
    InvalidRange { range: String, reason: String },

    // Provisioning errors
    #[error("Cannot find virtual network for {network_id} after waiting {waited:?}")]
    ProvisioningTimeout { network_id: String, waited: Duration },

    #[error("Network {network_id} did not report running within {timeout:?}")]
    NetworkStartTimeout { network_id: String, timeout: Duration },

    #[error("Failed to start network {network_id}: {reason}")]
    NetworkStartFailed { network_id: String, reason: String },

    // Driver errors
    #[error("Driver {driver} failed: {reason}")]
    DriverError { driver: String, reason: String },

    // Membership errors
    #[error("No membership group registered for network {network_id}")]
    MembershipNotFound { network_id: String },

    #[error("Membership rescan failed for network {network_id}: {reason}")]
    RescanFailed { network_id: String, reason: String },

    // Agent address errors
    #[error("Agent address pool exhausted: no more addresses available in {cidr}")]
    IpPoolExhausted { cidr: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SdnError {
    /// Create a driver error tagged with the driver name.
    pub fn driver(driver: &str, reason: impl Into<String>) -> Self {
        Self::DriverError { driver: driver.to_string(), reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_network() {
        let err = SdnError::ProvisioningTimeout {
            network_id: "net-a".to_string(),
            waited: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "Cannot find virtual network for net-a after waiting 60s");
    }

    #[test]
    fn test_driver_helper() {
        let err = SdnError::driver("local", "no such subnet");
        assert!(matches!(err, SdnError::DriverError { ref driver, .. } if driver == "local"));
        assert_eq!(err.to_string(), "Driver local failed: no such subnet");
    }
}
