//! Network domain types.

use crate::error::{Result, SdnError};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::SystemTime;

/// A CIDR block assigned exclusively to one logical network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressRange(Ipv4Net);

impl AddressRange {
    /// Create a range from a network address and prefix length.
    ///
    /// The address must be the network address of the block (no host bits set).
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        let net = Ipv4Net::new(addr, prefix_len).map_err(|e| SdnError::InvalidRange {
            range: format!("{}/{}", addr, prefix_len),
            reason: e.to_string(),
        })?;
        Self::try_from(net)
    }

    /// Network address of the block.
    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }

    /// Broadcast (last) address of the block.
    pub fn broadcast(&self) -> Ipv4Addr {
        self.0.broadcast()
    }

    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Conventional gateway address (first address after the network address).
    pub fn gateway(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.0.network()).saturating_add(1))
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.0.contains(&ip)
    }

    /// Whether two blocks share at least one address.
    pub fn overlaps(&self, other: &AddressRange) -> bool {
        self.0.contains(&other.0.network()) || other.0.contains(&self.0.network())
    }
}

impl TryFrom<Ipv4Net> for AddressRange {
    type Error = SdnError;

    fn try_from(net: Ipv4Net) -> Result<Self> {
        if net.trunc() != net {
            return Err(SdnError::InvalidRange {
                range: net.to_string(),
                reason: format!("host bits set, expected {}", net.trunc()),
            });
        }
        Ok(Self(net))
    }
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AddressRange {
    type Err = SdnError;

    fn from_str(s: &str) -> Result<Self> {
        let net: Ipv4Net = s
            .trim()
            .parse()
            .map_err(|e: ipnet::AddrParseError| SdnError::InvalidRange {
                range: s.to_string(),
                reason: e.to_string(),
            })?;
        Self::try_from(net)
    }
}

/// Lifecycle state of a logical network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkState {
    /// No range has been claimed yet.
    #[default]
    Unallocated,
    /// A range is claimed and the winning caller is creating the network.
    Allocating,
    /// The network is running and attachable.
    Ready,
}

impl std::fmt::Display for NetworkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkState::Unallocated => write!(f, "unallocated"),
            NetworkState::Allocating => write!(f, "allocating"),
            NetworkState::Ready => write!(f, "ready"),
        }
    }
}

/// A caller-visible isolated segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalNetwork {
    /// Network ID
    pub id: String,

    /// Assigned range (None until allocation begins)
    pub range: Option<AddressRange>,

    /// Lifecycle state
    pub state: NetworkState,
}

/// One workload instance's membership in one logical network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadAttachment {
    /// Workload (container) ID
    pub workload_id: String,

    /// Network ID
    pub network_id: String,

    /// Interface address assigned by the driver
    pub address: IpAddr,

    /// Attach timestamp
    pub attached_at: SystemTime,
}

impl WorkloadAttachment {
    pub fn new(workload_id: &str, network_id: &str, address: IpAddr) -> Self {
        Self {
            workload_id: workload_id.to_string(),
            network_id: network_id.to_string(),
            address,
            attached_at: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(s: &str) -> AddressRange {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let r = range("10.10.4.0/24");
        assert_eq!(r.to_string(), "10.10.4.0/24");
        assert_eq!(r.network(), Ipv4Addr::new(10, 10, 4, 0));
        assert_eq!(r.broadcast(), Ipv4Addr::new(10, 10, 4, 255));
        assert_eq!(r.gateway(), Ipv4Addr::new(10, 10, 4, 1));
    }

    #[test]
    fn test_rejects_host_bits() {
        let err = "10.10.4.7/24".parse::<AddressRange>().unwrap_err();
        assert!(matches!(err, SdnError::InvalidRange { .. }));

        assert!("not-a-cidr".parse::<AddressRange>().is_err());
        assert!(AddressRange::new(Ipv4Addr::new(10, 0, 0, 0), 33).is_err());
    }

    #[test]
    fn test_overlaps() {
        let wide = range("10.10.0.0/22");
        let inner = range("10.10.2.0/24");
        let outside = range("10.10.4.0/24");

        assert!(wide.overlaps(&inner));
        assert!(inner.overlaps(&wide));
        assert!(!wide.overlaps(&outside));
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&NetworkState::Allocating).unwrap();
        assert_eq!(json, "\"allocating\"");
        let range_json = serde_json::to_string(&range("10.1.0.0/16")).unwrap();
        assert_eq!(range_json, "\"10.1.0.0/16\"");
    }
}
