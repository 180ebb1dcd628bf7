//! Subnet pool for logical networks.
//!
//! Cuts fixed-size blocks sequentially out of a superset range and records
//! which logical network owns each block. Every lookup-or-draw runs under a
//! single exclusive lock that is never held across an `.await`, so slow
//! network creation never blocks unrelated allocations.

use crate::config::PoolConfig;
use crate::error::{Result, SdnError};
use crate::observability::metrics::record_subnet_allocated;
use crate::types::AddressRange;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

/// Result of claiming a range for a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Range owned by the network
    pub range: AddressRange,
    /// True only for the call that recorded the range
    pub newly_allocated: bool,
}

impl Allocation {
    fn new(range: AddressRange) -> Self {
        Self { range, newly_allocated: true }
    }

    fn existing(range: AddressRange) -> Self {
        Self { range, newly_allocated: false }
    }
}

#[derive(Debug, Default)]
struct PoolState {
    /// Index of the next block to draw
    next_block: u64,
    /// Network ID -> assigned range
    by_network: HashMap<String, AddressRange>,
}

impl PoolState {
    fn owner_of_overlap(&self, range: &AddressRange) -> Option<(&str, AddressRange)> {
        self.by_network
            .iter()
            .find(|(_, existing)| existing.overlaps(range))
            .map(|(id, existing)| (id.as_str(), *existing))
    }
}

/// Process-wide allocator mapping network IDs to disjoint address ranges.
#[derive(Debug)]
pub struct SubnetPool {
    superset: AddressRange,
    block_prefix: u8,
    state: Mutex<PoolState>,
}

impl SubnetPool {
    /// Create a pool cutting `/block_prefix` blocks out of `superset`.
    #[instrument]
    pub fn new(superset: AddressRange, block_prefix: u8) -> Result<Self> {
        if block_prefix < superset.prefix_len() || block_prefix > 30 {
            return Err(SdnError::InvalidConfig {
                reason: format!(
                    "Block prefix /{} does not fit superset {} (expected /{}../30)",
                    block_prefix,
                    superset,
                    superset.prefix_len()
                ),
            });
        }

        info!("Creating subnet pool ({} in /{} blocks)", superset, block_prefix);
        Ok(Self { superset, block_prefix, state: Mutex::new(PoolState::default()) })
    }

    /// Create a pool from the `pool` section of the configuration.
    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        Self::new(config.superset_range()?, config.block_prefix)
    }

    pub fn superset(&self) -> AddressRange {
        self.superset
    }

    pub fn block_prefix(&self) -> u8 {
        self.block_prefix
    }

    /// Total number of blocks the superset holds.
    pub fn total_blocks(&self) -> u64 {
        1u64 << u32::from(self.block_prefix - self.superset.prefix_len())
    }

    fn block_size(&self) -> u64 {
        1u64 << (32 - u32::from(self.block_prefix))
    }

    fn lock(&self) -> Result<MutexGuard<'_, PoolState>> {
        self.state.lock().map_err(|_| SdnError::Internal("subnet pool lock poisoned".to_string()))
    }

    /// Return the range already recorded for `network_id`, or draw a new one.
    ///
    /// # Errors
    ///
    /// Returns `SdnError::SubnetPoolExhausted` if no further block is available.
    #[instrument(skip(self))]
    pub fn allocate_or_lookup(&self, network_id: &str) -> Result<Allocation> {
        self.claim(network_id, None)
    }

    /// Register a caller-chosen range for `network_id`.
    ///
    /// Recording the same range twice for one network is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SdnError::SubnetConflict` if the network already owns a
    /// different range or the range overlaps another network's range.
    #[instrument(skip(self))]
    pub fn record_explicit(&self, network_id: &str, range: AddressRange) -> Result<Allocation> {
        let mut state = self.lock()?;
        if let Some(existing) = state.by_network.get(network_id) {
            if *existing == range {
                return Ok(Allocation::existing(range));
            }
            return Err(SdnError::SubnetConflict {
                network_id: network_id.to_string(),
                reason: format!("already allocated {}, cannot record {}", existing, range),
            });
        }
        self.insert_explicit(&mut state, network_id, range)
    }

    /// Atomic lookup, explicit record or draw, in that order of precedence.
    ///
    /// An existing allocation always wins over `explicit`.
    #[instrument(skip(self))]
    pub fn claim(&self, network_id: &str, explicit: Option<AddressRange>) -> Result<Allocation> {
        let mut state = self.lock()?;
        if let Some(existing) = state.by_network.get(network_id) {
            debug!("Network {} already owns {}", network_id, existing);
            return Ok(Allocation::existing(*existing));
        }

        match explicit {
            Some(range) => self.insert_explicit(&mut state, network_id, range),
            None => self.draw(&mut state, network_id),
        }
    }

    /// Get the range recorded for a network.
    pub fn lookup(&self, network_id: &str) -> Result<Option<AddressRange>> {
        Ok(self.lock()?.by_network.get(network_id).copied())
    }

    /// All recorded allocations, ordered by address.
    pub fn allocations(&self) -> Result<Vec<(String, AddressRange)>> {
        let state = self.lock()?;
        let mut all: Vec<_> =
            state.by_network.iter().map(|(id, range)| (id.clone(), *range)).collect();
        all.sort_by_key(|(_, range)| *range);
        Ok(all)
    }

    /// Number of blocks that can still be drawn.
    pub fn remaining_blocks(&self) -> Result<u64> {
        let state = self.lock()?;
        Ok(self.remaining(&state))
    }

    fn insert_explicit(
        &self,
        state: &mut PoolState,
        network_id: &str,
        range: AddressRange,
    ) -> Result<Allocation> {
        if let Some((other, other_range)) = state.owner_of_overlap(&range) {
            return Err(SdnError::SubnetConflict {
                network_id: network_id.to_string(),
                reason: format!("{} overlaps {} of network {}", range, other_range, other),
            });
        }

        state.by_network.insert(network_id.to_string(), range);
        info!("Recorded explicit subnet {} for network {}", range, network_id);
        record_subnet_allocated("explicit", self.remaining(state));

        Ok(Allocation::new(range))
    }

    fn draw(&self, state: &mut PoolState, network_id: &str) -> Result<Allocation> {
        let base = u64::from(u32::from(self.superset.network()));
        let total = self.total_blocks();

        while state.next_block < total {
            let start = base + state.next_block * self.block_size();
            state.next_block += 1;

            let candidate = AddressRange::new(Ipv4Addr::from(start as u32), self.block_prefix)?;
            if let Some((other, _)) = state.owner_of_overlap(&candidate) {
                debug!("Skipping {} (covered by network {})", candidate, other);
                continue;
            }

            state.by_network.insert(network_id.to_string(), candidate);
            info!("Allocated subnet {} to network {}", candidate, network_id);
            record_subnet_allocated("drawn", self.remaining(state));

            return Ok(Allocation::new(candidate));
        }

        metrics::counter!("sdnet_subnet_exhausted_total").increment(1);
        Err(SdnError::SubnetPoolExhausted {
            space: self.superset.to_string(),
            prefix_len: self.block_prefix,
        })
    }

    /// Blocks past the cursor, minus those already covered by explicit ranges.
    fn remaining(&self, state: &PoolState) -> u64 {
        let base = u64::from(u32::from(self.superset.network()));
        let total = self.total_blocks();
        let block_size = self.block_size();

        // Block index spans [lo, hi] taken by ranges ahead of the cursor
        let mut taken: Vec<(u64, u64)> = state
            .by_network
            .values()
            .filter(|range| range.overlaps(&self.superset))
            .filter_map(|range| {
                let first = u64::from(u32::from(range.network())).max(base);
                let last = u64::from(u32::from(range.broadcast()))
                    .min(u64::from(u32::from(self.superset.broadcast())));
                let lo = ((first - base) / block_size).max(state.next_block);
                let hi = (last - base) / block_size;
                (lo <= hi).then_some((lo, hi))
            })
            .collect();
        taken.sort_unstable();

        let mut covered = 0;
        let mut cursor = state.next_block;
        for (lo, hi) in taken {
            let lo = lo.max(cursor);
            if lo <= hi {
                covered += hi - lo + 1;
                cursor = hi + 1;
            }
        }

        total.saturating_sub(state.next_block).saturating_sub(covered)
    }
}
