//! Explicit owner of independently configured pools.
//!
//! Pools are created during system configuration, which needs exclusive access
//! to the registry. After that, the registry is shared and serves allocations
//! through `&self`.
//!
//! # Examples
//!
//! ```
//! use drone_mempool::pool::PoolConfig;
//! use drone_mempool::registry::PoolRegistry;
//! use drone_mempool::timer::ManualTimer;
//! use drone_mempool::{Error, Region};
//! use std::sync::Arc;
//!
//! let mut registry = PoolRegistry::new(Arc::new(ManualTimer::new()));
//! let small = registry.create_pool(Region::leak(512), PoolConfig::new(16))?;
//! let large = registry.create_pool(Region::leak(1024), PoolConfig::new(256))?;
//!
//! let block = registry.try_allocate_partition(large)?;
//! assert_eq!(block.len(), 256);
//! assert_eq!(registry.pool_status(large).allocated_count, 1);
//! registry.deallocate_partition(block.into())?;
//! assert_eq!(registry.pool_status(small).free_count, 32);
//! # Ok::<(), Error>(())
//! ```

use crate::block::{Block, Region};
use crate::error::{ConfigError, Error};
use crate::pool::{Allocate, PartitionPool, PoolConfig, PoolStatus};
use crate::timer::Timer;
use crate::wait::WaitMode;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::AtomicU32;
use core::sync::atomic::Ordering::Relaxed;
use tracing::warn;

static NEXT_REGISTRY: AtomicU32 = AtomicU32::new(0);

/// A reference to a pool of a [`PoolRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    registry: u32,
    index: u32,
}

impl PoolHandle {
    /// Returns the position of the pool in creation order.
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// A set of partition pools sharing one timer.
pub struct PoolRegistry {
    id: u32,
    timer: Arc<dyn Timer>,
    pools: Vec<PartitionPool>,
    /// Pool indices sorted by start address.
    by_address: Vec<u32>,
}

impl PoolRegistry {
    /// Creates an empty registry.
    pub fn new(timer: Arc<dyn Timer>) -> Self {
        Self { id: NEXT_REGISTRY.fetch_add(1, Relaxed), timer, pools: Vec::new(), by_address: Vec::new() }
    }

    /// Creates a pool over `region`.
    ///
    /// Fails with [`Error::InvalidConfiguration`] if the pool parameters are
    /// invalid, or `region` overlaps a pool of this registry.
    pub fn create_pool(&mut self, region: Region, config: PoolConfig) -> Result<PoolHandle, Error> {
        let range = region.range();
        let position = self.by_address.partition_point(|&index| self.pools[index as usize].range().start < range.start);
        let overlaps_prev = position > 0 && self.pools[self.by_address[position - 1] as usize].range().end > range.start;
        let overlaps_next = self
            .by_address
            .get(position)
            .is_some_and(|&index| self.pools[index as usize].range().start < range.end);
        if overlaps_prev || overlaps_next {
            warn!(start = range.start, end = range.end, "pool region overlaps an existing pool");
            return Err(ConfigError::Overlap.into());
        }
        let pool = PartitionPool::new(region, config, Arc::clone(&self.timer))?;
        let index = self.pools.len() as u32;
        self.pools.push(pool);
        self.by_address.insert(position, index);
        Ok(PoolHandle { registry: self.id, index })
    }

    /// Returns the pool referenced by `handle`.
    ///
    /// # Panics
    ///
    /// If `handle` was issued by another registry.
    pub fn pool(&self, handle: PoolHandle) -> &PartitionPool {
        assert_eq!(handle.registry, self.id, "pool handle from another registry");
        &self.pools[handle.index as usize]
    }

    /// Returns the pools in creation order.
    pub fn pools(&self) -> impl Iterator<Item = (PoolHandle, &PartitionPool)> + '_ {
        self.pools
            .iter()
            .enumerate()
            .map(|(index, pool)| (PoolHandle { registry: self.id, index: index as u32 }, pool))
    }

    /// Returns the number of pools.
    #[inline]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Returns `true` if no pool was created.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Allocates one block of the pool referenced by `handle`.
    ///
    /// See [`PartitionPool::allocate`].
    #[cfg_attr(feature = "leak-tracker", track_caller)]
    pub fn allocate_partition(&self, handle: PoolHandle, wait: WaitMode) -> Allocate<'_> {
        self.pool(handle).allocate(wait)
    }

    /// Allocates one block of the pool referenced by `handle` without waiting.
    #[cfg_attr(feature = "leak-tracker", track_caller)]
    pub fn try_allocate_partition(&self, handle: PoolHandle) -> Result<Block, Error> {
        self.pool(handle).try_allocate()
    }

    /// Deallocates the block at `ptr`, looking up the owning pool by address.
    ///
    /// Fails with [`Error::InvalidPointer`] if no pool of this registry owns an
    /// allocated block at `ptr`.
    pub fn deallocate_partition(&self, ptr: NonNull<u8>) -> Result<(), Error> {
        match self.pool_by_ptr(ptr) {
            Some(pool) => pool.deallocate(ptr),
            None => {
                warn!(address = ptr.as_ptr() as usize, "deallocation of a pointer outside of all pools");
                Err(Error::InvalidPointer)
            }
        }
    }

    /// Returns the status of the pool referenced by `handle`.
    pub fn pool_status(&self, handle: PoolHandle) -> PoolStatus {
        self.pool(handle).status()
    }

    /// Writes the outstanding allocations of every pool with leak tracking
    /// enabled to `sink`.
    pub fn leak_report<W: fmt::Write>(&self, sink: &mut W) -> fmt::Result {
        #[cfg(feature = "leak-tracker")]
        for tracker in self.pools.iter().filter_map(PartitionPool::leaks) {
            tracker.snapshot().write_report(sink)?;
        }
        #[cfg(not(feature = "leak-tracker"))]
        let _ = sink;
        Ok(())
    }

    fn pool_by_ptr(&self, ptr: NonNull<u8>) -> Option<&PartitionPool> {
        let address = ptr.as_ptr() as usize;
        let position = self.by_address.partition_point(|&index| self.pools[index as usize].range().start <= address);
        let pool = &self.pools[*self.by_address.get(position.checked_sub(1)?)? as usize];
        pool.range().contains(&address).then_some(pool)
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry").field("id", &self.id).field("pools", &self.pools).finish_non_exhaustive()
    }
}
