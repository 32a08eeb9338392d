use super::HeapLayout;
use crate::block::{Block, Region};
use crate::error::{ConfigError, Error};
use crate::pool::{Allocate, PartitionPool, PoolConfig, PoolStatus};
use crate::timer::Timer;
use crate::wait::WaitMode;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::ptr;
use core::ptr::NonNull;
use tracing::{debug, warn};

/// Bytes reserved in front of every block for bookkeeping.
///
/// The owner of a block is found by its address, so nothing is stored.
pub const BLOCK_HEADER_SIZE: usize = 0;

/// Allocator routing variable-size requests to a set of partition pools.
///
/// Every size maps to exactly one class: the pool with the smallest block
/// size to fit it. Pools are carved one after another from a single region,
/// in ascending block size order.
pub struct SizeClassAllocator {
    pools: Vec<PartitionPool>,
    spill: bool,
}

impl SizeClassAllocator {
    /// Carves `region` into the pools described by `layout`.
    ///
    /// Fails with [`Error::InvalidConfiguration`] if the layout is invalid or
    /// doesn't fit into the region. Bytes of the region past the layout size
    /// are left unused.
    pub fn configure(region: Region, layout: &HeapLayout, timer: Arc<dyn Timer>) -> Result<Self, Error> {
        layout.validate()?;
        let required = layout.size();
        if region.len() < required {
            return Err(ConfigError::RegionTooSmall { region: region.len(), required }.into());
        }
        let unused = region.len() - required;
        let mut rest = region;
        let mut pools = Vec::with_capacity(layout.pools().len());
        for class in layout.pools() {
            let (head, tail) = rest.split_at(class.size());
            let config = PoolConfig::new(class.block)
                .policy(layout.suspension_policy())
                .waiters(layout.wait_capacity())
                .track_leaks(layout.tracks_leaks());
            pools.push(PartitionPool::new(head, config, Arc::clone(&timer))?);
            rest = tail;
        }
        debug!(classes = pools.len(), size = required, unused, spill = layout.spills(), "size-class allocator configured");
        Ok(Self { pools, spill: layout.spills() })
    }

    /// Returns the pools in ascending block size order.
    #[inline]
    pub fn pools(&self) -> &[PartitionPool] {
        &self.pools
    }

    /// Returns the largest size the allocator can serve.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.pools.last().map_or(0, |pool| pool.partition_size() - BLOCK_HEADER_SIZE)
    }

    /// Returns the index of the class serving requests of `size` bytes.
    ///
    /// Zero-sized requests are served by the smallest class. Fails with
    /// [`Error::SizeTooLarge`] if `size` exceeds [`max_size`](Self::max_size).
    pub fn size_class(&self, size: usize) -> Result<usize, Error> {
        let required = size.saturating_add(BLOCK_HEADER_SIZE);
        let index = binary_search(&self.pools, |pool| required <= pool.partition_size());
        if index < self.pools.len() {
            Ok(index)
        } else {
            Err(Error::SizeTooLarge { size, max: self.max_size() })
        }
    }

    /// Allocates a block of at least `size` bytes from its class.
    ///
    /// Suspending requests wait on their own class only. Fails with
    /// [`Error::SizeTooLarge`] before any pool is touched if `size` is too
    /// large.
    #[cfg_attr(feature = "leak-tracker", track_caller)]
    pub fn allocate(&self, size: usize, wait: WaitMode) -> Result<Allocate<'_>, Error> {
        let index = self.size_class(size)?;
        Ok(self.pools[index].allocate(wait))
    }

    /// Allocates a block of at least `size` bytes without waiting.
    ///
    /// If spilling is enabled and the class is exhausted, larger classes are
    /// tried in ascending order.
    #[cfg_attr(feature = "leak-tracker", track_caller)]
    pub fn try_allocate(&self, size: usize) -> Result<Block, Error> {
        let first = self.size_class(size)?;
        let last = if self.spill { self.pools.len() } else { first + 1 };
        for pool in &self.pools[first..last] {
            match pool.try_allocate() {
                Err(Error::ResourceExhausted) => continue,
                result => return result,
            }
        }
        Err(Error::ResourceExhausted)
    }

    /// Allocates a block fitting `layout` without waiting.
    ///
    /// Classes whose block alignment is below `layout.align()` are skipped.
    /// Fails with [`Error::ResourceExhausted`] if no class is aligned enough.
    #[cfg_attr(feature = "leak-tracker", track_caller)]
    pub fn try_allocate_layout(&self, layout: Layout) -> Result<Block, Error> {
        let first = self.size_class(layout.size())?;
        let mut candidates = self.pools[first..].iter().filter(|pool| pool.block_align() >= layout.align());
        let Some(home) = candidates.next() else {
            return Err(Error::ResourceExhausted);
        };
        match home.try_allocate() {
            Err(Error::ResourceExhausted) if self.spill => {}
            result => return result,
        }
        for pool in candidates {
            match pool.try_allocate() {
                Err(Error::ResourceExhausted) => continue,
                result => return result,
            }
        }
        Err(Error::ResourceExhausted)
    }

    /// Allocates a zero-filled block of at least `size` bytes without waiting.
    #[cfg_attr(feature = "leak-tracker", track_caller)]
    pub fn allocate_zeroed(&self, size: usize) -> Result<Block, Error> {
        let block = self.try_allocate(size)?;
        unsafe { block.as_ptr().write_bytes(0, block.len()) };
        Ok(block)
    }

    /// Resizes the block at `ptr` to at least `new_size` bytes.
    ///
    /// The block is kept if `new_size` routes to the class it belongs to.
    /// Otherwise a block is allocated without waiting, the contents are copied,
    /// and the old block is freed. On failure the old block is left intact.
    #[cfg_attr(feature = "leak-tracker", track_caller)]
    pub fn reallocate(&self, ptr: NonNull<u8>, new_size: usize) -> Result<Block, Error> {
        let Some(owner) = self.pool_by_ptr(ptr) else {
            warn!(address = ptr.as_ptr() as usize, "reallocation of a pointer outside of the heap");
            return Err(Error::InvalidPointer);
        };
        let Some(old) = self.pools[owner].allocated_block(ptr) else {
            warn!(address = ptr.as_ptr() as usize, "reallocation of a block not allocated");
            return Err(Error::InvalidPointer);
        };
        if self.size_class(new_size)? == owner {
            return Ok(old);
        }
        let new = self.try_allocate(new_size)?;
        unsafe { ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), old.len().min(new.len())) };
        self.pools[owner].deallocate(ptr)?;
        Ok(new)
    }

    /// Frees the block at `ptr`.
    ///
    /// The owning pool is located by address. Fails with
    /// [`Error::InvalidPointer`] if `ptr` is not an allocated block of this
    /// allocator.
    pub fn free(&self, ptr: NonNull<u8>) -> Result<(), Error> {
        match self.pool_by_ptr(ptr) {
            Some(index) => self.pools[index].deallocate(ptr),
            None => {
                warn!(address = ptr.as_ptr() as usize, "deallocation of a pointer outside of the heap");
                Err(Error::InvalidPointer)
            }
        }
    }

    /// Returns the status of every class in ascending block size order.
    pub fn status(&self) -> Vec<PoolStatus> {
        self.pools.iter().map(PartitionPool::status).collect()
    }

    fn pool_by_ptr(&self, ptr: NonNull<u8>) -> Option<usize> {
        let address = ptr.as_ptr() as usize;
        let index = binary_search(&self.pools, |pool| address < pool.range().end);
        (index < self.pools.len() && (index > 0 || address >= self.pools[0].range().start)).then_some(index)
    }
}

impl core::fmt::Debug for SizeClassAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SizeClassAllocator").field("pools", &self.pools).field("spill", &self.spill).finish()
    }
}

/// Does a binary search for the first pool satisfying `f`.
///
/// `f` must be `false` for a prefix of `pools` and `true` for the rest.
pub fn binary_search<F: FnMut(&PartitionPool) -> bool>(pools: &[PartitionPool], mut f: F) -> usize {
    let (mut left, mut right) = (0, pools.len());
    while right > left {
        let middle = left + ((right - left) >> 1);
        if f(&pools[middle]) {
            right = middle;
        } else {
            left = middle + 1;
        }
    }
    left
}
