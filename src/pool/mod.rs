//! Partition pools.
//!
//! A partition pool is a contiguous memory region split into equal-size
//! blocks. Allocation and deallocation take one block from or give one block
//! back to the pool's free list, under a critical section that contains only
//! constant-time work. Since blocks are never split or merged, a pool can't
//! suffer from external fragmentation.
//!
//! When the pool is exhausted, a request may suspend according to its
//! [`WaitMode`]. A later deallocation hands the freed block directly to the
//! suspended request chosen by the pool's
//! [`SuspensionPolicy`](crate::wait::SuspensionPolicy).
//!
//! # Examples
//!
//! ```
//! use drone_mempool::pool::{PartitionPool, PoolConfig};
//! use drone_mempool::timer::ManualTimer;
//! use drone_mempool::{Error, Region};
//! use std::sync::Arc;
//!
//! let pool = PartitionPool::new(Region::leak(2000), PoolConfig::new(40), Arc::new(ManualTimer::new()))?;
//! assert_eq!(pool.capacity(), 50);
//!
//! let block = pool.try_allocate()?;
//! assert_eq!(pool.status().allocated_count, 1);
//! pool.deallocate(block.into())?;
//! assert_eq!(pool.deallocate(block.into()), Err(Error::InvalidPointer));
//! # Ok::<(), Error>(())
//! ```

mod allocate;
mod free_list;

pub use self::allocate::Allocate;
pub use self::free_list::MIN_PARTITION_SIZE;

use self::free_list::FreeList;
use crate::block::{Block, Region};
use crate::error::{ConfigError, Error};
use crate::leak::CallSite;
#[cfg(feature = "leak-tracker")]
use crate::leak::{self, LeakTracker};
use crate::sync::Mutex;
use crate::timer::Timer;
use crate::wait::{Handoff, Requester, SuspensionPolicy, Ticket, WaitEntry, WaitMode, WaitQueue, MAX_WAITERS};
use alloc::sync::Arc;
use core::fmt;
use core::ops::Range;
use core::ptr::NonNull;
use tracing::{debug, trace, warn};

/// Default capacity of a pool's wait queue.
pub const DEFAULT_WAITERS: usize = 16;

/// Parameters of a [`PartitionPool`] fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Block size in bytes.
    pub partition_size: usize,
    /// Resumption order of suspended requests.
    pub policy: SuspensionPolicy,
    /// Maximum number of simultaneously suspended requests.
    pub waiters: usize,
    /// Record outstanding allocations. Ignored without the `leak-tracker`
    /// feature.
    pub track_leaks: bool,
}

impl PoolConfig {
    /// Creates a configuration for blocks of `partition_size` bytes, FIFO
    /// resumption, [`DEFAULT_WAITERS`] wait queue slots, and no leak tracking.
    pub fn new(partition_size: usize) -> Self {
        Self { partition_size, policy: SuspensionPolicy::Fifo, waiters: DEFAULT_WAITERS, track_leaks: false }
    }

    /// Sets the suspension policy.
    #[must_use]
    pub fn policy(mut self, policy: SuspensionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the wait queue capacity. Zero disables suspension.
    #[must_use]
    pub fn waiters(mut self, waiters: usize) -> Self {
        self.waiters = waiters;
        self
    }

    /// Enables or disables leak tracking.
    #[must_use]
    pub fn track_leaks(mut self, track_leaks: bool) -> Self {
        self.track_leaks = track_leaks;
        self
    }
}

/// Point-in-time counters of a pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PoolStatus {
    /// Blocks available for allocation.
    pub free_count: usize,
    /// Blocks currently allocated.
    pub allocated_count: usize,
    /// Requests suspended on the pool.
    pub suspended_count: usize,
}

/// A fixed-block-size memory pool.
pub struct PartitionPool {
    base: NonNull<u8>,
    partition_size: usize,
    capacity: usize,
    policy: SuspensionPolicy,
    state: Mutex<State>,
    timer: Arc<dyn Timer>,
    #[cfg(feature = "leak-tracker")]
    leaks: Option<LeakTracker>,
}

struct State {
    blocks: FreeList,
    waiters: WaitQueue,
}

enum Begin {
    Ready(Result<Block, Error>),
    Queued { ticket: Ticket, handoff: Arc<Handoff> },
}

unsafe impl Send for PartitionPool {}
unsafe impl Sync for PartitionPool {}

impl PartitionPool {
    /// Creates a pool over `region`.
    ///
    /// Fails with [`Error::InvalidConfiguration`] if the partition size is
    /// below [`MIN_PARTITION_SIZE`], the region size is not a positive
    /// multiple of the partition size, or `waiters` exceeds [`MAX_WAITERS`].
    pub fn new(region: Region, config: PoolConfig, timer: Arc<dyn Timer>) -> Result<Self, Error> {
        let PoolConfig { partition_size, policy, waiters, track_leaks } = config;
        if partition_size < MIN_PARTITION_SIZE {
            return Err(ConfigError::PartitionTooSmall { size: partition_size, min: MIN_PARTITION_SIZE }.into());
        }
        if region.is_empty() || region.len() % partition_size != 0 {
            return Err(ConfigError::RegionNotMultiple { region: region.len(), partition: partition_size }.into());
        }
        if waiters > MAX_WAITERS {
            return Err(ConfigError::TooManyWaiters { waiters, max: MAX_WAITERS }.into());
        }
        let capacity = region.len() / partition_size;
        let base = region.start();
        #[cfg(feature = "leak-tracker")]
        let leaks = track_leaks.then(|| LeakTracker::new(base.as_ptr() as usize, partition_size, capacity));
        #[cfg(not(feature = "leak-tracker"))]
        let _ = track_leaks;
        debug!(start = base.as_ptr() as usize, partition_size, capacity, ?policy, "partition pool created");
        Ok(Self {
            base,
            partition_size,
            capacity,
            policy,
            state: Mutex::new(State { blocks: FreeList::new(capacity), waiters: WaitQueue::new(policy, waiters) }),
            timer,
            #[cfg(feature = "leak-tracker")]
            leaks,
        })
    }

    /// Returns the block size.
    #[inline]
    pub fn partition_size(&self) -> usize {
        self.partition_size
    }

    /// Returns the total number of blocks.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the suspension policy.
    #[inline]
    pub fn policy(&self) -> SuspensionPolicy {
        self.policy
    }

    /// Returns the address range of the pool memory.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        let start = self.base.as_ptr() as usize;
        start..start + self.capacity * self.partition_size
    }

    /// Returns `true` if `ptr` points into the pool memory.
    #[inline]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.range().contains(&(ptr.as_ptr() as usize))
    }

    /// Returns the alignment guaranteed for every block of the pool.
    #[inline]
    pub fn block_align(&self) -> usize {
        let bits = self.base.as_ptr() as usize | self.partition_size;
        bits & bits.wrapping_neg()
    }

    /// Returns the leak tracker, if the pool was created with leak tracking.
    #[cfg(feature = "leak-tracker")]
    #[inline]
    pub fn leaks(&self) -> Option<&LeakTracker> {
        self.leaks.as_ref()
    }

    /// Returns a snapshot of the pool counters.
    pub fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        let allocated_count = state.blocks.allocated();
        PoolStatus {
            free_count: self.capacity - allocated_count,
            allocated_count,
            suspended_count: state.waiters.len(),
        }
    }

    /// Allocates one block.
    ///
    /// The returned future resolves immediately if a block is free, or if the
    /// pool is exhausted and `wait` is [`WaitMode::NoWait`]. Otherwise the
    /// request is suspended until a block is freed or the timeout expires.
    /// Dropping a suspended future withdraws the request.
    ///
    /// Use [`Allocate::with_requester`] to set the requester priority.
    #[cfg_attr(feature = "leak-tracker", track_caller)]
    pub fn allocate(&self, wait: WaitMode) -> Allocate<'_> {
        Allocate::new(self, wait, CallSite::caller())
    }

    /// Allocates one block without waiting.
    ///
    /// This operation has *O(1)* time complexity.
    #[cfg_attr(feature = "leak-tracker", track_caller)]
    pub fn try_allocate(&self) -> Result<Block, Error> {
        match self.begin(WaitMode::NoWait, Requester::default(), CallSite::caller()) {
            Begin::Ready(result) => result,
            Begin::Queued { .. } => unreachable!("no-wait request suspended"),
        }
    }

    /// Deallocates the block at `ptr`.
    ///
    /// If requests are suspended on the pool, the block is handed to the next
    /// of them and its task is woken. Fails with [`Error::InvalidPointer`] if
    /// `ptr` is not the start of a block of this pool, or the block is not
    /// allocated.
    ///
    /// This operation has *O(1)* time complexity and never blocks.
    pub fn deallocate(&self, ptr: NonNull<u8>) -> Result<(), Error> {
        let Some(index) = self.index_of(ptr) else {
            warn!(address = ptr.as_ptr() as usize, "deallocation of a pointer outside of pool blocks");
            return Err(Error::InvalidPointer);
        };
        let next = {
            let mut state = self.state.lock();
            if !state.blocks.is_allocated(index) {
                drop(state);
                warn!(address = ptr.as_ptr() as usize, "deallocation of a free block");
                return Err(Error::InvalidPointer);
            }
            self.release(&mut state, index)
        };
        if let Some(handoff) = next {
            trace!(index, partition_size = self.partition_size, "block handed to suspended request");
            handoff.wake();
        }
        Ok(())
    }

    /// Returns the block starting at `ptr` if it is currently allocated.
    pub fn allocated_block(&self, ptr: NonNull<u8>) -> Option<Block> {
        let index = self.index_of(ptr)?;
        let allocated = self.state.lock().blocks.is_allocated(index);
        allocated.then(|| self.block(index))
    }

    pub(crate) fn timer(&self) -> &dyn Timer {
        &*self.timer
    }

    fn index_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let offset = (ptr.as_ptr() as usize).checked_sub(self.base.as_ptr() as usize)?;
        let index = offset / self.partition_size;
        (index < self.capacity && offset % self.partition_size == 0).then_some(index)
    }

    fn block(&self, index: usize) -> Block {
        debug_assert!(index < self.capacity);
        let ptr = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(index * self.partition_size)) };
        Block::new(ptr, self.partition_size)
    }

    /// Serves a request from the free list, or enqueues it.
    fn begin(&self, wait: WaitMode, requester: Requester, site: CallSite) -> Begin {
        let now = match wait {
            WaitMode::NoWait => 0,
            WaitMode::Suspend | WaitMode::Timeout(_) => self.timer.now(),
        };
        // The wait entry is built outside of the critical section, so the lock
        // is taken at most twice.
        let mut entry: Option<WaitEntry> = None;
        loop {
            let mut state = self.state.lock();
            if let Some(index) = unsafe { state.blocks.pop(self.base.as_ptr(), self.partition_size) } {
                self.trace_allocate(index, site);
                drop(state);
                return Begin::Ready(Ok(self.block(index)));
            }
            let deadline = match wait {
                WaitMode::NoWait => {
                    drop(state);
                    trace!(partition_size = self.partition_size, "pool exhausted");
                    return Begin::Ready(Err(Error::ResourceExhausted));
                }
                WaitMode::Timeout(0) => {
                    drop(state);
                    return Begin::Ready(Err(Error::Timeout));
                }
                WaitMode::Timeout(duration) => Some(now.saturating_add(duration)),
                WaitMode::Suspend => None,
            };
            let Some(pending) = entry.take() else {
                drop(state);
                entry = Some(WaitEntry::with_site(requester, now, deadline, site));
                continue;
            };
            let handoff = Arc::clone(&pending.handoff);
            let queued = state.waiters.enqueue(pending);
            drop(state);
            return match queued {
                Ok(ticket) => {
                    trace!(
                        requester = requester.id(),
                        priority = requester.priority(),
                        partition_size = self.partition_size,
                        "allocation suspended"
                    );
                    Begin::Queued { ticket, handoff }
                }
                Err(_) => {
                    debug!(partition_size = self.partition_size, "wait queue full");
                    Begin::Ready(Err(Error::ResourceExhausted))
                }
            };
        }
    }

    /// Resolves a suspended request whose timer fired.
    fn expire(&self, ticket: Ticket, handoff: &Handoff) -> Result<Block, Error> {
        let removed = self.state.lock().waiters.remove_on_timeout(ticket);
        if removed.is_some() {
            debug!(partition_size = self.partition_size, "suspended allocation timed out");
            return Err(Error::Timeout);
        }
        // The request left the queue, so a deallocation has already granted it a
        // block.
        match handoff.take() {
            Some(index) => Ok(self.block(index)),
            None => Err(Error::Timeout),
        }
    }

    /// Withdraws a suspended request whose future was dropped.
    fn cancel(&self, ticket: Ticket, handoff: &Handoff) {
        let (removed, next) = {
            let mut state = self.state.lock();
            match state.waiters.remove_on_timeout(ticket) {
                Some(entry) => (Some(entry), None),
                None => (None, handoff.take().and_then(|index| self.release(&mut state, index))),
            }
        };
        drop(removed);
        if let Some(handoff) = next {
            handoff.wake();
        }
    }

    /// Hands an allocated block to the next suspended request, or returns it
    /// to the free list. Returns the hand-off to wake after the lock is
    /// released.
    fn release(&self, state: &mut State, index: usize) -> Option<Arc<Handoff>> {
        self.trace_deallocate(index);
        if let Some(entry) = state.waiters.dequeue_head() {
            self.trace_allocate(index, entry.site);
            entry.handoff.grant(index);
            Some(entry.handoff)
        } else {
            unsafe { state.blocks.push(self.base.as_ptr(), self.partition_size, index) };
            None
        }
    }

    #[inline(always)]
    fn trace_allocate(&self, index: usize, site: CallSite) {
        #[cfg(feature = "leak-tracker")]
        leak::allocate(self.leaks.as_ref(), index, site);
        #[cfg(not(feature = "leak-tracker"))]
        let _ = (index, site);
    }

    #[inline(always)]
    fn trace_deallocate(&self, index: usize) {
        #[cfg(feature = "leak-tracker")]
        leak::deallocate(self.leaks.as_ref(), index);
        #[cfg(not(feature = "leak-tracker"))]
        let _ = index;
    }
}

impl fmt::Debug for PartitionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionPool")
            .field("start", &self.base)
            .field("partition_size", &self.partition_size)
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualTimer;

    fn pool(region: usize, partition: usize) -> Result<PartitionPool, Error> {
        PartitionPool::new(Region::leak(region), PoolConfig::new(partition), Arc::new(ManualTimer::new()))
    }

    #[test]
    fn rejects_bad_geometry() {
        assert_eq!(
            pool(64, 4).unwrap_err(),
            Error::InvalidConfiguration(ConfigError::PartitionTooSmall { size: 4, min: MIN_PARTITION_SIZE })
        );
        assert_eq!(
            pool(100, 16).unwrap_err(),
            Error::InvalidConfiguration(ConfigError::RegionNotMultiple { region: 100, partition: 16 })
        );
        assert!(matches!(pool(0, 16), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn index_of_requires_block_start() {
        let pool = pool(64, 16).unwrap();
        let base = pool.range().start;
        let at = |addr: usize| pool.index_of(NonNull::new(addr as *mut u8).unwrap());
        assert_eq!(at(base), Some(0));
        assert_eq!(at(base + 48), Some(3));
        assert_eq!(at(base + 17), None);
        assert_eq!(at(base + 64), None);
        assert_eq!(at(base - 16), None);
    }

    #[test]
    fn block_align() {
        let odd = pool(96, 24).unwrap();
        assert_eq!(odd.block_align(), 8);
        let even = pool(128, 32).unwrap();
        assert!(even.block_align() >= 16);
        assert!(even.range().step_by(32).all(|addr| addr % even.block_align() == 0));
    }

    #[test]
    fn timeout_zero_fails_without_suspending() {
        let pool = pool(16, 16).unwrap();
        let _block = pool.try_allocate().unwrap();
        let result = futures::executor::block_on(pool.allocate(WaitMode::Timeout(0)));
        assert_eq!(result, Err(Error::Timeout));
        assert_eq!(pool.status().suspended_count, 0);
    }

    #[test]
    fn zero_waiters_disable_suspension() {
        let timer = Arc::new(ManualTimer::new());
        let pool = PartitionPool::new(Region::leak(16), PoolConfig::new(16).waiters(0), timer).unwrap();
        let _block = pool.try_allocate().unwrap();
        let result = futures::executor::block_on(pool.allocate(WaitMode::Suspend));
        assert_eq!(result, Err(Error::ResourceExhausted));
    }
}
