use crate::error::ConfigError;
use crate::pool::{DEFAULT_WAITERS, MIN_PARTITION_SIZE};
use crate::wait::{SuspensionPolicy, MAX_WAITERS};
use alloc::vec::Vec;

/// One size class of a [`HeapLayout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolLayout {
    /// Block size in bytes.
    pub block: usize,
    /// Number of blocks.
    pub capacity: usize,
}

impl PoolLayout {
    /// Creates a new size class.
    #[inline]
    pub const fn new(block: usize, capacity: usize) -> Self {
        Self { block, capacity }
    }

    /// Returns the number of bytes the class occupies.
    #[inline]
    pub const fn size(&self) -> usize {
        self.block.saturating_mul(self.capacity)
    }
}

/// The pools layout of a [`SizeClassAllocator`](super::SizeClassAllocator).
///
/// # Examples
///
/// ```
/// use drone_mempool::heap::{HeapLayout, PoolLayout};
///
/// let layout = HeapLayout::new([PoolLayout::new(8, 64), PoolLayout::new(32, 16)]).spill(true);
/// assert_eq!(layout.size(), 1024);
/// assert_eq!(HeapLayout::doubling(16, 128, 4).pools().len(), 4);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapLayout {
    pools: Vec<PoolLayout>,
    policy: SuspensionPolicy,
    waiters: usize,
    spill: bool,
    track_leaks: bool,
}

impl HeapLayout {
    /// Creates a layout from size classes in ascending block size order.
    pub fn new(pools: impl IntoIterator<Item = PoolLayout>) -> Self {
        Self {
            pools: pools.into_iter().collect(),
            policy: SuspensionPolicy::Fifo,
            waiters: DEFAULT_WAITERS,
            spill: false,
            track_leaks: false,
        }
    }

    /// Creates a layout of block sizes doubling from `min` up to `max`, each
    /// with `capacity` blocks.
    pub fn doubling(min: usize, max: usize, capacity: usize) -> Self {
        let mut pools = Vec::new();
        let mut block = min.max(1);
        while block <= max {
            pools.push(PoolLayout::new(block, capacity));
            let Some(next) = block.checked_mul(2) else { break };
            block = next;
        }
        Self::new(pools)
    }

    /// Sets the suspension policy of every class.
    #[must_use]
    pub fn policy(mut self, policy: SuspensionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the wait queue capacity of every class.
    #[must_use]
    pub fn waiters(mut self, waiters: usize) -> Self {
        self.waiters = waiters;
        self
    }

    /// Lets requests served without waiting fall through to larger classes
    /// when their own class is exhausted.
    #[must_use]
    pub fn spill(mut self, spill: bool) -> Self {
        self.spill = spill;
        self
    }

    /// Enables or disables leak tracking in every class.
    #[must_use]
    pub fn track_leaks(mut self, track_leaks: bool) -> Self {
        self.track_leaks = track_leaks;
        self
    }

    /// Returns the size classes.
    #[inline]
    pub fn pools(&self) -> &[PoolLayout] {
        &self.pools
    }

    /// Returns the suspension policy.
    #[inline]
    pub fn suspension_policy(&self) -> SuspensionPolicy {
        self.policy
    }

    /// Returns the wait queue capacity of each class.
    #[inline]
    pub fn wait_capacity(&self) -> usize {
        self.waiters
    }

    /// Returns `true` if spilling to larger classes is enabled.
    #[inline]
    pub fn spills(&self) -> bool {
        self.spill
    }

    /// Returns `true` if leak tracking is enabled.
    #[inline]
    pub fn tracks_leaks(&self) -> bool {
        self.track_leaks
    }

    /// Returns the total number of bytes of all classes.
    pub fn size(&self) -> usize {
        self.pools.iter().fold(0, |sum, pool| sum.saturating_add(pool.size()))
    }

    /// Checks that the layout is non-empty, every class holds at least one
    /// block of at least [`MIN_PARTITION_SIZE`] bytes, and block sizes are
    /// strictly increasing. The wait queue capacity must not exceed
    /// [`MAX_WAITERS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pools.is_empty() {
            return Err(ConfigError::EmptyLayout);
        }
        if self.waiters > MAX_WAITERS {
            return Err(ConfigError::TooManyWaiters { waiters: self.waiters, max: MAX_WAITERS });
        }
        let mut prev = None;
        for pool in &self.pools {
            if pool.block < MIN_PARTITION_SIZE {
                return Err(ConfigError::PartitionTooSmall { size: pool.block, min: MIN_PARTITION_SIZE });
            }
            if pool.capacity == 0 {
                return Err(ConfigError::ZeroCapacity { block: pool.block });
            }
            if let Some(prev) = prev.filter(|&prev| prev >= pool.block) {
                return Err(ConfigError::NonIncreasing { prev, block: pool.block });
            }
            prev = Some(pool.block);
        }
        Ok(())
    }
}
