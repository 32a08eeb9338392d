//! Error types.

use thiserror::Error;

/// The error type for allocation service operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// The pool or allocator layout is invalid. Returned only at creation
    /// time; no pool is created.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),
    /// No free block is available and the request could not wait for one.
    #[error("no free block available")]
    ResourceExhausted,
    /// A suspended request was not satisfied before its deadline.
    #[error("timed out waiting for a free block")]
    Timeout,
    /// The pointer doesn't reference a currently allocated block of this pool.
    /// Covers foreign pointers, interior pointers, and double-free.
    #[error("pointer does not reference an allocated block")]
    InvalidPointer,
    /// The requested size exceeds the largest configured size class.
    #[error("requested {size} bytes, largest size class is {max} bytes")]
    SizeTooLarge {
        /// Requested size in bytes.
        size: usize,
        /// Block size of the largest size class.
        max: usize,
    },
}

/// Reason of an [`Error::InvalidConfiguration`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The partition can't hold the free-list link.
    #[error("partition size {size} is below the minimum of {min} bytes")]
    PartitionTooSmall {
        /// Configured partition size.
        size: usize,
        /// Minimum partition size.
        min: usize,
    },
    /// The region size is zero or not a multiple of the partition size.
    #[error("region of {region} bytes is not a positive multiple of partition size {partition}")]
    RegionNotMultiple {
        /// Region size in bytes.
        region: usize,
        /// Partition size in bytes.
        partition: usize,
    },
    /// The wait queue capacity can't be indexed.
    #[error("wait queue capacity {waiters} exceeds the maximum of {max}")]
    TooManyWaiters {
        /// Configured wait queue capacity.
        waiters: usize,
        /// Maximum wait queue capacity.
        max: usize,
    },
    /// The heap layout declares no pools.
    #[error("heap layout has no pools")]
    EmptyLayout,
    /// A size class has no blocks.
    #[error("size class {block} has zero capacity")]
    ZeroCapacity {
        /// Block size of the offending class.
        block: usize,
    },
    /// Size classes are not strictly increasing.
    #[error("size class {block} does not exceed the preceding class {prev}")]
    NonIncreasing {
        /// Block size of the preceding class.
        prev: usize,
        /// Block size of the offending class.
        block: usize,
    },
    /// The supplied region can't hold the layout.
    #[error("region of {region} bytes is smaller than the required {required} bytes")]
    RegionTooSmall {
        /// Region size in bytes.
        region: usize,
        /// Bytes required by the layout.
        required: usize,
    },
    /// The region overlaps a region of an existing pool.
    #[error("region overlaps an existing pool")]
    Overlap,
    /// The declared heap size doesn't match the sum of its pools.
    #[error("declared heap size {declared} doesn't match the pools total {actual}")]
    SizeMismatch {
        /// Declared size.
        declared: usize,
        /// Sum of `block * capacity` over all pools.
        actual: usize,
    },
}
