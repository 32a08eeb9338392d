//! Variable-size allocation over partition pools.
//!
//! Objectives like real-time characteristics, high concurrency, and a bounded
//! worst case have led to the memory pools design of the heap. Every
//! operation has *O(log n)* time complexity in the number of size classes and
//! *O(1)* in the number of blocks, which means it is deterministic.
//!
//! A continuous memory region is split into pools. A pool is further split
//! into fixed-size blocks that hold actual allocations. A pool is defined by
//! its block size and the number of blocks. A drawback of this approach is
//! that the pools may need to be tuned for the application: a request is
//! served by a block of its class, wasting at most the difference to the next
//! smaller class.
//!
//! # Usage
//!
//! ```
//! use drone_mempool::heap::{HeapLayout, PoolLayout, SizeClassAllocator};
//! use drone_mempool::timer::ManualTimer;
//! use drone_mempool::{Error, Region};
//! use std::sync::Arc;
//!
//! let layout = HeapLayout::new([
//!     PoolLayout::new(8, 128),
//!     PoolLayout::new(32, 64),
//!     PoolLayout::new(256, 16),
//! ]);
//! let heap = SizeClassAllocator::configure(Region::leak(layout.size()), &layout, Arc::new(ManualTimer::new()))?;
//!
//! let block = heap.try_allocate(20)?;
//! assert_eq!(block.len(), 32);
//! heap.free(block.into())?;
//! assert_eq!(heap.try_allocate(300), Err(Error::SizeTooLarge { size: 300, max: 256 }));
//! # Ok::<(), Error>(())
//! ```
//!
//! With the `config` feature, the layout can be read from the `[heap]` table
//! of a `Drone.toml`-like document, see [`HeapLayout::from_toml`].

mod allocator;
mod layout;

pub use self::allocator::{binary_search, SizeClassAllocator, BLOCK_HEADER_SIZE};
pub use self::layout::{HeapLayout, PoolLayout};
