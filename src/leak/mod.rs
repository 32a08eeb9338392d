//! Leak tracking.
//!
//! With the `leak-tracker` feature, a pool created with
//! [`PoolConfig::track_leaks`](crate::pool::PoolConfig::track_leaks) records
//! for every allocated block the call site of the request and an allocation
//! epoch. Records are written with plain atomic stores inside the pool's
//! critical section, and read back by [`LeakTracker::snapshot`] without taking
//! any lock.
//!
//! Compare two snapshots to find blocks allocated in between and never freed:
//!
//! ```
//! # #[cfg(feature = "leak-tracker")] {
//! use drone_mempool::pool::{PartitionPool, PoolConfig};
//! use drone_mempool::timer::ManualTimer;
//! use drone_mempool::Region;
//! use std::sync::Arc;
//!
//! let config = PoolConfig::new(32).track_leaks(true);
//! let pool = PartitionPool::new(Region::leak(256), config, Arc::new(ManualTimer::new())).unwrap();
//! let tracker = pool.leaks().unwrap();
//!
//! let baseline = tracker.snapshot();
//! let kept = pool.try_allocate().unwrap();
//! let freed = pool.try_allocate().unwrap();
//! pool.deallocate(freed.into()).unwrap();
//!
//! let leaked = tracker.snapshot().diff(&baseline);
//! assert_eq!(leaked.len(), 1);
//! assert_eq!(leaked.entries()[0].address, kept.as_ptr() as usize);
//! # }
//! ```

#[cfg(feature = "leak-tracker")]
mod snapshot;
#[cfg(feature = "leak-tracker")]
mod tracker;

#[cfg(feature = "leak-tracker")]
pub use self::snapshot::{Outstanding, Snapshot};
#[cfg(feature = "leak-tracker")]
pub use self::tracker::LeakTracker;
#[cfg(feature = "leak-tracker")]
pub(crate) use self::tracker::{allocate, deallocate};

use core::panic::Location;

/// Source location of an allocation request.
///
/// Zero-sized unless the `leak-tracker` feature is enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallSite {
    #[cfg(feature = "leak-tracker")]
    location: &'static Location<'static>,
}

impl CallSite {
    /// Captures the location of the caller.
    #[cfg_attr(feature = "leak-tracker", track_caller)]
    #[inline(always)]
    pub fn caller() -> Self {
        Self {
            #[cfg(feature = "leak-tracker")]
            location: Location::caller(),
        }
    }

    /// Returns the captured location, or `None` if leak tracking is compiled
    /// out.
    #[inline]
    pub fn location(self) -> Option<&'static Location<'static>> {
        #[cfg(feature = "leak-tracker")]
        return Some(self.location);
        #[cfg(not(feature = "leak-tracker"))]
        return None;
    }
}
