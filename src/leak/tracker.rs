use super::{CallSite, Outstanding, Snapshot};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::panic::Location;
use core::ptr;
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use core::sync::atomic::{AtomicPtr, AtomicUsize};

const READ_RETRIES: usize = 4;

/// Per-pool record of outstanding allocations.
pub struct LeakTracker {
    base: usize,
    partition_size: usize,
    epoch: AtomicUsize,
    outstanding: AtomicUsize,
    records: Box<[Record]>,
}

struct Record {
    /// Allocation epoch of the current owner, zero when free.
    epoch: AtomicUsize,
    site: AtomicPtr<Location<'static>>,
}

impl LeakTracker {
    pub(crate) fn new(base: usize, partition_size: usize, capacity: usize) -> Self {
        let records = (0..capacity)
            .map(|_| Record { epoch: AtomicUsize::new(0), site: AtomicPtr::new(ptr::null_mut()) })
            .collect();
        Self { base, partition_size, epoch: AtomicUsize::new(0), outstanding: AtomicUsize::new(0), records }
    }

    /// Returns the number of blocks currently allocated and not freed.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Relaxed)
    }

    /// Returns the number of allocations recorded since creation.
    #[inline]
    pub fn total_allocations(&self) -> usize {
        self.epoch.load(Relaxed)
    }

    /// Collects the outstanding allocations.
    ///
    /// The snapshot is assembled without locking the pool. Blocks changing
    /// hands while the snapshot is taken may be missed or reported with their
    /// previous owner.
    pub fn snapshot(&self) -> Snapshot {
        let mut entries = Vec::new();
        for (index, record) in self.records.iter().enumerate() {
            for _ in 0..READ_RETRIES {
                let epoch = record.epoch.load(Acquire);
                if epoch == 0 {
                    break;
                }
                let site = record.site.load(Acquire);
                if record.epoch.load(Acquire) != epoch || site.is_null() {
                    continue;
                }
                let location: &'static Location<'static> = unsafe { &*site };
                entries.push(Outstanding {
                    index,
                    address: self.base + index * self.partition_size,
                    epoch,
                    site: CallSite { location },
                });
                break;
            }
        }
        Snapshot::new(self.base, self.partition_size, self.total_allocations(), entries)
    }

    fn allocate(&self, index: usize, site: CallSite) {
        let epoch = self.epoch.fetch_add(1, Relaxed) + 1;
        let record = &self.records[index];
        record.site.store(ptr::from_ref(site.location).cast_mut(), Release);
        record.epoch.store(epoch, Release);
        self.outstanding.fetch_add(1, Relaxed);
    }

    fn deallocate(&self, index: usize) {
        self.records[index].epoch.store(0, Release);
        self.outstanding.fetch_sub(1, Relaxed);
    }
}

impl fmt::Debug for LeakTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeakTracker")
            .field("partition_size", &self.partition_size)
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}

#[inline(always)]
pub(crate) fn allocate(tracker: Option<&LeakTracker>, index: usize, site: CallSite) {
    #[inline(never)]
    fn trace(tracker: &LeakTracker, index: usize, site: CallSite) {
        tracker.allocate(index, site);
    }
    if let Some(tracker) = tracker {
        trace(tracker, index, site);
    }
}

#[inline(always)]
pub(crate) fn deallocate(tracker: Option<&LeakTracker>, index: usize) {
    #[inline(never)]
    fn trace(tracker: &LeakTracker, index: usize) {
        tracker.deallocate(index);
    }
    if let Some(tracker) = tracker {
        trace(tracker, index);
    }
}
