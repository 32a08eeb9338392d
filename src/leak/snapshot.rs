use super::CallSite;
use alloc::vec::Vec;
use core::fmt;

/// An outstanding allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outstanding {
    /// Block index within the pool.
    pub index: usize,
    /// Block address.
    pub address: usize,
    /// Allocation epoch. Epochs increase with every allocation of the pool.
    pub epoch: usize,
    /// Where the allocation was requested.
    pub site: CallSite,
}

/// Outstanding allocations of one pool at some point in time.
#[derive(Clone, Debug)]
pub struct Snapshot {
    base: usize,
    partition_size: usize,
    total_allocations: usize,
    entries: Vec<Outstanding>,
}

impl Snapshot {
    pub(super) fn new(
        base: usize,
        partition_size: usize,
        total_allocations: usize,
        entries: Vec<Outstanding>,
    ) -> Self {
        Self { base, partition_size, total_allocations, entries }
    }

    /// Returns the outstanding allocations ordered by block index.
    #[inline]
    pub fn entries(&self) -> &[Outstanding] {
        &self.entries
    }

    /// Returns the number of outstanding allocations.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was outstanding.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the partition size of the pool.
    #[inline]
    pub fn partition_size(&self) -> usize {
        self.partition_size
    }

    /// Returns the allocations outstanding in `self` that were not outstanding
    /// in `baseline`.
    ///
    /// A block freed and allocated again between the two snapshots counts as a
    /// new allocation.
    pub fn diff(&self, baseline: &Snapshot) -> Snapshot {
        let entries = self
            .entries
            .iter()
            .filter(|entry| {
                baseline
                    .entries
                    .binary_search_by_key(&entry.index, |old| old.index)
                    .map_or(true, |i| baseline.entries[i].epoch != entry.epoch)
            })
            .copied()
            .collect();
        Snapshot::new(self.base, self.partition_size, self.total_allocations, entries)
    }

    /// Groups the outstanding allocations by call site, most frequent first.
    pub fn by_site(&self) -> Vec<(CallSite, usize)> {
        let mut sites: Vec<(CallSite, usize)> = Vec::new();
        for entry in &self.entries {
            match sites.iter_mut().find(|(site, _)| *site == entry.site) {
                Some((_, count)) => *count += 1,
                None => sites.push((entry.site, 1)),
            }
        }
        sites.sort_by(|a, b| b.1.cmp(&a.1));
        sites
    }

    /// Writes a human-readable summary to `sink`.
    pub fn write_report<W: fmt::Write>(&self, sink: &mut W) -> fmt::Result {
        writeln!(
            sink,
            "pool {:#x} partition {}: {} outstanding of {} allocations",
            self.base,
            self.partition_size,
            self.len(),
            self.total_allocations,
        )?;
        for (site, count) in self.by_site() {
            match site.location() {
                Some(location) => writeln!(sink, "  {count} at {location}")?,
                None => writeln!(sink, "  {count} at unknown location")?,
            }
        }
        Ok(())
    }
}
