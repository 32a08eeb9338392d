use super::{SuspensionPolicy, WaitEntry, PRIORITY_LEVELS};
use alloc::vec::Vec;
use core::fmt;

const NIL: u32 = u32::MAX;
const LEVELS: usize = PRIORITY_LEVELS as usize;

/// Maximum capacity of a [`WaitQueue`].
pub const MAX_WAITERS: usize = NIL as usize - 1;

/// Identifies an entry in a [`WaitQueue`].
///
/// A ticket stays unique after its entry leaves the queue: a slot reused by a
/// later entry gets a new generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket {
    slot: u32,
    generation: u32,
}

/// Ordered collection of suspended requests.
///
/// Entries are stored in a slab preallocated at creation. Every priority level
/// is a doubly-linked list of slab indices in arrival order, and a bitmap marks
/// the non-empty levels. Under [`SuspensionPolicy::Fifo`] all entries share
/// level zero.
///
/// All operations have *O(1)* time complexity and never allocate.
pub struct WaitQueue {
    policy: SuspensionPolicy,
    slots: Vec<Slot>,
    vacant: u32,
    heads: [u32; LEVELS],
    tails: [u32; LEVELS],
    pending: u32,
    len: usize,
}

struct Slot {
    generation: u32,
    level: u8,
    prev: u32,
    next: u32,
    entry: Option<WaitEntry>,
}

impl WaitQueue {
    /// Creates an empty queue able to hold `capacity` entries.
    ///
    /// # Panics
    ///
    /// If `capacity` is greater than [`MAX_WAITERS`].
    pub fn new(policy: SuspensionPolicy, capacity: usize) -> Self {
        assert!(capacity <= MAX_WAITERS);
        let slots = (0..capacity)
            .map(|i| Slot {
                generation: 0,
                level: 0,
                prev: NIL,
                next: if i + 1 < capacity { i as u32 + 1 } else { NIL },
                entry: None,
            })
            .collect();
        Self {
            policy,
            slots,
            vacant: if capacity > 0 { 0 } else { NIL },
            heads: [NIL; LEVELS],
            tails: [NIL; LEVELS],
            pending: 0,
            len: 0,
        }
    }

    /// Returns the resumption policy.
    #[inline]
    pub fn policy(&self) -> SuspensionPolicy {
        self.policy
    }

    /// Returns the number of queued entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no entries are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the maximum number of entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Appends `entry` behind all entries it doesn't take precedence over.
    ///
    /// If the queue is full, the entry is returned back.
    pub fn enqueue(&mut self, entry: WaitEntry) -> Result<Ticket, WaitEntry> {
        if self.vacant == NIL {
            return Err(entry);
        }
        let level = match self.policy {
            SuspensionPolicy::Fifo => 0,
            SuspensionPolicy::Priority => entry.requester.priority(),
        };
        let index = self.vacant;
        let tail = self.tails[usize::from(level)];
        let slot = &mut self.slots[index as usize];
        self.vacant = slot.next;
        slot.level = level;
        slot.prev = tail;
        slot.next = NIL;
        slot.entry = Some(entry);
        let ticket = Ticket { slot: index, generation: slot.generation };
        if tail == NIL {
            self.heads[usize::from(level)] = index;
            self.pending |= 1 << level;
        } else {
            self.slots[tail as usize].next = index;
        }
        self.tails[usize::from(level)] = index;
        self.len += 1;
        Ok(ticket)
    }

    /// Removes and returns the entry to be resumed next.
    pub fn dequeue_head(&mut self) -> Option<WaitEntry> {
        if self.pending == 0 {
            return None;
        }
        let level = LEVELS - 1 - self.pending.leading_zeros() as usize;
        let index = self.heads[level];
        Some(self.release(index))
    }

    /// Removes the entry identified by `ticket` if it is still queued.
    pub fn remove_on_timeout(&mut self, ticket: Ticket) -> Option<WaitEntry> {
        let slot = self.slots.get(ticket.slot as usize)?;
        if slot.generation != ticket.generation || slot.entry.is_none() {
            return None;
        }
        Some(self.release(ticket.slot))
    }

    /// Returns the queued entry identified by `ticket`.
    pub fn get(&self, ticket: Ticket) -> Option<&WaitEntry> {
        self.slots
            .get(ticket.slot as usize)
            .filter(|slot| slot.generation == ticket.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn release(&mut self, index: u32) -> WaitEntry {
        let slot = &mut self.slots[index as usize];
        let (level, prev, next) = (usize::from(slot.level), slot.prev, slot.next);
        let entry = slot.entry.take();
        slot.generation = slot.generation.wrapping_add(1);
        slot.prev = NIL;
        slot.next = self.vacant;
        self.vacant = index;
        if prev == NIL {
            self.heads[level] = next;
        } else {
            self.slots[prev as usize].next = next;
        }
        if next == NIL {
            self.tails[level] = prev;
        } else {
            self.slots[next as usize].prev = prev;
        }
        if self.heads[level] == NIL {
            self.pending &= !(1 << level);
        }
        self.len -= 1;
        match entry {
            Some(entry) => entry,
            None => unreachable!("released a vacant wait queue slot"),
        }
    }
}

impl fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitQueue")
            .field("policy", &self.policy)
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}
