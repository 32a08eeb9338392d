//! Suspension of allocation requests.
//!
//! A request that finds its pool exhausted may wait for a block instead of
//! failing. Waiting requests are kept in a per-pool [`WaitQueue`]. A block
//! freed while the queue is non-empty is handed to the entry selected by the
//! pool's [`SuspensionPolicy`] and never touches the free list.

mod handoff;
mod queue;

pub(crate) use self::handoff::Handoff;
pub use self::queue::{Ticket, WaitQueue, MAX_WAITERS};

use crate::leak::CallSite;
use crate::timer::Ticks;
use alloc::sync::Arc;
use core::fmt;

/// Number of priority levels.
pub const PRIORITY_LEVELS: u8 = 32;

/// Order in which suspended requests are resumed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config", derive(serde::Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "lowercase"))]
pub enum SuspensionPolicy {
    /// Strictly in arrival order.
    #[default]
    Fifo,
    /// In descending requester priority; ties are broken by arrival order.
    Priority,
}

/// What an allocation request does when the pool is exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WaitMode {
    /// Fail immediately with [`ResourceExhausted`](crate::Error::ResourceExhausted).
    NoWait,
    /// Wait until a block is freed.
    Suspend,
    /// Wait until a block is freed, or fail with
    /// [`Timeout`](crate::Error::Timeout) after the given number of ticks.
    Timeout(Ticks),
}

/// Identity and priority of the task issuing a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Requester {
    id: u32,
    priority: u8,
}

impl Requester {
    /// Creates a new requester.
    ///
    /// # Panics
    ///
    /// If `priority` is greater than or equals to [`PRIORITY_LEVELS`].
    #[inline]
    pub const fn new(id: u32, priority: u8) -> Self {
        assert!(priority < PRIORITY_LEVELS);
        Self { id, priority }
    }

    /// Returns the requester identifier.
    #[inline]
    pub const fn id(self) -> u32 {
        self.id
    }

    /// Returns the requester priority. Higher values are resumed first under
    /// [`SuspensionPolicy::Priority`].
    #[inline]
    pub const fn priority(self) -> u8 {
        self.priority
    }
}

/// A suspended allocation request.
pub struct WaitEntry {
    /// The suspended requester.
    pub requester: Requester,
    /// Tick count at suspension.
    pub enqueued_at: Ticks,
    /// Tick count at which the request times out, if any.
    pub deadline: Option<Ticks>,
    pub(crate) site: CallSite,
    pub(crate) handoff: Arc<Handoff>,
}

impl WaitEntry {
    /// Creates a new entry for `requester` suspended at `enqueued_at`.
    #[cfg_attr(feature = "leak-tracker", track_caller)]
    pub fn new(requester: Requester, enqueued_at: Ticks, deadline: Option<Ticks>) -> Self {
        Self::with_site(requester, enqueued_at, deadline, CallSite::caller())
    }

    pub(crate) fn with_site(
        requester: Requester,
        enqueued_at: Ticks,
        deadline: Option<Ticks>,
        site: CallSite,
    ) -> Self {
        Self { requester, enqueued_at, deadline, site, handoff: Arc::new(Handoff::new()) }
    }
}

impl fmt::Debug for WaitEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitEntry")
            .field("requester", &self.requester)
            .field("enqueued_at", &self.enqueued_at)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
