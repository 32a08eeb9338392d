//! Timers.
//!
//! The allocation service doesn't keep time on its own. Suspend-with-timeout
//! requests consume a [`Timer`] provided by the platform scheduler.
//! [`ManualTimer`] is a software timer advanced explicitly, used to simulate
//! the scheduler deterministically.

use crate::sync::Mutex;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

/// Timer tick count. The duration of a tick is defined by the timer.
pub type Ticks = u64;

/// Generic timer driver.
pub trait Timer: Send + Sync {
    /// Returns the current tick count.
    fn now(&self) -> Ticks;

    /// Returns a future which resolves when `duration` ticks elapsed.
    fn sleep(&self, duration: Ticks) -> TimerSleep;
}

/// Future created from [`Timer::sleep`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct TimerSleep {
    future: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl TimerSleep {
    /// Creates a new [`TimerSleep`].
    pub fn new(future: Pin<Box<dyn Future<Output = ()> + Send>>) -> Self {
        Self { future }
    }
}

impl Future for TimerSleep {
    type Output = ();

    #[inline]
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.future.as_mut().poll(cx)
    }
}

impl fmt::Debug for TimerSleep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerSleep").finish_non_exhaustive()
    }
}

/// A timer which advances only when told to.
///
/// Clones share the same clock.
///
/// # Examples
///
/// ```
/// use drone_mempool::timer::{ManualTimer, Timer};
///
/// let timer = ManualTimer::new();
/// timer.advance(5);
/// assert_eq!(timer.now(), 5);
/// ```
#[derive(Clone, Default)]
pub struct ManualTimer {
    shared: Arc<Mutex<Clock>>,
}

#[derive(Default)]
struct Clock {
    now: Ticks,
    sleepers: Vec<(Ticks, Waker)>,
}

impl ManualTimer {
    /// Creates a new timer at tick zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `ticks` and wakes all sleepers whose
    /// deadline is reached.
    pub fn advance(&self, ticks: Ticks) {
        let due = {
            let mut clock = self.shared.lock();
            clock.now = clock.now.saturating_add(ticks);
            let now = clock.now;
            let (due, pending) = clock.sleepers.drain(..).partition::<Vec<_>, _>(|&(deadline, _)| deadline <= now);
            clock.sleepers = pending;
            due
        };
        for (_, waker) in due {
            waker.wake();
        }
    }

    /// Returns the number of sleepers registered and not yet woken.
    pub fn sleepers(&self) -> usize {
        self.shared.lock().sleepers.len()
    }
}

impl Timer for ManualTimer {
    fn now(&self) -> Ticks {
        self.shared.lock().now
    }

    fn sleep(&self, duration: Ticks) -> TimerSleep {
        let deadline = self.now().saturating_add(duration);
        TimerSleep::new(Box::pin(ManualSleep { shared: Arc::clone(&self.shared), deadline }))
    }
}

impl fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTimer").field("now", &self.now()).finish()
    }
}

struct ManualSleep {
    shared: Arc<Mutex<Clock>>,
    deadline: Ticks,
}

impl Future for ManualSleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut clock = self.shared.lock();
        if clock.now >= self.deadline {
            return Poll::Ready(());
        }
        let deadline = self.deadline;
        match clock.sleepers.iter_mut().find(|(d, w)| *d == deadline && w.will_wake(cx.waker())) {
            Some((_, waker)) => waker.clone_from(cx.waker()),
            None => clock.sleepers.push((deadline, cx.waker().clone())),
        }
        Poll::Pending
    }
}
