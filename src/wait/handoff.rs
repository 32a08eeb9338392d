use core::sync::atomic::AtomicUsize;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Release};
use core::task::Context;
use futures::task::AtomicWaker;

const EMPTY: usize = usize::MAX;

/// A single-use slot through which a deallocation passes a block index to a
/// suspended request.
///
/// The block is granted while the pool lock is held, and the waker is called
/// after the lock is released.
pub(crate) struct Handoff {
    block: AtomicUsize,
    waker: AtomicWaker,
}

impl Handoff {
    pub(crate) fn new() -> Self {
        Self { block: AtomicUsize::new(EMPTY), waker: AtomicWaker::new() }
    }

    pub(crate) fn grant(&self, index: usize) {
        debug_assert_ne!(index, EMPTY);
        let prev = self.block.swap(index, Release);
        debug_assert_eq!(prev, EMPTY, "block granted twice");
    }

    pub(crate) fn wake(&self) {
        self.waker.wake();
    }

    pub(crate) fn take(&self) -> Option<usize> {
        let index = self.block.swap(EMPTY, AcqRel);
        (index != EMPTY).then_some(index)
    }

    /// Takes the granted block, or registers the task to be woken on grant.
    pub(crate) fn poll_take(&self, cx: &Context<'_>) -> Option<usize> {
        if self.block.load(Acquire) != EMPTY {
            return self.take();
        }
        self.waker.register(cx.waker());
        self.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker_ref;

    #[test]
    fn grant_then_take() {
        let handoff = Handoff::new();
        let cx = Context::from_waker(noop_waker_ref());
        assert_eq!(handoff.poll_take(&cx), None);
        handoff.grant(4);
        handoff.wake();
        assert_eq!(handoff.poll_take(&cx), Some(4));
        assert_eq!(handoff.take(), None);
    }
}
