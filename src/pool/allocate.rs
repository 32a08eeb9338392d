use super::{Begin, PartitionPool};
use crate::block::Block;
use crate::error::Error;
use crate::leak::CallSite;
use crate::timer::TimerSleep;
use crate::wait::{Handoff, Requester, Ticket, WaitMode};
use alloc::sync::Arc;
use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use futures::future::FusedFuture;

/// Future created from [`PartitionPool::allocate`].
///
/// The request is issued on the first poll. Dropping the future after that
/// withdraws the request from the wait queue, or returns the block if one was
/// already handed to it.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Allocate<'a> {
    pool: &'a PartitionPool,
    wait: WaitMode,
    requester: Requester,
    site: CallSite,
    state: State,
}

enum State {
    Init,
    Waiting { ticket: Ticket, handoff: Arc<Handoff>, sleep: Option<TimerSleep> },
    Done,
}

impl<'a> Allocate<'a> {
    pub(super) fn new(pool: &'a PartitionPool, wait: WaitMode, site: CallSite) -> Self {
        Self { pool, wait, requester: Requester::default(), site, state: State::Init }
    }

    /// Issues the request on behalf of `requester`.
    ///
    /// Has no effect once the future was polled.
    #[must_use]
    pub fn with_requester(mut self, requester: Requester) -> Self {
        self.requester = requester;
        self
    }

    /// Returns the wait mode of the request.
    #[inline]
    pub fn wait_mode(&self) -> WaitMode {
        self.wait
    }

    /// Returns the requester of the request.
    #[inline]
    pub fn requester(&self) -> Requester {
        self.requester
    }
}

impl Future for Allocate<'_> {
    type Output = Result<Block, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if let State::Init = this.state {
            match this.pool.begin(this.wait, this.requester, this.site) {
                Begin::Ready(result) => {
                    this.state = State::Done;
                    return Poll::Ready(result);
                }
                Begin::Queued { ticket, handoff } => {
                    let sleep = match this.wait {
                        WaitMode::Timeout(duration) => Some(this.pool.timer().sleep(duration)),
                        WaitMode::Suspend | WaitMode::NoWait => None,
                    };
                    this.state = State::Waiting { ticket, handoff, sleep };
                }
            }
        }
        let State::Waiting { ticket, handoff, sleep } = &mut this.state else {
            panic!("`Allocate` polled after completion");
        };
        if let Some(index) = handoff.poll_take(cx) {
            this.state = State::Done;
            return Poll::Ready(Ok(this.pool.block(index)));
        }
        if let Some(sleep) = sleep {
            if Pin::new(sleep).poll(cx).is_ready() {
                let result = this.pool.expire(*ticket, handoff);
                this.state = State::Done;
                return Poll::Ready(result);
            }
        }
        Poll::Pending
    }
}

impl FusedFuture for Allocate<'_> {
    fn is_terminated(&self) -> bool {
        matches!(self.state, State::Done)
    }
}

impl Drop for Allocate<'_> {
    fn drop(&mut self) {
        if let State::Waiting { ticket, handoff, .. } = &self.state {
            self.pool.cancel(*ticket, handoff);
        }
    }
}

impl fmt::Debug for Allocate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Init => "init",
            State::Waiting { .. } => "waiting",
            State::Done => "done",
        };
        f.debug_struct("Allocate")
            .field("pool", &self.pool)
            .field("wait", &self.wait)
            .field("requester", &self.requester)
            .field("state", &state)
            .finish()
    }
}
