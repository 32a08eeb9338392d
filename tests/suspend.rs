use drone_mempool::pool::{PartitionPool, PoolConfig};
use drone_mempool::timer::{ManualTimer, Timer};
use drone_mempool::wait::{Requester, SuspensionPolicy, WaitMode};
use drone_mempool::{Block, Error, Region};
use futures::future::FusedFuture;
use futures::task::{noop_waker_ref, waker, ArcWake};
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

struct Counter(AtomicUsize);

impl ArcWake for Counter {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn exhausted(policy: SuspensionPolicy, timer: &ManualTimer) -> (PartitionPool, Block) {
    let config = PoolConfig::new(32).policy(policy);
    let pool = PartitionPool::new(Region::leak(32), config, Arc::new(timer.clone())).unwrap();
    let block = pool.try_allocate().unwrap();
    (pool, block)
}

fn noop_cx() -> Context<'static> {
    Context::from_waker(noop_waker_ref())
}

#[test]
fn fifo_resumes_first_arrival() {
    let timer = ManualTimer::new();
    let (pool, block) = exhausted(SuspensionPolicy::Fifo, &timer);
    let mut cx = noop_cx();
    let mut t1 = pool.allocate(WaitMode::Suspend).with_requester(Requester::new(1, 1));
    let mut t2 = pool.allocate(WaitMode::Suspend).with_requester(Requester::new(2, 30));
    let mut t3 = pool.allocate(WaitMode::Suspend).with_requester(Requester::new(3, 5));
    assert!(t1.poll_unpin(&mut cx).is_pending());
    assert!(t2.poll_unpin(&mut cx).is_pending());
    assert!(t3.poll_unpin(&mut cx).is_pending());
    assert_eq!(pool.status().suspended_count, 3);
    pool.deallocate(block.into()).unwrap();
    assert_eq!(t1.poll_unpin(&mut cx), Poll::Ready(Ok(block)));
    assert!(t2.poll_unpin(&mut cx).is_pending());
    assert!(t3.poll_unpin(&mut cx).is_pending());
    let status = pool.status();
    assert_eq!((status.free_count, status.suspended_count), (0, 2));
}

#[test]
fn priority_resumes_highest() {
    let timer = ManualTimer::new();
    let (pool, block) = exhausted(SuspensionPolicy::Priority, &timer);
    let mut cx = noop_cx();
    let mut low = pool.allocate(WaitMode::Suspend).with_requester(Requester::new(1, 2));
    let mut high = pool.allocate(WaitMode::Suspend).with_requester(Requester::new(2, 20));
    assert!(low.poll_unpin(&mut cx).is_pending());
    assert!(high.poll_unpin(&mut cx).is_pending());
    pool.deallocate(block.into()).unwrap();
    assert_eq!(high.poll_unpin(&mut cx), Poll::Ready(Ok(block)));
    assert!(low.poll_unpin(&mut cx).is_pending());
    pool.deallocate(block.into()).unwrap();
    assert_eq!(low.poll_unpin(&mut cx), Poll::Ready(Ok(block)));
    assert_eq!(pool.status().suspended_count, 0);
}

#[test]
fn handoff_wakes_task() {
    let timer = ManualTimer::new();
    let (pool, block) = exhausted(SuspensionPolicy::Fifo, &timer);
    let counter = Arc::new(Counter(AtomicUsize::new(0)));
    let task_waker = waker(Arc::clone(&counter));
    let mut cx = Context::from_waker(&task_waker);
    let mut request = pool.allocate(WaitMode::Suspend);
    assert!(request.poll_unpin(&mut cx).is_pending());
    assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    pool.deallocate(block.into()).unwrap();
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    assert_eq!(pool.status().free_count, 0);
    assert_eq!(request.poll_unpin(&mut cx), Poll::Ready(Ok(block)));
    assert!(request.is_terminated());
}

#[test]
fn timeout_after_exact_duration() {
    let timer = ManualTimer::new();
    let (pool, _block) = exhausted(SuspensionPolicy::Fifo, &timer);
    let mut cx = noop_cx();
    let mut request = pool.allocate(WaitMode::Timeout(5));
    assert!(request.poll_unpin(&mut cx).is_pending());
    timer.advance(4);
    assert!(request.poll_unpin(&mut cx).is_pending());
    assert_eq!(pool.status().suspended_count, 1);
    timer.advance(1);
    assert_eq!(timer.now(), 5);
    assert_eq!(request.poll_unpin(&mut cx), Poll::Ready(Err(Error::Timeout)));
    assert_eq!(pool.status().suspended_count, 0);
}

#[test]
fn grant_before_expiry_wins() {
    let timer = ManualTimer::new();
    let (pool, block) = exhausted(SuspensionPolicy::Fifo, &timer);
    let mut cx = noop_cx();
    let mut request = pool.allocate(WaitMode::Timeout(3));
    assert!(request.poll_unpin(&mut cx).is_pending());
    pool.deallocate(block.into()).unwrap();
    timer.advance(3);
    assert_eq!(request.poll_unpin(&mut cx), Poll::Ready(Ok(block)));
}

#[test]
fn expired_request_leaves_queue() {
    let timer = ManualTimer::new();
    let (pool, block) = exhausted(SuspensionPolicy::Fifo, &timer);
    let mut cx = noop_cx();
    let mut short = pool.allocate(WaitMode::Timeout(1));
    let mut long = pool.allocate(WaitMode::Suspend);
    assert!(short.poll_unpin(&mut cx).is_pending());
    assert!(long.poll_unpin(&mut cx).is_pending());
    timer.advance(1);
    assert_eq!(short.poll_unpin(&mut cx), Poll::Ready(Err(Error::Timeout)));
    pool.deallocate(block.into()).unwrap();
    assert_eq!(long.poll_unpin(&mut cx), Poll::Ready(Ok(block)));
}

#[test]
fn drop_withdraws_request() {
    let timer = ManualTimer::new();
    let (pool, block) = exhausted(SuspensionPolicy::Fifo, &timer);
    let mut cx = noop_cx();
    let mut request = pool.allocate(WaitMode::Suspend);
    assert!(request.poll_unpin(&mut cx).is_pending());
    drop(request);
    assert_eq!(pool.status().suspended_count, 0);
    pool.deallocate(block.into()).unwrap();
    assert_eq!(pool.status().free_count, 1);
}

#[test]
fn drop_after_grant_passes_block_on() {
    let timer = ManualTimer::new();
    let (pool, block) = exhausted(SuspensionPolicy::Fifo, &timer);
    let mut cx = noop_cx();
    let mut first = pool.allocate(WaitMode::Suspend);
    let mut second = pool.allocate(WaitMode::Suspend);
    assert!(first.poll_unpin(&mut cx).is_pending());
    assert!(second.poll_unpin(&mut cx).is_pending());
    pool.deallocate(block.into()).unwrap();
    drop(first);
    assert_eq!(second.poll_unpin(&mut cx), Poll::Ready(Ok(block)));
    assert_eq!(pool.status().allocated_count, 1);
}

#[test]
fn drop_after_grant_frees_block() {
    let timer = ManualTimer::new();
    let (pool, block) = exhausted(SuspensionPolicy::Fifo, &timer);
    let mut cx = noop_cx();
    let mut request = pool.allocate(WaitMode::Suspend);
    assert!(request.poll_unpin(&mut cx).is_pending());
    pool.deallocate(block.into()).unwrap();
    drop(request);
    assert_eq!(pool.status().free_count, 1);
    assert_eq!(pool.try_allocate(), Ok(block));
}

#[test]
fn full_wait_queue() {
    let timer = ManualTimer::new();
    let config = PoolConfig::new(32).waiters(1);
    let pool = PartitionPool::new(Region::leak(32), config, Arc::new(timer)).unwrap();
    let _block = pool.try_allocate().unwrap();
    let mut cx = noop_cx();
    let mut first = pool.allocate(WaitMode::Suspend);
    let mut second = pool.allocate(WaitMode::Suspend);
    assert!(first.poll_unpin(&mut cx).is_pending());
    assert_eq!(second.poll_unpin(&mut cx), Poll::Ready(Err(Error::ResourceExhausted)));
}

#[test]
fn no_wait_on_exhausted_pool() {
    let timer = ManualTimer::new();
    let (pool, _block) = exhausted(SuspensionPolicy::Priority, &timer);
    let result = futures::executor::block_on(pool.allocate(WaitMode::NoWait));
    assert_eq!(result, Err(Error::ResourceExhausted));
    assert_eq!(pool.status().suspended_count, 0);
}

#[test]
fn free_block_served_without_suspension() {
    let timer = ManualTimer::new();
    let pool = PartitionPool::new(Region::leak(64), PoolConfig::new(32), Arc::new(timer)).unwrap();
    let block = futures::executor::block_on(pool.allocate(WaitMode::Timeout(0))).unwrap();
    assert_eq!(block.len(), 32);
}

#[test]
fn handoff_across_threads() {
    let timer = ManualTimer::new();
    let (pool, block) = exhausted(SuspensionPolicy::Fifo, &timer);
    let pool = Arc::new(pool);
    let waiter = {
        let pool = Arc::clone(&pool);
        std::thread::spawn(move || futures::executor::block_on(pool.allocate(WaitMode::Suspend)))
    };
    while pool.status().suspended_count == 0 {
        std::thread::yield_now();
    }
    pool.deallocate(block.into()).unwrap();
    assert_eq!(waiter.join().unwrap(), Ok(block));
}
