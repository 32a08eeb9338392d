use drone_mempool::pool::PoolConfig;
use drone_mempool::registry::PoolRegistry;
use drone_mempool::timer::ManualTimer;
use drone_mempool::wait::{SuspensionPolicy, WaitMode};
use drone_mempool::{Error, Region};
use std::ptr::NonNull;
use std::sync::Arc;

#[test]
fn independent_pools() {
    let mut registry = PoolRegistry::new(Arc::new(ManualTimer::new()));
    let a = registry.create_pool(Region::leak(2000), PoolConfig::new(40)).unwrap();
    let b = registry.create_pool(Region::leak(64), PoolConfig::new(32).policy(SuspensionPolicy::Priority)).unwrap();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.pool(a).capacity(), 50);
    assert_eq!(registry.pool(b).policy(), SuspensionPolicy::Priority);
    let x = registry.try_allocate_partition(b).unwrap();
    let y = registry.try_allocate_partition(b).unwrap();
    assert_eq!(registry.try_allocate_partition(b), Err(Error::ResourceExhausted));
    assert_eq!(registry.pool_status(a).free_count, 50);
    registry.deallocate_partition(x.into()).unwrap();
    registry.deallocate_partition(y.into()).unwrap();
    assert_eq!(registry.pool_status(b).allocated_count, 0);
}

#[test]
fn unknown_pointer() {
    let mut registry = PoolRegistry::new(Arc::new(ManualTimer::new()));
    registry.create_pool(Region::leak(64), PoolConfig::new(16)).unwrap();
    let outside = Box::leak(Box::new([0_u64; 2]));
    let ptr = NonNull::new(outside.as_mut_ptr().cast::<u8>()).unwrap();
    assert_eq!(registry.deallocate_partition(ptr), Err(Error::InvalidPointer));
}

#[test]
fn allocate_partition_future() {
    let mut registry = PoolRegistry::new(Arc::new(ManualTimer::new()));
    let handle = registry.create_pool(Region::leak(64), PoolConfig::new(16)).unwrap();
    let block = futures::executor::block_on(registry.allocate_partition(handle, WaitMode::Suspend)).unwrap();
    assert!(registry.pool(handle).contains(block.into()));
    let handles = registry.pools().map(|(handle, _)| handle).collect::<Vec<_>>();
    assert_eq!(handles, [handle]);
}

#[cfg(feature = "leak-tracker")]
#[test]
fn leak_report() {
    let mut registry = PoolRegistry::new(Arc::new(ManualTimer::new()));
    let tracked = registry.create_pool(Region::leak(64), PoolConfig::new(16).track_leaks(true)).unwrap();
    let untracked = registry.create_pool(Region::leak(64), PoolConfig::new(16)).unwrap();
    registry.try_allocate_partition(tracked).unwrap();
    registry.try_allocate_partition(untracked).unwrap();
    let mut report = String::new();
    registry.leak_report(&mut report).unwrap();
    assert_eq!(report.lines().count(), 2);
    assert!(report.contains("partition 16: 1 outstanding of 1 allocations"));
    assert!(report.contains("tests/registry.rs"));
}
