#![cfg(loom)]

#[macro_use]
mod loom_helpers;

use drone_mempool::pool::{PartitionPool, PoolConfig};
use drone_mempool::timer::ManualTimer;
use drone_mempool::{Block, Error, Region};
use std::sync::Arc;

const SIZE: isize = 16;

fn make_pool(count: usize, freed: usize) -> (isize, &'static PartitionPool) {
    let region = Region::leak(SIZE as usize * count);
    let addr = region.start().as_ptr() as isize;
    let pool = PartitionPool::new(region, PoolConfig::new(SIZE as usize), Arc::new(ManualTimer::new())).unwrap();
    let pool: &'static _ = Box::leak(Box::new(pool));
    let allocated = (0..freed).map(|_| pool.try_allocate().unwrap()).collect::<Vec<_>>();
    allocated.into_iter().for_each(|block| pool.deallocate(block.into()).unwrap());
    (addr, pool)
}

fn address(result: Result<Block, Error>) -> isize {
    result.map_or(-1, |block| block.as_ptr() as isize)
}

macro_rules! join_allocate {
    ($($x:ident),+$(,)?) => {{
        $(
            let $x = address($x.join().unwrap());
        )*
        ($($x,)*)
    }};
}

#[test]
fn loom_allocate_allocate() {
    for (count, freed) in [(1, 0), (1, 1)] {
        let states = statemap![0 => [1, 2]];
        loom::model(move || {
            let (addr, pool) = make_pool(count, freed);
            let x = loom::thread::spawn(move || pool.try_allocate());
            let y = loom::thread::spawn(move || pool.try_allocate());
            let (x, y) = join_allocate!(x, y);
            assert_eq!(pool.try_allocate(), Err(Error::ResourceExhausted));
            states.put(0, match (x, y) {
                (x, -1) if x == addr => 1,
                (-1, y) if y == addr => 2,
                _ => 3,
            });
        });
        states.check_exhaustive();
    }
    for (count, freed) in [(2, 0), (2, 1), (2, 2)] {
        let states = statemap![0 => [1, 2]];
        loom::model(move || {
            let (addr, pool) = make_pool(count, freed);
            let x = loom::thread::spawn(move || pool.try_allocate());
            let y = loom::thread::spawn(move || pool.try_allocate());
            let (x, y) = join_allocate!(x, y);
            assert_eq!(pool.status().free_count, 0);
            states.put(0, match (x, y) {
                (x, y) if x == addr && y == addr + SIZE => 1,
                (x, y) if x == addr + SIZE && y == addr => 2,
                _ => 3,
            });
        });
        states.check_exhaustive();
    }
}

#[test]
fn loom_allocate_deallocate() {
    let states = statemap![0 => [1, 2]];
    loom::model(|| {
        let (addr, pool) = make_pool(1, 0);
        let a = pool.try_allocate().unwrap();
        let x = loom::thread::spawn(move || pool.deallocate(a.into()));
        let y = loom::thread::spawn(move || pool.try_allocate());
        x.join().unwrap().unwrap();
        let (y,) = join_allocate!(y,);
        states.put(0, match y {
            y if y == addr => {
                assert_eq!(pool.try_allocate(), Err(Error::ResourceExhausted));
                1
            }
            -1 => {
                assert_eq!(address(pool.try_allocate()), addr);
                2
            }
            _ => 3,
        });
    });
    states.check_exhaustive();
    let states = statemap![0 => [1, 2]];
    loom::model(|| {
        let (addr, pool) = make_pool(2, 1);
        let a = pool.try_allocate().unwrap();
        let x = loom::thread::spawn(move || pool.deallocate(a.into()));
        let y = loom::thread::spawn(move || pool.try_allocate());
        x.join().unwrap().unwrap();
        let (y,) = join_allocate!(y,);
        states.put(0, match y {
            y if y == addr => {
                assert_eq!(address(pool.try_allocate()), addr + SIZE);
                1
            }
            y if y == addr + SIZE => {
                assert_eq!(address(pool.try_allocate()), addr);
                2
            }
            _ => 3,
        });
        assert_eq!(pool.try_allocate(), Err(Error::ResourceExhausted));
    });
    states.check_exhaustive();
}

#[test]
fn loom_deallocate_deallocate() {
    let states = statemap![0 => [1, 2]];
    loom::model(|| {
        let (addr, pool) = make_pool(2, 0);
        let x = pool.try_allocate().unwrap();
        let y = pool.try_allocate().unwrap();
        let x = loom::thread::spawn(move || pool.deallocate(x.into()));
        let y = loom::thread::spawn(move || pool.deallocate(y.into()));
        x.join().unwrap().unwrap();
        y.join().unwrap().unwrap();
        let x = address(pool.try_allocate());
        let y = address(pool.try_allocate());
        assert_eq!(pool.try_allocate(), Err(Error::ResourceExhausted));
        states.put(0, match (x, y) {
            (x, y) if x == addr && y == addr + SIZE => 1,
            (x, y) if x == addr + SIZE && y == addr => 2,
            _ => 3,
        });
    });
    states.check_exhaustive();
}

#[test]
fn loom_double_free() {
    loom::model(|| {
        let (_addr, pool) = make_pool(1, 0);
        let a = pool.try_allocate().unwrap();
        let x = loom::thread::spawn(move || pool.deallocate(a.into()));
        let y = loom::thread::spawn(move || pool.deallocate(a.into()));
        let mut results = [x.join().unwrap(), y.join().unwrap()];
        results.sort_by_key(Result::is_err);
        assert_eq!(results, [Ok(()), Err(Error::InvalidPointer)]);
        assert_eq!(pool.status().allocated_count, 0);
    });
}
