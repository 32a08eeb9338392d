//! Synchronization primitives used by the pools.

mod mutex;

pub use self::mutex::{Mutex, MutexGuard};
