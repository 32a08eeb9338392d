//! Deterministic memory allocation for Drone, a Hard Real-Time Operating System
//! Framework for writing embedded applications with [Rust].
//!
//! General-purpose allocators search, split, and coalesce free space, so their
//! worst-case time is unbounded and they suffer from external fragmentation.
//! This crate allocates from partition pools instead: a pool is a memory
//! region split into equal-size blocks, and every allocation and deallocation
//! takes constant time.
//!
//! * [`pool`] - fixed-block-size pools with optional suspension of requests on
//!   exhaustion.
//! * [`wait`] - FIFO and priority wait queues of suspended requests.
//! * [`heap`] - variable-size allocation over a set of size classes.
//! * [`registry`] - explicit owner of independently configured pools.
//! * [`leak`] - optional record of outstanding allocations.
//! * [`timer`] - the time source of suspend-with-timeout requests.
//!
//! Suspension is expressed with futures: a request that has to wait returns
//! [`Poll::Pending`](core::task::Poll::Pending) and its task is woken when a
//! freed block has been handed over.
//!
//! # Cargo features
//!
//! * `std` (default) - hosted targets.
//! * `config` (default) - reading the heap layout from TOML.
//! * `leak-tracker` (default) - allocation call site tracking.
//!
//! [Rust]: https://www.rust-lang.org/

#![warn(missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod block;
#[cfg(feature = "config")]
pub mod config;
pub mod error;
pub mod heap;
pub mod leak;
pub mod pool;
pub mod registry;
pub mod sync;
pub mod timer;
pub mod wait;

pub use self::block::{Block, Region};
pub use self::error::{ConfigError, Error};
