//! # Kernel synchronization primitives
//!
//! The kernel serializes access to shared allocator state with a single
//! spin-wait lock. It never sleeps and never queues, which keeps it usable in
//! early boot and from code paths that must not block.
//!
//! ```rust
//! use kernel_sync::SpinLock;
//!
//! let counter = SpinLock::new(0_u64);
//! counter.with_lock(|c| *c += 1);
//! assert_eq!(*counter.lock(), 1);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
