//! # Physical Frame Allocator
//!
//! Tracks which 4 KiB physical blocks are in use with one bit per block and
//! hands them out to the paging code and the kernel heap.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │        LockedFrameAllocator (SpinLock + Halt)       │
//! │    • serializes every bitmap access                 │
//! │    • turns exhaustion into a system halt            │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              FrameAllocator                         │
//! │    • initialization from the boot memory map        │
//! │    • first-fit single and 2 MiB allocation          │
//! │    • used block accounting                          │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              FrameBitmap                            │
//! │    • packed 32-bit words, set bit = used            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Boot sequence
//!
//! [`init_kernel_frame_allocator`] marks everything used, frees the regions
//! the firmware reports usable, then reserves the kernel image again. The
//! returned handle is the only way to reach the allocator afterwards.
//!
//! ## Failure model
//!
//! Running out of single blocks halts the system through the [`Halt`] hook.
//! A missing 2 MiB run is an ordinary [`FrameAllocError::NoContiguousRun`].
//! Freeing something that was not allocated is not detected; the free paths
//! are `unsafe` for that reason.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_info::boot::BootMemory;
//! use kernel_info::memory_map::{MemoryMap, MemoryRegion, RegionKind};
//! use kernel_memory_addresses::PhysicalAddress;
//! use kernel_pmm::{FrameAllocError, Halt, LockedFrameAllocator};
//!
//! struct Report;
//! impl Halt for Report {
//!     fn halt(&self, _reason: &FrameAllocError) {}
//! }
//!
//! let record = MemoryRegion::new(PhysicalAddress::new(0x10_0000), 0x1_0000, RegionKind::Usable)
//!     .to_record();
//! let boot = BootMemory::new(0, 4 * 1024, MemoryMap::new(&record));
//!
//! let pmm = LockedFrameAllocator::<_, 32>::new(Report);
//! let stats = pmm.initialize(&boot, PhysicalAddress::new(0x10_0000)).unwrap();
//! assert_eq!(stats.free_blocks(), 16);
//!
//! let frame = pmm.allocate_block().unwrap();
//! assert_eq!(frame.as_u64(), 0x10_0000);
//! unsafe { pmm.free_block(frame) };
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod bitmap;
mod error;
mod frame_alloc;
mod global;
mod halt;
mod locked;
mod stats;

pub use error::FrameAllocError;
pub use frame_alloc::FrameAllocator;
pub use global::{KernelFrameAllocator, init_kernel_frame_allocator};
pub use halt::{Halt, HaltLoop};
pub use locked::LockedFrameAllocator;
pub use stats::FrameStats;

use kernel_memory_addresses::{PageSize, Size2M, Size4K};

/// Bytes per block.
pub const BLOCK_SIZE: u64 = Size4K::SIZE;

/// Bytes per large block.
pub const LARGE_BLOCK_SIZE: u64 = Size2M::SIZE;

/// Blocks per large block.
#[allow(clippy::cast_possible_truncation)]
pub const BLOCKS_PER_LARGE_BLOCK: usize = (LARGE_BLOCK_SIZE / BLOCK_SIZE) as usize;

/// Blocks per bitmap word.
pub const BITS_PER_WORD: usize = u32::BITS as usize;

/// Default bitmap size in words: 1 Mi blocks, 4 GiB of physical memory.
pub const PHYS_BITMAP_WORDS: usize = 32 * 1024;

const _: () = {
    assert!(BLOCKS_PER_LARGE_BLOCK == 512);
    assert!(LARGE_BLOCK_SIZE.is_multiple_of(BLOCK_SIZE));
    assert!(PHYS_BITMAP_WORDS * BITS_PER_WORD >= BLOCKS_PER_LARGE_BLOCK);
};
