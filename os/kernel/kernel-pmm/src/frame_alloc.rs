//! # Bitmap Frame Allocator
//!
//! Unsynchronized allocation engine. One bit per 4 KiB block, set = used.
//! Wrap it in [`LockedFrameAllocator`](crate::LockedFrameAllocator) before
//! sharing it between execution contexts.
//!
//! ## Accounting
//! `used_blocks` always equals the number of set bits in `[0, max_blocks)`.
//! Region operations only count bits whose state actually changes, so
//! overlapping or repeated regions never skew the counter.
//!
//! ## Rounding
//! - [`mark_region_used`](FrameAllocator::mark_region_used) covers
//!   `floor(size / BLOCK_SIZE)` blocks; a partial trailing block stays as it is.
//! - [`mark_region_free`](FrameAllocator::mark_region_free) covers
//!   `ceil(size / BLOCK_SIZE)` blocks.
//!
//! Both start at the block containing `base` and are clipped to `max_blocks`.
//!
//! ## Block zero
//! Block 0 is never handed out, even if a region marks it free.

use crate::bitmap::{FULL_WORD, FrameBitmap};
use crate::{
    BITS_PER_WORD, BLOCK_SIZE, BLOCKS_PER_LARGE_BLOCK, FrameAllocError, FrameStats,
    PHYS_BITMAP_WORDS,
};
use core::ops::Range;
use kernel_info::boot::BootMemory;
use kernel_memory_addresses::{PhysicalAddress, Size4K};
use log::{debug, info, warn};

/// Physical block allocator over a bitmap of `WORDS` 32-bit words.
#[derive(Clone, Debug)]
pub struct FrameAllocator<const WORDS: usize = PHYS_BITMAP_WORDS> {
    bitmap: FrameBitmap<WORDS>,
    max_blocks: usize,
    used_blocks: usize,
}

impl<const WORDS: usize> Default for FrameAllocator<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> FrameAllocator<WORDS> {
    /// An allocator tracking no memory. Every allocation fails until
    /// [`initialize`](Self::initialize) ran.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bitmap: FrameBitmap::new(),
            max_blocks: 0,
            used_blocks: 0,
        }
    }

    /// Builds the bitmap from the boot memory description.
    ///
    /// 1. Everything is marked used and `max_blocks` is derived from the
    ///    detected memory size (clamped to the bitmap capacity).
    /// 2. Every usable region is freed, in map order, until the map ends.
    /// 3. `[0, kernel_image_end)` is reserved again, rounded up to a whole
    ///    block, so that neither the kernel image nor the static bitmap can
    ///    be handed out even if the firmware reported them usable.
    ///
    /// Any previous state is discarded.
    pub fn initialize(&mut self, boot: &BootMemory<'_>, kernel_image_end: PhysicalAddress) {
        self.bitmap.fill_used();

        let reported = boot.total_bytes() / BLOCK_SIZE;
        let capacity = FrameBitmap::<WORDS>::CAPACITY;
        let max_blocks = usize::try_from(reported).map_or(capacity, |b| b.min(capacity));
        if (max_blocks as u64) < reported {
            warn!(
                "Detected {reported} blocks but the bitmap only tracks {capacity}; ignoring the rest"
            );
        }

        self.max_blocks = max_blocks;
        self.used_blocks = max_blocks;

        info!(
            "Physical memory: {} KiB low + {} KiB high, {max_blocks} blocks of {BLOCK_SIZE} bytes",
            boot.memory_low, boot.memory_high
        );

        let mut regions = boot.map.regions();
        for region in regions.by_ref() {
            info!("Memory Region: {region}");
            if region.is_usable() {
                self.mark_region_free(region.base, region.length);
            }
        }

        if let Some(e) = regions.error() {
            warn!("Memory map walk stopped early: {e}");
        } else if regions.terminated() {
            debug!("Memory map terminated at offset {}", regions.offset());
        }

        let kernel_end = kernel_image_end.align_up::<Size4K>();
        let reserved = self.mark_region_used(PhysicalAddress::zero(), kernel_end.as_u64());
        debug!("Reserved kernel image [0x0 - {kernel_end:#x}], {reserved} blocks taken back");

        info!("Physical frame allocator ready: {}", self.stats());
    }

    #[inline]
    #[must_use]
    pub const fn max_blocks(&self) -> usize {
        self.max_blocks
    }

    #[inline]
    #[must_use]
    pub const fn used_blocks(&self) -> usize {
        self.used_blocks
    }

    #[inline]
    #[must_use]
    pub const fn stats(&self) -> FrameStats {
        FrameStats {
            used_blocks: self.used_blocks,
            max_blocks: self.max_blocks,
        }
    }

    #[inline]
    #[must_use]
    pub const fn bitmap(&self) -> &FrameBitmap<WORDS> {
        &self.bitmap
    }

    /// Whether the counter matches the bitmap contents.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.used_blocks == self.bitmap.count_used(self.max_blocks)
    }

    /// Whether the block containing `address` is used. Untracked memory
    /// counts as used.
    #[must_use]
    pub fn is_block_used(&self, address: PhysicalAddress) -> bool {
        let index = address.block_index::<Size4K>();
        index >= self.max_blocks || self.bitmap.test(index)
    }

    /// Lowest free block index, skipping block 0.
    ///
    /// Full words are skipped whole; within a word the least significant
    /// clear bit wins. `None` stands for the reserved sentinel block 0.
    #[must_use]
    pub fn find_first_free(&self) -> Option<usize> {
        let words = self.max_blocks.div_ceil(BITS_PER_WORD);
        for i in 0..words {
            let word = self.bitmap.word(i);
            if word == FULL_WORD {
                continue;
            }

            let mut free = !word;
            if i == 0 {
                free &= !1;
            }
            if free == 0 {
                continue;
            }

            let index = i * BITS_PER_WORD + free.trailing_zeros() as usize;
            return (index < self.max_blocks).then_some(index);
        }
        None
    }

    /// Start of the lowest run of `len` free blocks, skipping block 0.
    ///
    /// The run is only required to be contiguous; it carries no alignment
    /// beyond the block size.
    #[must_use]
    pub fn find_free_run(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }

        let mut start = 1;
        let mut index = 1;
        while index < self.max_blocks {
            if index == start
                && index.is_multiple_of(BITS_PER_WORD)
                && self.bitmap.word(index / BITS_PER_WORD) == FULL_WORD
            {
                index += BITS_PER_WORD;
                start = index;
                continue;
            }

            if self.bitmap.test(index) {
                start = index + 1;
            } else if index + 1 - start == len {
                return Some(start);
            }
            index += 1;
        }
        None
    }

    /// Claims the lowest free block.
    ///
    /// # Errors
    /// [`FrameAllocError::OutOfMemory`] if no block is free.
    pub fn try_allocate_block(&mut self) -> Result<PhysicalAddress, FrameAllocError> {
        let index = self
            .find_first_free()
            .ok_or(FrameAllocError::OutOfMemory)?;
        self.bitmap.set(index);
        self.used_blocks += 1;
        Ok(PhysicalAddress::from_block_index::<Size4K>(index))
    }

    /// Returns the block containing `address`.
    ///
    /// # Safety
    /// `address` must come from [`try_allocate_block`](Self::try_allocate_block)
    /// and must not have been freed since. Nothing is validated in release
    /// builds; a double free corrupts the accounting and lets two owners
    /// share one frame.
    pub unsafe fn free_block(&mut self, address: PhysicalAddress) {
        let index = address.block_index::<Size4K>();
        debug_assert!(index < self.max_blocks, "free of untracked block {address}");
        debug_assert!(self.bitmap.test(index), "double free of block {address}");
        self.bitmap.clear(index);
        self.used_blocks -= 1;
    }

    /// Claims [`BLOCKS_PER_LARGE_BLOCK`] contiguous free blocks (2 MiB).
    ///
    /// # Errors
    /// [`FrameAllocError::NoContiguousRun`] if no long enough run is free.
    pub fn allocate_large_block(&mut self) -> Result<PhysicalAddress, FrameAllocError> {
        let start = self
            .find_free_run(BLOCKS_PER_LARGE_BLOCK)
            .ok_or(FrameAllocError::NoContiguousRun {
                blocks: BLOCKS_PER_LARGE_BLOCK,
            })?;

        for index in start..start + BLOCKS_PER_LARGE_BLOCK {
            self.bitmap.set(index);
        }
        self.used_blocks += BLOCKS_PER_LARGE_BLOCK;

        let address = PhysicalAddress::from_block_index::<Size4K>(start);
        debug!("Allocated large block at {address:#x}");
        Ok(address)
    }

    /// Returns a large block starting at `address`.
    ///
    /// # Safety
    /// `address` must come from [`allocate_large_block`](Self::allocate_large_block)
    /// and must not have been freed since.
    pub unsafe fn free_large_block(&mut self, address: PhysicalAddress) {
        let start = address.block_index::<Size4K>();
        debug_assert!(
            start + BLOCKS_PER_LARGE_BLOCK <= self.max_blocks,
            "free of untracked large block {address}"
        );

        for index in start..start + BLOCKS_PER_LARGE_BLOCK {
            self.bitmap.clear(index);
        }
        self.used_blocks -= BLOCKS_PER_LARGE_BLOCK;
        debug!("Freed large block at {address:#x}");
    }

    /// Marks the whole blocks of `[base, base + size)` used.
    ///
    /// Returns the number of blocks that changed from free to used.
    pub fn mark_region_used(&mut self, base: PhysicalAddress, size: u64) -> usize {
        let blocks = self.clip(base, size / BLOCK_SIZE);
        let mut changed = 0;
        for index in blocks {
            if self.bitmap.test_and_set(index) {
                changed += 1;
            }
        }
        self.used_blocks += changed;
        changed
    }

    /// Marks every block touched by `[base, base + size)` free, counting a
    /// partial trailing block as a whole one.
    ///
    /// Returns the number of blocks that changed from used to free.
    pub fn mark_region_free(&mut self, base: PhysicalAddress, size: u64) -> usize {
        let blocks = self.clip(base, size.div_ceil(BLOCK_SIZE));
        let mut changed = 0;
        for index in blocks {
            if self.bitmap.test_and_clear(index) {
                changed += 1;
            }
        }
        self.used_blocks -= changed;
        changed
    }

    /// Block range of `count` blocks from the one containing `base`,
    /// clipped to `[0, max_blocks)`.
    fn clip(&self, base: PhysicalAddress, count: u64) -> Range<usize> {
        let first = base.block_index::<Size4K>();
        let end = usize::try_from(count).map_or(usize::MAX, |c| first.saturating_add(c));

        let clipped = first.min(self.max_blocks)..end.min(self.max_blocks);
        if clipped.len() < end.saturating_sub(first) {
            warn!(
                "Region at {base:#x} ({count} blocks) extends past tracked memory; clipped to {} blocks",
                clipped.len()
            );
        }
        clipped
    }
}
