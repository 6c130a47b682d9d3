use crate::{FrameAllocError, FrameAllocator, FrameStats, Halt, PHYS_BITMAP_WORDS};
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_info::boot::BootMemory;
use kernel_memory_addresses::PhysicalAddress;
use kernel_sync::SpinLock;
use log::error;

/// The shareable allocator handle.
///
/// Every bitmap access, including initialization, region marking and the
/// large-block paths, runs under one [`SpinLock`]. Exhaustion on a
/// single-block allocation is handed to the [`Halt`] hook after the lock is
/// released.
pub struct LockedFrameAllocator<H, const WORDS: usize = PHYS_BITMAP_WORDS> {
    inner: SpinLock<FrameAllocator<WORDS>>,
    initialized: AtomicBool,
    halt: H,
}

impl<H: Halt, const WORDS: usize> LockedFrameAllocator<H, WORDS> {
    #[must_use]
    pub const fn new(halt: H) -> Self {
        Self {
            inner: SpinLock::new(FrameAllocator::new()),
            initialized: AtomicBool::new(false),
            halt,
        }
    }

    /// Builds the bitmap from the boot memory map. Runs at most once.
    ///
    /// # Errors
    /// [`FrameAllocError::AlreadyInitialized`] on every call after the first.
    pub fn initialize(
        &self,
        boot: &BootMemory<'_>,
        kernel_image_end: PhysicalAddress,
    ) -> Result<FrameStats, FrameAllocError> {
        self.inner.with_lock(|alloc| {
            if self.initialized.load(Ordering::Acquire) {
                return Err(FrameAllocError::AlreadyInitialized);
            }
            alloc.initialize(boot, kernel_image_end);
            self.initialized.store(true, Ordering::Release);
            Ok(alloc.stats())
        })
    }

    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Claims one 4 KiB block.
    ///
    /// Exhaustion is fatal: the condition is logged and the halt hook runs.
    /// Only a hook that returns lets the caller see the error.
    ///
    /// # Errors
    /// [`FrameAllocError::OutOfMemory`] once the halt hook returned.
    pub fn allocate_block(&self) -> Result<PhysicalAddress, FrameAllocError> {
        let result = self.inner.with_lock(|alloc| {
            alloc
                .try_allocate_block()
                .map_err(|e| (e, alloc.stats()))
        });

        result.map_err(|(e, stats)| {
            error!("Out of memory! {stats}");
            self.halt.halt(&e);
            e
        })
    }

    /// Returns one block.
    ///
    /// # Safety
    /// See [`FrameAllocator::free_block`].
    pub unsafe fn free_block(&self, address: PhysicalAddress) {
        self.inner.with_lock(|alloc| unsafe { alloc.free_block(address) });
    }

    /// Claims a 2 MiB run of contiguous blocks.
    ///
    /// # Errors
    /// [`FrameAllocError::NoContiguousRun`] if no such run is free.
    pub fn allocate_large_block(&self) -> Result<PhysicalAddress, FrameAllocError> {
        self.inner.with_lock(|alloc| alloc.allocate_large_block())
    }

    /// Returns a 2 MiB run.
    ///
    /// # Safety
    /// See [`FrameAllocator::free_large_block`].
    pub unsafe fn free_large_block(&self, address: PhysicalAddress) {
        self.inner
            .with_lock(|alloc| unsafe { alloc.free_large_block(address) });
    }

    /// Reserves a physical range outside the firmware map (MMIO, ACPI tables).
    pub fn mark_region_used(&self, base: PhysicalAddress, size: u64) -> usize {
        self.inner
            .with_lock(|alloc| alloc.mark_region_used(base, size))
    }

    /// Releases a physical range reserved with [`mark_region_used`](Self::mark_region_used).
    pub fn mark_region_free(&self, base: PhysicalAddress, size: u64) -> usize {
        self.inner
            .with_lock(|alloc| alloc.mark_region_free(base, size))
    }

    #[must_use]
    pub fn stats(&self) -> FrameStats {
        self.inner.with_lock(|alloc| alloc.stats())
    }

    #[must_use]
    pub fn is_block_used(&self, address: PhysicalAddress) -> bool {
        self.inner.with_lock(|alloc| alloc.is_block_used(address))
    }

    /// Recounts the bitmap and compares it with the running counter.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.inner.with_lock(|alloc| alloc.is_consistent())
    }

    /// The configured halt hook.
    #[must_use]
    pub const fn halt_hook(&self) -> &H {
        &self.halt
    }
}
