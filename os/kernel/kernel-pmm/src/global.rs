//! The kernel's single allocator instance.
//!
//! The instance lives in `.bss` and is never torn down. It is reachable only
//! through the reference [`init_kernel_frame_allocator`] returns, which boot
//! code passes on to the subsystems that need physical memory.

use crate::{FrameAllocError, HaltLoop, LockedFrameAllocator};
use kernel_info::boot::BootMemory;
use kernel_memory_addresses::PhysicalAddress;

/// Allocator type used by the kernel proper.
pub type KernelFrameAllocator = LockedFrameAllocator<HaltLoop>;

static KERNEL_FRAME_ALLOCATOR: KernelFrameAllocator = LockedFrameAllocator::new(HaltLoop);

/// Initializes the kernel's physical frame allocator and hands out its handle.
///
/// # Errors
/// [`FrameAllocError::AlreadyInitialized`] if called more than once.
pub fn init_kernel_frame_allocator(
    boot: &BootMemory<'_>,
    kernel_image_end: PhysicalAddress,
) -> Result<&'static KernelFrameAllocator, FrameAllocError> {
    KERNEL_FRAME_ALLOCATOR.initialize(boot, kernel_image_end)?;
    Ok(&KERNEL_FRAME_ALLOCATOR)
}
