//! # Memory Layout

use kernel_memory_addresses::PhysicalAddress;

/// Where the kernel executes (VMA). Linker symbols such as `_end` are
/// relative to this base.
pub const KERNEL_VIRTUAL_BASE: u64 = 0xffff_ffff_8000_0000;

/// Where the loader places the kernel image in *physical* memory (LMA).
pub const PHYS_LOAD: u64 = 0x0010_0000; // 1 MiB

const _: () = {
    assert!(PHYS_LOAD.is_multiple_of(4096));
    assert!(KERNEL_VIRTUAL_BASE > PHYS_LOAD);
};

/// Converts the linker's end-of-image symbol into the first physical address
/// after the loaded kernel image.
///
/// Addresses below [`KERNEL_VIRTUAL_BASE`] are taken to be identity mapped and
/// are returned unchanged.
///
/// ```rust
/// # use kernel_info::memory::{kernel_image_end, KERNEL_VIRTUAL_BASE};
/// assert_eq!(kernel_image_end(KERNEL_VIRTUAL_BASE + 0x20_0000).as_u64(), 0x20_0000);
/// assert_eq!(kernel_image_end(0x30_0000).as_u64(), 0x30_0000);
/// ```
#[must_use]
pub const fn kernel_image_end(linker_end: u64) -> PhysicalAddress {
    if linker_end >= KERNEL_VIRTUAL_BASE {
        PhysicalAddress::new(linker_end - KERNEL_VIRTUAL_BASE)
    } else {
        PhysicalAddress::new(linker_end)
    }
}
