//! # Physical Memory Address Types
//!
//! Strongly typed physical addresses and page-size markers shared by the
//! physical frame allocator and its callers.
//!
//! ## Overview
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PhysicalAddress`] | A raw 64-bit physical address (RAM or MMIO). |
//! | [`PageSize`] | Marker trait carrying [`SIZE`](PageSize::SIZE) and [`SHIFT`](PageSize::SHIFT). |
//! | [`Size4K`] | 4 KiB, the granularity of one allocator block. |
//! | [`Size2M`] | 2 MiB, the granularity of a large block. |
//!
//! Block indices are plain `usize` values; the conversion between an index
//! and its base address is always spelled out with a page size:
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0020_0000);
//! assert_eq!(pa.block_index::<Size4K>(), 512);
//! assert_eq!(pa.block_index::<Size2M>(), 1);
//! assert!(pa.is_aligned::<Size2M>());
//! assert_eq!(Size2M::blocks(), 512);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod page_size;
mod physical_address;

pub use page_size::{PageSize, Size2M, Size4K};
pub use physical_address::PhysicalAddress;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_index_truncates_offset() {
        let a = PhysicalAddress::new(0x0010_0FFF);
        assert_eq!(a.block_index::<Size4K>(), 0x100);
        assert_eq!(a.align_down::<Size4K>().as_u64(), 0x0010_0000);
    }

    #[test]
    fn align_up_keeps_aligned_addresses() {
        let a = PhysicalAddress::new(0x0010_0000);
        assert_eq!(a.align_up::<Size4K>(), a);
        assert_eq!(
            PhysicalAddress::new(0x0010_0001).align_up::<Size4K>().as_u64(),
            0x0010_1000
        );
    }

    #[test]
    fn align_up_saturates() {
        let a = PhysicalAddress::new(u64::MAX - 10);
        assert_eq!(a.align_up::<Size4K>().as_u64(), u64::MAX & !0xFFF);
    }

    #[test]
    fn large_block_covers_512_blocks() {
        assert_eq!(Size2M::blocks(), 512);
        assert_eq!(Size4K::blocks(), 1);
        let base = PhysicalAddress::from_block_index::<Size2M>(3);
        assert_eq!(base.block_index::<Size4K>(), 3 * 512);
    }

    #[test]
    fn display_is_fixed_width_hex() {
        let a = PhysicalAddress::new(0x1000);
        assert_eq!(format!("{a}"), "0x0000000000001000");
        assert_eq!(format!("{a:?}"), "PA(0x0000000000001000)");
        assert_eq!(format!("{a:#x}"), "0x1000");
    }
}
