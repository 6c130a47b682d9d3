//! # Kernel Boot Interface
//!
//! Data handed from the boot stub to the kernel, and the physical layout
//! constants both sides agree on.
//!
//! ## Modules
//!
//! * [`boot`]: the `#[repr(C)]` [`MemoryInfo`](boot::MemoryInfo) record
//!   (detected memory in KiB plus a pointer/length pair for the raw memory
//!   map) and its safe [`BootMemory`](boot::BootMemory) view.
//! * [`memory_map`]: lazy decoding of the firmware memory map, a byte stream
//!   of length-prefixed region records.
//! * [`memory`]: where the kernel is linked and loaded.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_info::boot::BootMemory;
//! use kernel_info::memory_map::{MemoryMap, MemoryRegion, RegionKind};
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! let record = MemoryRegion::new(PhysicalAddress::new(0x10_0000), 0x1_0000, RegionKind::Usable)
//!     .to_record();
//! let boot = BootMemory::new(640, 15 * 1024, MemoryMap::new(&record));
//!
//! let usable: u64 = boot.map.regions().filter(MemoryRegion::is_usable).map(|r| r.length).sum();
//! assert_eq!(usable, 0x1_0000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
pub mod memory_map;
