//! # Kernel Boot Information

use crate::memory_map::MemoryMap;

/// Memory information handed over by the boot stub.
/// Keep this `#[repr(C)]` and prefer fixed-size integers at the ABI boundary.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MemoryInfo {
    /// Conventional memory below 1 MiB, in **KiB**.
    pub memory_low: u64,

    /// Memory above 1 MiB, in **KiB**.
    pub memory_high: u64,

    /// Kernel-visible address of the raw memory map buffer
    /// (a sequence of length-prefixed region records). Pass 0 if there is none.
    pub mem_map: u64,

    /// Length of the memory map buffer in **bytes**.
    pub memory_map_len: u64,
}

impl MemoryInfo {
    /// Borrows the memory map described by this record.
    ///
    /// A null `mem_map` or zero `memory_map_len` yields an empty map.
    ///
    /// # Safety
    /// `mem_map` must point to `memory_map_len` readable bytes that stay valid
    /// and unmodified for `'a`.
    #[allow(unsafe_code)]
    #[must_use]
    pub unsafe fn boot_memory<'a>(&self) -> BootMemory<'a> {
        let map = if self.mem_map == 0 || self.memory_map_len == 0 {
            MemoryMap::empty()
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let len = self.memory_map_len as usize;
            // SAFETY: upheld by the caller.
            let bytes = unsafe { core::slice::from_raw_parts(self.mem_map as *const u8, len) };
            MemoryMap::new(bytes)
        };
        BootMemory::new(self.memory_low, self.memory_high, map)
    }
}

/// Safe view of [`MemoryInfo`] the physical allocator is initialized from.
#[derive(Copy, Clone, Debug)]
pub struct BootMemory<'a> {
    /// Conventional memory below 1 MiB, in KiB.
    pub memory_low: u64,
    /// Memory above 1 MiB, in KiB.
    pub memory_high: u64,
    /// Firmware-reported physical regions.
    pub map: MemoryMap<'a>,
}

impl<'a> BootMemory<'a> {
    #[must_use]
    pub const fn new(memory_low: u64, memory_high: u64, map: MemoryMap<'a>) -> Self {
        Self {
            memory_low,
            memory_high,
            map,
        }
    }

    /// Total detected memory in KiB.
    #[must_use]
    pub const fn total_kib(&self) -> u64 {
        self.memory_low.saturating_add(self.memory_high)
    }

    /// Total detected memory in bytes.
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.total_kib().saturating_mul(1024)
    }
}
