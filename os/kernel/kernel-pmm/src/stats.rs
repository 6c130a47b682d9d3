use crate::BLOCK_SIZE;
use core::fmt;

/// Snapshot of the allocator's block accounting.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FrameStats {
    pub used_blocks: usize,
    pub max_blocks: usize,
}

impl FrameStats {
    #[must_use]
    pub const fn free_blocks(&self) -> usize {
        self.max_blocks.saturating_sub(self.used_blocks)
    }

    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.max_blocks as u64 * BLOCK_SIZE
    }

    #[must_use]
    pub const fn used_bytes(&self) -> u64 {
        self.used_blocks as u64 * BLOCK_SIZE
    }

    #[must_use]
    pub const fn free_bytes(&self) -> u64 {
        self.free_blocks() as u64 * BLOCK_SIZE
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} blocks used, {} KiB free",
            self.used_blocks,
            self.max_blocks,
            self.free_bytes() / 1024
        )
    }
}
