/// Errors surfaced by the physical frame allocator.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FrameAllocError {
    /// No free block is left. This is the allocator's only fatal condition;
    /// the system halts before a caller ever observes it.
    #[error("out of physical memory")]
    OutOfMemory,
    /// No run of contiguous free blocks is long enough for a large block.
    #[error("no run of {blocks} contiguous free blocks")]
    NoContiguousRun { blocks: usize },
    #[error("physical frame allocator is already initialized")]
    AlreadyInitialized,
}

impl FrameAllocError {
    /// Whether the error stops the system.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::OutOfMemory)
    }
}
