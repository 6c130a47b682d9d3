use crate::BITS_PER_WORD;
use core::fmt;

/// A word with every block marked used.
pub const FULL_WORD: u32 = u32::MAX;

/// Packed used/free flags, one bit per physical block.
///
/// Bit `n` lives in word `n / 32` at position `n % 32`; a set bit means the
/// block is used or unavailable. Capacity is fixed at `WORDS * 32` blocks.
///
/// No bounds are checked beyond the backing array. Keeping accesses inside
/// the allocator's `max_blocks` is the caller's job.
#[derive(Clone, Eq, PartialEq)]
pub struct FrameBitmap<const WORDS: usize> {
    words: [u32; WORDS],
}

impl<const WORDS: usize> Default for FrameBitmap<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> FrameBitmap<WORDS> {
    /// Number of blocks the bitmap can describe.
    pub const CAPACITY: usize = WORDS * BITS_PER_WORD;

    /// A zeroed bitmap. Zero-initialized so that statics land in `.bss`;
    /// the contents carry no meaning until [`fill_used`](Self::fill_used).
    #[must_use]
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Marks every block in the capacity as used.
    pub fn fill_used(&mut self) {
        self.words.fill(FULL_WORD);
    }

    #[inline]
    const fn locate(bit: usize) -> (usize, u32) {
        (bit / BITS_PER_WORD, 1 << (bit % BITS_PER_WORD))
    }

    #[inline]
    pub fn set(&mut self, bit: usize) {
        let (word, mask) = Self::locate(bit);
        self.words[word] |= mask;
    }

    #[inline]
    pub fn clear(&mut self, bit: usize) {
        let (word, mask) = Self::locate(bit);
        self.words[word] &= !mask;
    }

    #[inline]
    #[must_use]
    pub fn test(&self, bit: usize) -> bool {
        let (word, mask) = Self::locate(bit);
        self.words[word] & mask != 0
    }

    /// Sets the bit and reports whether it was clear before.
    #[inline]
    pub fn test_and_set(&mut self, bit: usize) -> bool {
        let (word, mask) = Self::locate(bit);
        let was_clear = self.words[word] & mask == 0;
        self.words[word] |= mask;
        was_clear
    }

    /// Clears the bit and reports whether it was set before.
    #[inline]
    pub fn test_and_clear(&mut self, bit: usize) -> bool {
        let (word, mask) = Self::locate(bit);
        let was_set = self.words[word] & mask != 0;
        self.words[word] &= !mask;
        was_set
    }

    /// Raw word `index`, for word-at-a-time scanning.
    #[inline]
    #[must_use]
    pub fn word(&self, index: usize) -> u32 {
        self.words[index]
    }

    /// Population count of `[0, limit)`.
    #[must_use]
    pub fn count_used(&self, limit: usize) -> usize {
        let limit = limit.min(Self::CAPACITY);
        let full = limit / BITS_PER_WORD;
        let mut count: usize = self.words[..full]
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum();

        let tail = limit % BITS_PER_WORD;
        if tail != 0 {
            let mask = (1u32 << tail) - 1;
            count += (self.words[full] & mask).count_ones() as usize;
        }
        count
    }
}

impl<const WORDS: usize> fmt::Debug for FrameBitmap<WORDS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBitmap")
            .field("capacity", &Self::CAPACITY)
            .field("used", &self.count_used(Self::CAPACITY))
            .finish()
    }
}
