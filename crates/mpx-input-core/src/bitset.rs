//! Fixed-size bitsets for valuator masks and button/key down-state.

/// A bitset backed by `WORDS` 64-bit words.
///
/// Indices at or beyond [`BitSet::CAPACITY`] are ignored by `set`/`clear`
/// and always test false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitSet<const WORDS: usize> {
    words: [u64; WORDS],
}

/// Mask over the valuators of a single event (capacity 64, at least `MAX_VALUATORS`).
pub type ValuatorMask = BitSet<1>;

/// One bit per key code or button number (capacity 256).
pub type CodeBits = BitSet<4>;

impl<const WORDS: usize> BitSet<WORDS> {
    /// Number of addressable bits.
    pub const CAPACITY: usize = WORDS * 64;

    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    pub fn set(&mut self, index: usize) {
        if index < Self::CAPACITY {
            self.words[index / 64] |= 1u64 << (index % 64);
        }
    }

    pub fn clear(&mut self, index: usize) {
        if index < Self::CAPACITY {
            self.words[index / 64] &= !(1u64 << (index % 64));
        }
    }

    pub fn test(&self, index: usize) -> bool {
        index < Self::CAPACITY && self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Set every bit in `start..end`.
    pub fn set_range(&mut self, start: usize, end: usize) {
        for i in start..end {
            self.set(i);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over the indices of all set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Self::CAPACITY).filter(move |i| self.test(*i))
    }

    pub fn reset(&mut self) {
        self.words = [0; WORDS];
    }
}

impl<const WORDS: usize> Default for BitSet<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> FromIterator<usize> for BitSet<WORDS> {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut bits = Self::new();
        for i in iter {
            bits.set(i);
        }
        bits
    }
}
