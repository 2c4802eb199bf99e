//! Shadow arena - the owned byte array standing in for the shadow mapping.
//!
//! Addresses handed to the arena are shadow addresses; the arena subtracts its
//! base and indexes a bounds-checked buffer.

use std::ops::Range;

/// Bounded shadow byte array covering `[base, base + len)` in shadow space.
pub struct ShadowArena {
    /// Shadow address of `bytes[0]`.
    base: usize,
    bytes: Box<[u8]>,
}

impl ShadowArena {
    /// Create a fully addressable (zeroed) arena.
    pub fn new(base: usize, len: usize) -> Self {
        Self {
            base,
            bytes: vec![0u8; len].into_boxed_slice(),
        }
    }

    /// Shadow address of the first byte.
    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    /// One past the last covered shadow address.
    #[inline]
    pub fn end(&self) -> usize {
        self.base + self.bytes.len()
    }

    /// Number of shadow bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the arena holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether `[beg, end)` lies inside the arena.
    #[inline]
    pub fn contains(&self, beg: usize, end: usize) -> bool {
        beg >= self.base && beg <= end && end <= self.end()
    }

    #[inline]
    fn index_range(&self, beg: usize, end: usize) -> Range<usize> {
        debug_assert!(
            self.contains(beg, end),
            "shadow range {:#x}..{:#x} outside arena {:#x}..{:#x}",
            beg,
            end,
            self.base,
            self.end()
        );
        (beg - self.base)..(end - self.base)
    }

    /// Read the shadow byte at `addr`, if covered.
    #[inline]
    pub fn get(&self, addr: usize) -> Option<u8> {
        addr.checked_sub(self.base)
            .and_then(|idx| self.bytes.get(idx))
            .copied()
    }

    /// Shadow bytes for `[beg, end)`.
    pub fn slice(&self, beg: usize, end: usize) -> &[u8] {
        let range = self.index_range(beg, end);
        &self.bytes[range]
    }

    /// Mutable shadow bytes for `[beg, end)`.
    pub fn slice_mut(&mut self, beg: usize, end: usize) -> &mut [u8] {
        let range = self.index_range(beg, end);
        &mut self.bytes[range]
    }
}

impl std::fmt::Debug for ShadowArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowArena")
            .field("base", &format_args!("{:#x}", self.base))
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_zeroed() {
        let arena = ShadowArena::new(0x100, 64);
        assert_eq!(arena.len(), 64);
        assert!(arena.slice(0x100, 0x140).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_get_bounds() {
        let mut arena = ShadowArena::new(0x100, 16);
        arena.slice_mut(0x10f, 0x110)[0] = 0xfa;

        assert_eq!(arena.get(0x10f), Some(0xfa));
        assert_eq!(arena.get(0x110), None);
        assert_eq!(arena.get(0xff), None);
    }

    #[test]
    fn test_contains() {
        let arena = ShadowArena::new(0x100, 16);
        assert!(arena.contains(0x100, 0x110));
        assert!(arena.contains(0x108, 0x108));
        assert!(!arena.contains(0x0ff, 0x108));
        assert!(!arena.contains(0x108, 0x111));
        assert!(!arena.contains(0x10a, 0x108));
    }

    #[test]
    fn test_slice_mut_writes_through() {
        let mut arena = ShadowArena::new(0x100, 16);
        arena.slice_mut(0x104, 0x108).fill(3);

        assert_eq!(arena.get(0x103), Some(0));
        assert_eq!(arena.get(0x104), Some(3));
        assert_eq!(arena.get(0x107), Some(3));
        assert_eq!(arena.get(0x108), Some(0));
    }

    #[test]
    #[should_panic]
    fn test_out_of_bounds_write_panics() {
        let mut arena = ShadowArena::new(0x100, 16);
        arena.slice_mut(0x10f, 0x111).fill(1);
    }
}
