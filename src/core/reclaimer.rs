//! Page release contract.
//!
//! Releasing shadow pages gives physical memory back without changing what the
//! shadow means: a released page reads back as zero, i.e. addressable. Only
//! ranges that are already addressable may be released.

use crate::util::align::{align_down, align_up};

/// A contiguous window of shadow bytes together with its shadow address.
pub struct ShadowRegion<'a> {
    /// Shadow address of `bytes[0]`.
    pub addr: usize,
    /// The shadow bytes.
    pub bytes: &'a mut [u8],
}

impl<'a> ShadowRegion<'a> {
    /// Wrap `bytes` starting at shadow address `addr`.
    pub fn new(addr: usize, bytes: &'a mut [u8]) -> Self {
        Self { addr, bytes }
    }

    /// One past the last shadow address.
    #[inline]
    pub fn end(&self) -> usize {
        self.addr + self.bytes.len()
    }

    /// Page-aligned interior `[page_beg, page_end)`, or `None` if no whole page fits.
    pub fn page_interior(&self, page_size: usize) -> Option<(usize, usize)> {
        let page_beg = align_up(self.addr, page_size);
        let page_end = align_down(self.end(), page_size);
        (page_beg < page_end).then_some((page_beg, page_end))
    }

    /// Reborrow the sub-window `[beg, end)` given in shadow addresses.
    pub fn sub(&mut self, beg: usize, end: usize) -> ShadowRegion<'_> {
        let lo = beg - self.addr;
        let hi = end - self.addr;
        ShadowRegion::new(beg, &mut self.bytes[lo..hi])
    }
}

/// OS page-release primitive for shadow memory.
pub trait PageReleaser: Send + Sync {
    /// Page size the releaser works in.
    fn page_size(&self) -> usize;

    /// Release the whole pages inside `region`.
    ///
    /// Partial pages at either end are left alone. Returns the number of
    /// shadow bytes released.
    fn release(&self, region: ShadowRegion<'_>) -> usize;
}

/// Releaser for an owned arena: released pages are zeroed in place, matching
/// what the kernel hands back on the next touch after `MADV_DONTNEED`.
#[derive(Debug, Clone, Copy)]
pub struct ZeroingReleaser {
    page_size: usize,
}

impl ZeroingReleaser {
    /// Create a releaser working in pages of `page_size` bytes.
    pub fn new(page_size: usize) -> Self {
        debug_assert!(page_size.is_power_of_two());
        Self { page_size }
    }
}

impl PageReleaser for ZeroingReleaser {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn release(&self, mut region: ShadowRegion<'_>) -> usize {
        match region.page_interior(self.page_size) {
            Some((page_beg, page_end)) => {
                region.sub(page_beg, page_end).bytes.fill(0);
                page_end - page_beg
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_interior() {
        let mut bytes = vec![0u8; 0x3000];
        let region = ShadowRegion::new(0x10800, &mut bytes);
        assert_eq!(region.page_interior(0x1000), Some((0x11000, 0x13000)));

        let mut small = vec![0u8; 0x800];
        let region = ShadowRegion::new(0x10400, &mut small);
        assert_eq!(region.page_interior(0x1000), None);
    }

    #[test]
    fn test_release_zeroes_whole_pages_only() {
        let mut bytes = vec![64u8; 0x3000];
        let released = ZeroingReleaser::new(0x1000).release(ShadowRegion::new(0x10800, &mut bytes));

        assert_eq!(released, 0x2000);
        // Head partial page [0x10800, 0x11000) keeps its markers.
        assert!(bytes[..0x800].iter().all(|&b| b == 64));
        assert!(bytes[0x800..0x2800].iter().all(|&b| b == 0));
        // Tail partial page [0x13000, 0x13800) keeps its markers.
        assert!(bytes[0x2800..].iter().all(|&b| b == 64));
    }

    #[test]
    fn test_release_below_one_page() {
        let mut bytes = vec![62u8; 100];
        let released = ZeroingReleaser::new(4096).release(ShadowRegion::new(0x10010, &mut bytes));
        assert_eq!(released, 0);
        assert!(bytes.iter().all(|&b| b == 62));
    }
}
