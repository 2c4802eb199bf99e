//! Application address to shadow address mapping.

/// Pure application-address → shadow-address function.
///
/// Implementations must be monotonic and map every granule of the shadow
/// window to a distinct shadow byte.
pub trait AddressMapper: Send + Sync {
    /// log2 of the granularity: one shadow byte covers `1 << scale()` bytes.
    fn scale(&self) -> u32;

    /// Shadow address of the granule containing `addr`.
    fn mem_to_shadow(&self, addr: usize) -> usize;

    /// Bytes of application memory per shadow byte.
    #[inline]
    fn granularity(&self) -> usize {
        1 << self.scale()
    }
}

/// `shadow = (addr >> scale) + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AffineMapper {
    scale: u32,
    offset: usize,
}

impl AffineMapper {
    /// Create a mapper with the given scale and offset.
    pub const fn new(scale: u32, offset: usize) -> Self {
        Self { scale, offset }
    }

    /// The additive shadow offset.
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

impl AddressMapper for AffineMapper {
    #[inline]
    fn scale(&self) -> u32 {
        self.scale
    }

    #[inline]
    fn mem_to_shadow(&self, addr: usize) -> usize {
        (addr >> self.scale) + self.offset
    }
}
