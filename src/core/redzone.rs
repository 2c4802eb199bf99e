//! Redzone tail encoding.
//!
//! Encodes the shadow for `[addr, addr + redzone_size)` where the first `size`
//! bytes stay valid: whole valid granules get `0`, granules past `size` get
//! the full-poison marker, and the single granule straddling `size` records
//! how many of its trailing bytes are poisoned.

use crate::util::align::align_up;

/// Granularity at which the full-poison marker is forced to `0xff`.
pub const COARSE_GRANULARITY: usize = 128;

/// Marker written to fully poisoned granules in coarse mode.
pub const COARSE_POISON: u8 = 0xff;

/// Number of shadow bytes written for a redzone span of `redzone_size` bytes.
#[inline]
pub fn shadow_len(redzone_size: usize, granularity: usize) -> usize {
    align_up(redzone_size, granularity) / granularity
}

/// Full-poison marker for granules wholly inside the redzone.
#[inline]
pub fn full_poison_marker(value: u8, granularity: usize) -> u8 {
    if granularity == COARSE_GRANULARITY {
        COARSE_POISON
    } else {
        value
    }
}

/// Shadow byte for the granule starting `offset` bytes into the span.
#[inline]
pub fn granule_byte(offset: usize, size: usize, value: u8, granularity: usize, poison_partial: bool) -> u8 {
    if offset + granularity <= size {
        0
    } else if offset >= size {
        full_poison_marker(value, granularity)
    } else if poison_partial {
        (granularity - (size & (granularity - 1))) as u8
    } else {
        0
    }
}

/// Encode the span into `shadow`, one byte per granule.
///
/// `shadow` must hold exactly `shadow_len(redzone_size, granularity)` bytes.
pub fn encode(shadow: &mut [u8], size: usize, value: u8, granularity: usize, poison_partial: bool) {
    for (idx, byte) in shadow.iter_mut().enumerate() {
        *byte = granule_byte(idx * granularity, size, value, granularity, poison_partial);
    }
}
