//! Shadow byte encoding for 8-byte granules.
//!
//! Bulk unpoison does not write literal zero. It writes a self-similar run of
//! markers: the byte `d` positions before the end of the run (`d >= 1`) holds
//! `64 - floor(log2(d))`. Moving backward from the end the values step down
//! by one across blocks of 1, 2, 4, 8, ... bytes, so a run of `N` bytes is
//! written with O(log N) fills. Every marker reads as addressable.
//!
//! Bulk poison remaps the small partial values `1..=7` to `72 - v` so they
//! land in `65..=71`, above the marker band.

/// Marker written to the last byte of every unpoisoned run.
pub const MARKER_TOP: u8 = 64;

/// Lowest marker for runs shorter than 512 bytes.
pub const MARKER_BAND_FLOOR: u8 = 56;

/// Lowest byte value the reader treats as a marker.
///
/// Reaching it takes a run of `2^56` shadow bytes.
pub const MARKER_FLOOR: u8 = 8;

/// Base of the fast-poison remap: `v in 1..=7` is written as `72 - v`.
pub const POISON_REMAP_BASE: u8 = 72;

/// First block exponent handled by the backward sweep.
const SWEEP_START: u32 = 3;

/// Tail patterns keyed by run length, closest-to-end byte last.
const TAIL_PATTERNS: [&[u8]; 8] = [
    &[],
    &[64],
    &[63, 64],
    &[63, 63, 64],
    &[62, 63, 63, 64],
    &[62, 62, 63, 63, 64],
    &[62, 62, 62, 63, 63, 64],
    &[62, 62, 62, 62, 63, 63, 64],
];

/// Value written by the bulk poison path for a requested poison `value`.
#[inline]
pub const fn fast_poison_value(value: u8) -> u8 {
    if value != 0 && value <= 7 {
        POISON_REMAP_BASE - value
    } else {
        value
    }
}

/// Marker expected `distance` bytes before the end of an unpoisoned run.
///
/// `distance` starts at 1 for the last byte of the run.
#[inline]
pub fn marker_at_distance(distance: usize) -> u8 {
    debug_assert!(distance >= 1);
    MARKER_TOP - distance.ilog2() as u8
}

/// Fill `shadow` with the unpoison marker run.
///
/// Returns the number of contiguous fills performed.
pub fn fill_unpoison_markers(shadow: &mut [u8]) -> u32 {
    let n = shadow.len();
    if n == 0 {
        return 0;
    }

    let tail = TAIL_PATTERNS[n.min(7)];
    shadow[n - tail.len()..].copy_from_slice(tail);
    let mut fills = 1;

    if n >= 8 {
        // Offsets below are relative to the end: block `i` covers distances
        // `[2^i, 2^(i+1) - 1]` and holds `64 - i`.
        let mut i = SWEEP_START;
        loop {
            let marker = MARKER_TOP - i as u8;
            let block_end = n + 1 - (1usize << i);
            match (n + 1).checked_sub(1usize << (i + 1)) {
                Some(block_beg) if block_beg > 0 => {
                    shadow[block_beg..block_end].fill(marker);
                    fills += 1;
                    i += 1;
                }
                _ => {
                    shadow[..block_end].fill(marker);
                    fills += 1;
                    break;
                }
            }
        }
    }

    fills
}

/// Decoded state of one shadow byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowState {
    /// Every byte of the granule may be accessed.
    Addressable,
    /// Only the first `addressable` bytes of the granule may be accessed.
    Partial {
        /// Length of the accessible prefix.
        addressable: u8,
    },
    /// No byte of the granule may be accessed; carries the raw shadow byte.
    Poisoned(u8),
}

impl ShadowState {
    /// Whether the whole granule is accessible.
    #[inline]
    pub fn is_addressable(self) -> bool {
        matches!(self, ShadowState::Addressable)
    }

    /// Whether the byte at `offset` within the granule is accessible.
    #[inline]
    pub fn allows(self, offset: usize) -> bool {
        match self {
            ShadowState::Addressable => true,
            ShadowState::Partial { addressable } => offset < addressable as usize,
            ShadowState::Poisoned(_) => false,
        }
    }
}

/// Decode a shadow byte written by the marker fill strategy.
///
/// Partial bytes `1..G` count the poisoned tail, as written by the redzone
/// encoder. For 8-byte granules the marker band `8..=64` is addressable and
/// everything above it is poisoned. Flat-filled shadow is decoded by
/// [`FillStrategy::classify`](super::filler::FillStrategy::classify).
#[inline]
pub fn classify(byte: u8, granularity: usize) -> ShadowState {
    if byte == 0 {
        return ShadowState::Addressable;
    }

    if (byte as usize) < granularity {
        return ShadowState::Partial {
            addressable: (granularity - byte as usize) as u8,
        };
    }

    if granularity == 8 && (MARKER_FLOOR..=MARKER_TOP).contains(&byte) {
        return ShadowState::Addressable;
    }

    ShadowState::Poisoned(byte)
}
