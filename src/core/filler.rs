//! Shadow fill strategies.
//!
//! `MarkerFiller` is the generic path: bulk poison remaps small values and
//! flat-fills, bulk unpoison writes the exponential marker run. `FlatFiller`
//! is the OS-integrated path: a literal fill, with large unpoisons handed to
//! the page releaser instead of being written byte by byte.

use super::marker::{classify, fast_poison_value, fill_unpoison_markers, ShadowState, MARKER_FLOOR, MARKER_TOP};
use super::reclaimer::{PageReleaser, ShadowRegion};
use crate::util::align::{align_down, align_up};

/// Which filler variant a shadow engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillStrategy {
    /// Exponential marker fill on unpoison, remapped flat fill on poison.
    Marker,
    /// Literal value fill; large unpoisons release whole pages.
    Flat,
}

impl FillStrategy {
    /// Option-string name of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            FillStrategy::Marker => "marker",
            FillStrategy::Flat => "flat",
        }
    }
}

impl FillStrategy {
    /// Whether `value` cannot be used as a poison value under this strategy.
    ///
    /// The marker strategy reserves the marker band for unpoisoned runs.
    #[inline]
    pub fn reserves(self, value: u8) -> bool {
        self == FillStrategy::Marker && (MARKER_FLOOR..=MARKER_TOP).contains(&value)
    }

    /// Decode a shadow byte written by this strategy.
    ///
    /// Flat shadow has no markers: only `0` is addressable and every value
    /// at or above the granularity is poisoned.
    #[inline]
    pub fn classify(self, byte: u8, granularity: usize) -> ShadowState {
        match self {
            FillStrategy::Marker => classify(byte, granularity),
            FillStrategy::Flat => match byte {
                0 => ShadowState::Addressable,
                b if (b as usize) < granularity => ShadowState::Partial {
                    addressable: (granularity - b as usize) as u8,
                },
                b => ShadowState::Poisoned(b),
            },
        }
    }
}

impl std::str::FromStr for FillStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "marker" | "sparse" => Ok(FillStrategy::Marker),
            "flat" | "memset" => Ok(FillStrategy::Flat),
            _ => Err(()),
        }
    }
}

/// What a fill did, for statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillReport {
    /// Contiguous fills issued.
    pub fills: u32,
    /// Shadow bytes handed to the page releaser.
    pub released: usize,
}

/// Writes a poison value over a granule-aligned shadow range.
pub trait ShadowFiller: Send + Sync {
    /// The variant this filler implements.
    fn strategy(&self) -> FillStrategy;

    /// Fill `region` so that every byte encodes `value` (0 = unpoison).
    fn fill(&self, region: ShadowRegion<'_>, value: u8, releaser: &dyn PageReleaser) -> FillReport;
}

/// Generic-environment filler.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerFiller;

impl MarkerFiller {
    /// Create a marker filler.
    pub fn new() -> Self {
        Self
    }
}

impl ShadowFiller for MarkerFiller {
    fn strategy(&self) -> FillStrategy {
        FillStrategy::Marker
    }

    fn fill(&self, region: ShadowRegion<'_>, value: u8, _releaser: &dyn PageReleaser) -> FillReport {
        if region.bytes.is_empty() {
            return FillReport::default();
        }

        let fills = if value != 0 {
            region.bytes.fill(fast_poison_value(value));
            1
        } else {
            fill_unpoison_markers(region.bytes)
        };

        FillReport { fills, released: 0 }
    }
}

/// OS-integrated filler.
#[derive(Debug, Clone, Copy)]
pub struct FlatFiller {
    clear_threshold: usize,
}

impl FlatFiller {
    /// Create a flat filler releasing pages for unpoisons of at least
    /// `clear_threshold` shadow bytes.
    pub fn new(clear_threshold: usize) -> Self {
        Self { clear_threshold }
    }
}

impl ShadowFiller for FlatFiller {
    fn strategy(&self) -> FillStrategy {
        FillStrategy::Flat
    }

    fn fill(&self, mut region: ShadowRegion<'_>, value: u8, releaser: &dyn PageReleaser) -> FillReport {
        let len = region.bytes.len();
        if len == 0 {
            return FillReport::default();
        }

        if value != 0 || len < self.clear_threshold {
            region.bytes.fill(value);
            return FillReport { fills: 1, released: 0 };
        }

        let page_size = releaser.page_size();
        let page_beg = align_up(region.addr, page_size);
        let page_end = align_down(region.end(), page_size);

        if page_beg >= page_end {
            region.bytes.fill(0);
            return FillReport { fills: 1, released: 0 };
        }

        let mut fills = 0;
        if page_beg != region.addr {
            region.sub(region.addr, page_beg).bytes.fill(0);
            fills += 1;
        }
        let end = region.end();
        if page_end != end {
            region.sub(page_end, end).bytes.fill(0);
            fills += 1;
        }
        let released = releaser.release(region.sub(page_beg, page_end));

        FillReport { fills, released }
    }
}
