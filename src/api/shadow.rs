//! The shadow engine.

use std::sync::Arc;

use crate::api::config::ShadowConfig;
use crate::api::stats::ShadowStats;
use crate::core::arena::ShadowArena;
use crate::core::filler::{FillReport, FillStrategy, FlatFiller, MarkerFiller, ShadowFiller};
use crate::core::gate::PoisonGate;
use crate::core::mapper::{AddressMapper, AffineMapper};
use crate::core::marker::ShadowState;
use crate::core::reclaimer::{PageReleaser, ShadowRegion, ZeroingReleaser};
use crate::core::redzone;
use crate::diagnostics::{emit_with_context, SP001, SP002, SP003, SP004};
use crate::error::ShadowError;
use crate::util::align::{checked_align_up, is_aligned};

/// Shadow memory for one application window, plus the machinery that writes it.
///
/// Writes take `&mut self` and perform no locking; callers serialize poisoning
/// of a region themselves (see [`SharedShadow`](crate::SharedShadow) for the
/// allocator-wide lock). The gate is shared separately so it can be toggled
/// without that lock.
///
/// # Example
///
/// ```rust
/// use shadowpoison::{ShadowConfig, ShadowMemory};
///
/// let mut shadow = ShadowMemory::new(ShadowConfig::minimal()).unwrap();
///
/// // 16 valid bytes followed by a 16-byte redzone.
/// shadow.poison_shadow(0x1000, 32, 0xfa).unwrap();
/// shadow.poison_shadow(0x1000, 16, 0).unwrap();
///
/// assert!(!shadow.address_is_poisoned(0x100f));
/// assert!(shadow.address_is_poisoned(0x1010));
/// ```
pub struct ShadowMemory<M: AddressMapper = AffineMapper> {
    config: ShadowConfig,
    mapper: M,
    gate: Arc<PoisonGate>,
    arena: ShadowArena,
    filler: Box<dyn ShadowFiller>,
    releaser: Box<dyn PageReleaser>,
    stats: ShadowStats,
}

impl ShadowMemory<AffineMapper> {
    /// Create a shadow engine using the affine mapper described by `config`.
    pub fn new(config: ShadowConfig) -> Result<Self, ShadowError> {
        let mapper = AffineMapper::new(config.shadow_scale, config.shadow_offset);
        Self::with_mapper(config, mapper)
    }
}

impl<M: AddressMapper> ShadowMemory<M> {
    /// Create a shadow engine with an injected address mapper.
    ///
    /// The mapper's scale must match `config.shadow_scale`.
    pub fn with_mapper(config: ShadowConfig, mapper: M) -> Result<Self, ShadowError> {
        config.validate()?;
        if mapper.scale() != config.shadow_scale {
            return Err(ShadowError::InvalidConfig("mapper scale differs from shadow_scale"));
        }

        let granularity = config.granularity();
        let base = mapper.mem_to_shadow(config.app_base);
        let end = mapper.mem_to_shadow(config.app_base + config.app_size - granularity) + 1;
        if end <= base {
            return Err(ShadowError::InvalidConfig("mapper is not monotonic over the window"));
        }

        let filler: Box<dyn ShadowFiller> = match config.fill_strategy {
            FillStrategy::Marker => Box::new(MarkerFiller::new()),
            FillStrategy::Flat => Box::new(FlatFiller::new(config.clear_shadow_mmap_threshold)),
        };

        Ok(Self {
            arena: ShadowArena::new(base, end - base),
            releaser: Box::new(ZeroingReleaser::new(config.page_size)),
            gate: Arc::new(PoisonGate::default()),
            filler,
            mapper,
            config,
            stats: ShadowStats::new(),
        })
    }

    /// Builder pattern: share an existing gate.
    pub fn with_gate(mut self, gate: Arc<PoisonGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Builder pattern: replace the page releaser.
    pub fn with_releaser(mut self, releaser: impl PageReleaser + 'static) -> Self {
        self.releaser = Box::new(releaser);
        self
    }

    /// Builder pattern: replace the fill strategy implementation.
    pub fn with_filler(mut self, filler: impl ShadowFiller + 'static) -> Self {
        self.filler = Box::new(filler);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Bytes of application memory per shadow byte.
    #[inline]
    pub fn granularity(&self) -> usize {
        self.mapper.granularity()
    }

    /// The shared poisoning gate.
    pub fn gate(&self) -> &Arc<PoisonGate> {
        &self.gate
    }

    /// Open or close the poisoning gate.
    pub fn set_can_poison_memory(&self, enabled: bool) {
        self.gate.set_can_poison_memory(enabled);
    }

    /// Whether poisoning writes are currently allowed.
    pub fn can_poison_memory(&self) -> bool {
        self.gate.can_poison_memory()
    }

    /// The active fill strategy.
    pub fn fill_strategy(&self) -> FillStrategy {
        self.filler.strategy()
    }

    /// Shadow address for `addr`.
    #[inline]
    pub fn mem_to_shadow(&self, addr: usize) -> usize {
        self.mapper.mem_to_shadow(addr)
    }

    /// Whether `[addr, addr + size)` lies in the application window.
    pub fn covers(&self, addr: usize, size: usize) -> bool {
        let window_end = self.config.app_base + self.config.app_size;
        match addr.checked_add(size) {
            Some(end) => addr >= self.config.app_base && end <= window_end,
            None => false,
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> &ShadowStats {
        &self.stats
    }

    /// Reset all statistics to zero.
    pub fn reset_stats(&mut self) {
        self.stats = ShadowStats::new();
    }

    // =========================================================================
    // Fast paths
    // =========================================================================

    /// Poison (`value != 0`) or unpoison (`value == 0`) a granule-aligned range.
    ///
    /// Preconditions, checked only in debug builds: `aligned_beg` and
    /// `aligned_size` are multiples of the granularity, the range lies in the
    /// window, and the gate is open when `value != 0`.
    pub fn fast_poison_shadow(&mut self, aligned_beg: usize, aligned_size: usize, value: u8) {
        self.check_gate(value);
        let granularity = self.granularity();
        debug_assert!(
            is_aligned(aligned_beg, granularity) && is_aligned(aligned_size, granularity),
            "fast_poison_shadow: {:#x}+{} not aligned to {}",
            aligned_beg,
            aligned_size,
            granularity
        );
        debug_assert!(
            !self.fill_strategy().reserves(value),
            "fast_poison_shadow: value {:#04x} is in the unpoison marker band",
            value
        );

        self.write_bulk(aligned_beg, aligned_size, value);
    }

    /// Encode the shadow for a redzone span starting at `aligned_addr` whose
    /// first `size` bytes remain valid.
    ///
    /// One shadow byte is written per granule of `[aligned_addr,
    /// aligned_addr + redzone_size)`. The gate must be open (debug check).
    pub fn fast_poison_shadow_partial_right_redzone(
        &mut self,
        aligned_addr: usize,
        size: usize,
        redzone_size: usize,
        value: u8,
    ) {
        self.check_gate(value.max(1));
        debug_assert!(
            is_aligned(aligned_addr, self.granularity()),
            "fast_poison_shadow_partial_right_redzone: {:#x} not aligned to {}",
            aligned_addr,
            self.granularity()
        );
        debug_assert!(
            !self.fill_strategy().reserves(value),
            "fast_poison_shadow_partial_right_redzone: value {:#04x} is in the unpoison marker band",
            value
        );

        self.write_redzone(aligned_addr, size, redzone_size, value);
    }

    // Unchecked writers. The validating entry points test the gate once
    // before calling these.

    fn write_bulk(&mut self, aligned_beg: usize, aligned_size: usize, value: u8) {
        if aligned_size == 0 {
            return;
        }

        let granularity = self.granularity();
        let shadow_beg = self.mapper.mem_to_shadow(aligned_beg);
        let shadow_end = self.mapper.mem_to_shadow(aligned_beg + aligned_size - granularity) + 1;

        #[cfg(feature = "log")]
        log::trace!(
            "fast_poison_shadow: {:#x} (shadow {:#x}) size {} value {:#04x}",
            aligned_beg,
            shadow_beg,
            aligned_size,
            value
        );

        let region = ShadowRegion::new(shadow_beg, self.arena.slice_mut(shadow_beg, shadow_end));
        let report = self.filler.fill(region, value, self.releaser.as_ref());
        self.record_bulk(value, shadow_end - shadow_beg, report);
    }

    fn write_redzone(&mut self, aligned_addr: usize, size: usize, redzone_size: usize, value: u8) {
        let granularity = self.granularity();

        #[cfg(feature = "log")]
        log::trace!(
            "poison_partial_right_redzone: {:#x} size {} redzone_size {} value {:#04x}",
            aligned_addr,
            size,
            redzone_size,
            value
        );

        let shadow_beg = self.mapper.mem_to_shadow(aligned_addr);
        let len = redzone::shadow_len(redzone_size, granularity);
        let bytes = self.arena.slice_mut(shadow_beg, shadow_beg + len);
        redzone::encode(bytes, size, value, granularity, self.config.poison_partial);

        #[cfg(not(feature = "minimal"))]
        {
            self.stats.redzone_calls += 1;
            self.stats.shadow_bytes_written += len as u64;
        }
    }

    // =========================================================================
    // Validating entry points
    // =========================================================================

    /// Poison or unpoison `[addr, addr + size)`.
    ///
    /// Poisoning with the gate closed is skipped and reported as success.
    /// Both ends must be granule aligned and the range must lie in the window.
    pub fn poison_shadow(&mut self, addr: usize, size: usize, value: u8) -> Result<(), ShadowError> {
        if !self.gate.permits(value) {
            self.record_gate_skip();
            return Ok(());
        }

        self.check_value(value)?;
        self.check_aligned(addr)?;
        let end = addr
            .checked_add(size)
            .ok_or_else(|| self.out_of_range(addr, size))?;
        self.check_aligned(end)?;
        if !self.covers(addr, size) {
            return Err(self.out_of_range(addr, size));
        }

        self.write_bulk(addr, size, value);
        Ok(())
    }

    /// Encode a redzone span starting at `addr` whose first `size` bytes stay valid.
    ///
    /// Skipped when the gate is closed. `addr` must be granule aligned and
    /// every granule of the span must lie in the window.
    pub fn poison_shadow_partial_right_redzone(
        &mut self,
        addr: usize,
        size: usize,
        redzone_size: usize,
        value: u8,
    ) -> Result<(), ShadowError> {
        if !self.can_poison_memory() {
            self.record_gate_skip();
            return Ok(());
        }

        self.check_value(value)?;
        self.check_aligned(addr)?;
        match checked_align_up(redzone_size, self.granularity()) {
            Some(span) if self.covers(addr, span) => {}
            _ => return Err(self.out_of_range(addr, redzone_size)),
        }

        self.write_redzone(addr, size, redzone_size, value);
        Ok(())
    }

    // =========================================================================
    // Page reclaim
    // =========================================================================

    /// Release the whole shadow pages backing `[p, p + size)`.
    ///
    /// The range must already be addressable; released pages read back as
    /// zero. Parts of the range outside the window are ignored. Returns the
    /// number of shadow bytes released.
    pub fn flush_unneeded_shadow_memory(&mut self, p: usize, size: usize) -> usize {
        let window_end = self.config.app_base + self.config.app_size;
        let beg = p.max(self.config.app_base);
        let end = p.saturating_add(size).min(window_end);
        if size == 0 || beg >= end {
            return 0;
        }

        let shadow_beg = self.mapper.mem_to_shadow(beg).max(self.arena.base());
        let shadow_end = self.mapper.mem_to_shadow(end).min(self.arena.end());
        if shadow_beg >= shadow_end {
            return 0;
        }

        #[cfg(any(debug_assertions, feature = "diagnostics"))]
        self.check_flush_contract(shadow_beg, shadow_end);

        let region = ShadowRegion::new(shadow_beg, self.arena.slice_mut(shadow_beg, shadow_end));
        let released = self.releaser.release(region);

        #[cfg(feature = "log")]
        log::debug!(
            "flush_unneeded_shadow_memory: {:#x}+{} released {} shadow bytes",
            p,
            size,
            released
        );

        #[cfg(not(feature = "minimal"))]
        {
            self.stats.bytes_released += released as u64;
        }

        released
    }

    // =========================================================================
    // Shadow reader
    // =========================================================================

    /// Raw shadow byte for the granule containing `addr`.
    pub fn shadow_byte(&self, addr: usize) -> Option<u8> {
        if !self.covers(addr, 1) {
            return None;
        }
        self.arena.get(self.mapper.mem_to_shadow(addr))
    }

    /// Decoded state of the granule containing `addr`.
    pub fn classify_addr(&self, addr: usize) -> Option<ShadowState> {
        self.shadow_byte(addr)
            .map(|byte| self.fill_strategy().classify(byte, self.granularity()))
    }

    /// Whether an access to the single byte at `addr` would be reported.
    ///
    /// Addresses outside the window are never poisoned.
    pub fn address_is_poisoned(&self, addr: usize) -> bool {
        match self.classify_addr(addr) {
            Some(state) => !state.allows(addr & (self.granularity() - 1)),
            None => false,
        }
    }

    /// First poisoned address in `[beg, beg + size)`, if any.
    pub fn region_is_poisoned(&self, beg: usize, size: usize) -> Option<usize> {
        let granularity = self.granularity();
        let end = beg.saturating_add(size);
        let mut addr = beg;

        while addr < end {
            let granule_beg = addr & !(granularity - 1);
            let granule_end = granule_beg.saturating_add(granularity);
            let limit = granule_end.min(end);

            match self.classify_addr(addr) {
                Some(ShadowState::Poisoned(_)) => return Some(addr),
                Some(ShadowState::Partial { addressable }) => {
                    let first_bad = addr.max(granule_beg + addressable as usize);
                    if first_bad < limit {
                        return Some(first_bad);
                    }
                }
                Some(ShadowState::Addressable) | None => {}
            }

            addr = granule_end;
        }

        None
    }

    /// Shadow bytes covering `[addr, addr + size)`; both ends granule aligned.
    pub fn shadow_bytes(&self, addr: usize, size: usize) -> Option<&[u8]> {
        let granularity = self.granularity();
        if size == 0
            || !is_aligned(addr, granularity)
            || !is_aligned(size, granularity)
            || !self.covers(addr, size)
        {
            return None;
        }
        let beg = self.mapper.mem_to_shadow(addr);
        let end = self.mapper.mem_to_shadow(addr + size - granularity) + 1;
        Some(self.arena.slice(beg, end))
    }

    // =========================================================================
    // Internal
    // =========================================================================

    #[inline]
    fn check_gate(&self, value: u8) {
        #[cfg(debug_assertions)]
        if !self.gate.permits(value) {
            let site = self.gate.closed_site();
            emit_with_context(&SP001, &site);
            panic!("{} (value {:#04x}); gate closed at: {}", SP001.message, value, site);
        }

        #[cfg(not(debug_assertions))]
        let _ = value;
    }

    fn check_value(&self, value: u8) -> Result<(), ShadowError> {
        if !self.fill_strategy().reserves(value) {
            return Ok(());
        }
        emit_with_context(&SP004, &format!("{:#04x}", value));
        Err(ShadowError::ReservedValue { value })
    }

    fn check_aligned(&self, addr: usize) -> Result<(), ShadowError> {
        let granularity = self.granularity();
        if is_aligned(addr, granularity) {
            return Ok(());
        }
        emit_with_context(&SP002, &format!("{:#x}", addr));
        Err(ShadowError::Misaligned { addr, granularity })
    }

    fn out_of_range(&self, addr: usize, size: usize) -> ShadowError {
        emit_with_context(&SP003, &format!("{:#x}+{}", addr, size));
        ShadowError::OutOfRange { addr, size }
    }

    #[cfg(any(debug_assertions, feature = "diagnostics"))]
    fn check_flush_contract(&self, shadow_beg: usize, shadow_end: usize) {
        use crate::util::align::{align_down, align_up};

        let granularity = self.granularity();
        let region_bytes = self.arena.slice(shadow_beg, shadow_end);
        let page_size = self.releaser.page_size();
        let page_beg = align_up(shadow_beg, page_size);
        let page_end = align_down(shadow_end, page_size);
        if page_beg >= page_end {
            return;
        }

        let interior = &region_bytes[page_beg - shadow_beg..page_end - shadow_beg];
        let strategy = self.fill_strategy();
        let clean = interior
            .iter()
            .all(|&b| strategy.classify(b, granularity).is_addressable());
        crate::sp_assert!(clean, SP201, format!("shadow {:#x}..{:#x}", page_beg, page_end));
    }

    fn record_bulk(&mut self, value: u8, shadow_len: usize, report: FillReport) {
        #[cfg(not(feature = "minimal"))]
        {
            if value == 0 {
                self.stats.unpoison_calls += 1;
            } else {
                self.stats.poison_calls += 1;
            }
            self.stats.shadow_bytes_written += shadow_len as u64;
            self.stats.fill_ops += report.fills as u64;
            self.stats.bytes_released += report.released as u64;
        }

        #[cfg(feature = "minimal")]
        let _ = (value, shadow_len, report);
    }

    fn record_gate_skip(&mut self) {
        #[cfg(not(feature = "minimal"))]
        {
            self.stats.gate_skips += 1;
        }
    }
}

impl<M: AddressMapper> std::fmt::Debug for ShadowMemory<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowMemory")
            .field("granularity", &self.granularity())
            .field("strategy", &self.filler.strategy())
            .field("arena", &self.arena)
            .field("gate", &self.gate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::marker::{MARKER_BAND_FLOOR, MARKER_TOP};

    fn shadow() -> ShadowMemory {
        ShadowMemory::new(ShadowConfig::minimal()).unwrap()
    }

    fn in_band(b: u8) -> bool {
        (MARKER_BAND_FLOOR..=MARKER_TOP).contains(&b)
    }

    #[test]
    fn test_unpoison_two_granules() {
        let mut shadow = shadow();
        shadow.fast_poison_shadow(0x1000, 16, 0);

        let bytes = shadow.shadow_bytes(0x1000, 16).unwrap();
        assert_eq!(bytes, &[63, 64]);
        assert!(bytes.iter().all(|&b| in_band(b)));
        assert_eq!(shadow.classify_addr(0x1000), Some(ShadowState::Addressable));
        assert_eq!(shadow.classify_addr(0x1008), Some(ShadowState::Addressable));
    }

    #[test]
    fn test_poison_small_value_is_remapped() {
        let mut shadow = shadow();
        shadow.fast_poison_shadow(0x2000, 24, 3);

        assert_eq!(shadow.shadow_bytes(0x2000, 24).unwrap(), &[69, 69, 69]);
        assert!(shadow.address_is_poisoned(0x2000));
        // Neighbouring granules untouched.
        assert_eq!(shadow.shadow_byte(0x1ff8), Some(0));
        assert_eq!(shadow.shadow_byte(0x2018), Some(0));
    }

    #[test]
    fn test_poison_idempotent() {
        let mut shadow = shadow();
        for &(beg, size, value) in &[(0x0, 8, 0xfa), (0x4000, 4096, 1), (0x8000, 64, 0xf5)] {
            shadow.fast_poison_shadow(beg, size, value);
            let first = shadow.shadow_bytes(beg, size).unwrap().to_vec();
            shadow.fast_poison_shadow(beg, size, value);
            assert_eq!(shadow.shadow_bytes(beg, size).unwrap(), first.as_slice());

            let expected = if value <= 7 { 72 - value } else { value };
            assert!(first.iter().all(|&b| b == expected));
        }
    }

    #[test]
    fn test_zero_size_is_noop() {
        let mut shadow = shadow();
        shadow.fast_poison_shadow(0x1000, 0, 0xfa);
        assert_eq!(shadow.shadow_byte(0x1000), Some(0));
        assert_eq!(shadow.stats().bulk_calls(), 0);
    }

    #[test]
    fn test_unpoison_allowed_with_gate_closed() {
        let mut shadow = shadow();
        shadow.fast_poison_shadow(0x3000, 8, 0xfa);
        shadow.set_can_poison_memory(false);

        shadow.fast_poison_shadow(0x3000, 8, 0);
        assert_eq!(shadow.classify_addr(0x3000), Some(ShadowState::Addressable));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "poisoning is disabled")]
    fn test_poison_with_gate_closed_asserts() {
        let mut shadow = shadow();
        shadow.set_can_poison_memory(false);
        shadow.fast_poison_shadow(0x3000, 8, 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "poisoning is disabled")]
    fn test_redzone_with_gate_closed_asserts() {
        let mut shadow = shadow();
        shadow.set_can_poison_memory(false);
        shadow.fast_poison_shadow_partial_right_redzone(0x3000, 5, 8, 0xfb);
    }

    #[test]
    fn test_redzone_partial_tail() {
        let mut shadow = shadow();
        shadow.fast_poison_shadow_partial_right_redzone(0x5000, 5, 8, 0xfb);

        assert_eq!(shadow.shadow_byte(0x5000), Some(3));
        assert!(!shadow.address_is_poisoned(0x5004));
        assert!(shadow.address_is_poisoned(0x5005));
    }

    #[test]
    fn test_redzone_partial_policy_off() {
        let config = ShadowConfig::minimal().with_poison_partial(false);
        let mut shadow = ShadowMemory::new(config).unwrap();
        shadow.fast_poison_shadow_partial_right_redzone(0x5000, 13, 32, 0xfb);

        assert_eq!(shadow.shadow_bytes(0x5000, 32).unwrap(), &[0, 0, 0xfb, 0xfb]);
    }

    #[test]
    fn test_generic_rejects_misaligned() {
        let mut shadow = shadow();
        assert_eq!(
            shadow.poison_shadow(0x1004, 8, 0xfa),
            Err(ShadowError::Misaligned { addr: 0x1004, granularity: 8 })
        );
        assert_eq!(
            shadow.poison_shadow(0x1000, 12, 0xfa),
            Err(ShadowError::Misaligned { addr: 0x100c, granularity: 8 })
        );
        assert_eq!(shadow.shadow_byte(0x1000), Some(0));
    }

    #[test]
    fn test_generic_rejects_out_of_window() {
        let mut shadow = shadow();
        let window_end = shadow.config().app_size;

        assert!(matches!(
            shadow.poison_shadow(window_end - 8, 16, 0xfa),
            Err(ShadowError::OutOfRange { .. })
        ));
        assert!(matches!(
            shadow.poison_shadow_partial_right_redzone(window_end - 8, 0, 16, 0xfa),
            Err(ShadowError::OutOfRange { .. })
        ));
        assert!(shadow.poison_shadow(window_end - 8, 8, 0xfa).is_ok());
    }

    #[test]
    fn test_redzone_size_overflow_is_out_of_range() {
        let mut shadow = shadow();
        assert_eq!(
            shadow.poison_shadow_partial_right_redzone(0x1000, 0, usize::MAX, 0xfa),
            Err(ShadowError::OutOfRange { addr: 0x1000, size: usize::MAX })
        );
        assert_eq!(
            shadow.poison_shadow_partial_right_redzone(0x1000, 0, usize::MAX - 6, 0xfa),
            Err(ShadowError::OutOfRange { addr: 0x1000, size: usize::MAX - 6 })
        );
        assert_eq!(shadow.shadow_byte(0x1000), Some(0));
    }

    #[test]
    fn test_marker_band_value_rejected() {
        let mut shadow = shadow();
        for value in [8u8, 0x20, 64] {
            assert_eq!(
                shadow.poison_shadow(0x1000, 16, value),
                Err(ShadowError::ReservedValue { value })
            );
            assert_eq!(
                shadow.poison_shadow_partial_right_redzone(0x1000, 3, 16, value),
                Err(ShadowError::ReservedValue { value })
            );
        }
        assert_eq!(shadow.shadow_byte(0x1000), Some(0));

        // Just outside the band still poisons.
        shadow.poison_shadow(0x1000, 16, 65).unwrap();
        assert!(shadow.address_is_poisoned(0x1000));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "marker band")]
    fn test_fast_path_marker_band_value_asserts() {
        let mut shadow = shadow();
        shadow.fast_poison_shadow(0x1000, 16, 0x20);
    }

    #[test]
    fn test_flat_poison_in_marker_band_reads_poisoned() {
        let config = ShadowConfig::minimal().with_fill_strategy(FillStrategy::Flat);
        let mut shadow = ShadowMemory::new(config).unwrap();

        shadow.poison_shadow(0x1000, 16, 0x20).unwrap();
        assert_eq!(shadow.shadow_byte(0x1000), Some(0x20));
        assert_eq!(shadow.classify_addr(0x1000), Some(ShadowState::Poisoned(0x20)));
        assert!(shadow.address_is_poisoned(0x1000));
        assert_eq!(shadow.region_is_poisoned(0x0ff8, 24), Some(0x1000));
    }

    #[test]
    fn test_offset_overflow_rejected() {
        let config = ShadowConfig::minimal().with_offset(usize::MAX);
        assert!(matches!(
            ShadowMemory::new(config),
            Err(ShadowError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_flush_past_window_with_high_offset() {
        let last_granule = (ShadowConfig::minimal().app_size - 1) >> 3;
        let config = ShadowConfig::minimal().with_offset(usize::MAX - last_granule - 1);
        let mut shadow = ShadowMemory::new(config).unwrap();

        assert_eq!(shadow.flush_unneeded_shadow_memory(usize::MAX - 0xfff, 0x1000), 0);
        assert_eq!(shadow.flush_unneeded_shadow_memory(0, usize::MAX), 0x20000 - 0x1000);
    }

    #[test]
    fn test_generic_skips_when_gate_closed() {
        let mut shadow = shadow();
        shadow.set_can_poison_memory(false);

        assert!(shadow.poison_shadow(0x1000, 8, 0xfa).is_ok());
        assert!(shadow.poison_shadow_partial_right_redzone(0x1000, 3, 8, 0xfa).is_ok());
        assert_eq!(shadow.shadow_byte(0x1000), Some(0));
        if !cfg!(feature = "minimal") {
            assert_eq!(shadow.stats().gate_skips, 2);
        }

        // Unpoison still goes through.
        assert!(shadow.poison_shadow(0x1000, 8, 0).is_ok());
        assert_eq!(shadow.shadow_byte(0x1000), Some(64));
    }

    #[test]
    fn test_region_is_poisoned() {
        let mut shadow = shadow();
        // 20-byte object followed by redzone.
        shadow.fast_poison_shadow_partial_right_redzone(0x6000, 20, 48, 0xfc);

        assert_eq!(shadow.region_is_poisoned(0x6000, 20), None);
        assert_eq!(shadow.region_is_poisoned(0x6000, 21), Some(0x6014));
        assert_eq!(shadow.region_is_poisoned(0x6016, 4), Some(0x6016));
        assert_eq!(shadow.region_is_poisoned(0x6020, 8), Some(0x6020));
        assert_eq!(shadow.region_is_poisoned(0x6000, 0), None);
    }

    #[test]
    fn test_out_of_window_reads() {
        let shadow = shadow();
        let window_end = shadow.config().app_size;
        assert_eq!(shadow.shadow_byte(window_end), None);
        assert!(!shadow.address_is_poisoned(window_end + 64));
    }

    #[test]
    fn test_stats_track_fills() {
        let mut shadow = shadow();
        shadow.fast_poison_shadow(0, 8 * 1024, 0xfa);
        shadow.fast_poison_shadow(0, 8 * 1024, 0);

        let stats = shadow.stats();
        if cfg!(feature = "minimal") {
            assert_eq!(stats, &ShadowStats::default());
        } else {
            assert_eq!(stats.poison_calls, 1);
            assert_eq!(stats.unpoison_calls, 1);
            assert_eq!(stats.shadow_bytes_written, 2048);
            // poison fill, then tail + blocks for i = 3..=9 + prefix
            assert_eq!(stats.fill_ops, 1 + 1 + 7 + 1);
        }

        shadow.reset_stats();
        assert_eq!(shadow.stats(), &ShadowStats::default());
    }

    #[test]
    fn test_flush_releases_pages() {
        let mut shadow = shadow();
        let page = shadow.config().page_size;
        let span = page * 8 * 4; // four shadow pages

        shadow.fast_poison_shadow(0, span, 0);
        let released = shadow.flush_unneeded_shadow_memory(0, span);

        // Default offset 0x7fff8000 is page aligned, so all four pages go.
        assert_eq!(released, page * 4);
        assert!(shadow.shadow_bytes(0, span).unwrap().iter().all(|&b| b == 0));
        assert_eq!(shadow.region_is_poisoned(0, span), None);
    }

    #[test]
    fn test_flush_outside_window_is_ignored() {
        let mut shadow = shadow();
        let window_end = shadow.config().app_size;
        assert_eq!(shadow.flush_unneeded_shadow_memory(window_end, 1 << 20), 0);
        assert_eq!(shadow.flush_unneeded_shadow_memory(0, 0), 0);
    }

    #[test]
    fn test_coarse_mode() {
        let mut shadow = ShadowMemory::new(ShadowConfig::coarse().with_window(0, 1 << 20)).unwrap();
        assert_eq!(shadow.granularity(), 128);
        assert_eq!(shadow.fill_strategy(), FillStrategy::Flat);

        shadow.fast_poison_shadow_partial_right_redzone(0x1000, 100, 384, 0xfa);
        assert_eq!(shadow.shadow_bytes(0x1000, 384).unwrap(), &[28, 0xff, 0xff]);
        assert!(!shadow.address_is_poisoned(0x1063));
        assert!(shadow.address_is_poisoned(0x1064));

        shadow.fast_poison_shadow(0x1000, 384, 0);
        assert_eq!(shadow.shadow_bytes(0x1000, 384).unwrap(), &[0, 0, 0]);
    }

    #[test]
    fn test_custom_mapper() {
        struct Identity;
        impl AddressMapper for Identity {
            fn scale(&self) -> u32 {
                3
            }
            fn mem_to_shadow(&self, addr: usize) -> usize {
                addr >> 3
            }
        }

        let mut shadow = ShadowMemory::with_mapper(ShadowConfig::minimal(), Identity).unwrap();
        shadow.fast_poison_shadow(0x100, 8, 0xfa);
        assert_eq!(shadow.mem_to_shadow(0x100), 0x20);
        assert_eq!(shadow.shadow_byte(0x100), Some(0xfa));
    }

    #[test]
    fn test_mapper_scale_mismatch() {
        let mapper = AffineMapper::new(4, 0);
        assert!(matches!(
            ShadowMemory::with_mapper(ShadowConfig::minimal(), mapper),
            Err(ShadowError::InvalidConfig(_))
        ));
    }
}
