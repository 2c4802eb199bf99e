//! Shadow engine configuration.

use crate::core::filler::FillStrategy;
use crate::diagnostics::{emit_with_context, SP101, SP102};
use crate::error::ShadowError;
use crate::util::align::is_aligned;
use crate::util::size::{kb, mb, parse_size};

/// Environment variable read by [`ShadowConfig::from_env`].
pub const OPTIONS_ENV: &str = "SHADOWPOISON_OPTIONS";

/// Configuration for the shadow engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowConfig {
    /// log2 of the granularity (default: 3, i.e. 8-byte granules)
    pub shadow_scale: u32,

    /// Additive shadow offset (default: 0x7fff8000)
    pub shadow_offset: usize,

    /// First application address covered by the shadow window
    pub app_base: usize,

    /// Size of the application window in bytes (default: 64 MB)
    pub app_size: usize,

    /// Record the exact boundary of a partially valid redzone granule
    pub poison_partial: bool,

    /// Unpoisons of at least this many shadow bytes release whole pages
    /// instead of writing them (flat strategy only)
    pub clear_shadow_mmap_threshold: usize,

    /// Page size used by the page releaser (default: 4 KB)
    pub page_size: usize,

    /// Bulk fill variant
    pub fill_strategy: FillStrategy,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            shadow_scale: 3,
            shadow_offset: 0x7fff_8000,
            app_base: 0,
            app_size: mb(64),
            poison_partial: true,
            clear_shadow_mmap_threshold: kb(64),
            page_size: kb(4),
            fill_strategy: FillStrategy::Marker,
        }
    }
}

impl ShadowConfig {
    /// Create a small config for tests: a 1 MB window at address 0.
    pub fn minimal() -> Self {
        Self {
            app_size: mb(1),
            ..Self::default()
        }
    }

    /// Create a config with 128-byte granules and flat fills.
    pub fn coarse() -> Self {
        Self {
            shadow_scale: 7,
            fill_strategy: FillStrategy::Flat,
            ..Self::default()
        }
    }

    /// Bytes of application memory per shadow byte.
    #[inline]
    pub fn granularity(&self) -> usize {
        1 << self.shadow_scale
    }

    /// Builder pattern: set the granularity scale.
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.shadow_scale = scale;
        self
    }

    /// Builder pattern: set the shadow offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.shadow_offset = offset;
        self
    }

    /// Builder pattern: set the application window.
    pub fn with_window(mut self, app_base: usize, app_size: usize) -> Self {
        self.app_base = app_base;
        self.app_size = app_size;
        self
    }

    /// Builder pattern: set the partial redzone policy.
    pub fn with_poison_partial(mut self, enable: bool) -> Self {
        self.poison_partial = enable;
        self
    }

    /// Builder pattern: set the page-release threshold.
    pub fn with_clear_threshold(mut self, threshold: usize) -> Self {
        self.clear_shadow_mmap_threshold = threshold;
        self
    }

    /// Builder pattern: set the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Builder pattern: set the fill strategy.
    pub fn with_fill_strategy(mut self, strategy: FillStrategy) -> Self {
        self.fill_strategy = strategy;
        self
    }

    /// Check the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ShadowError> {
        let result = self.check();
        if let Err(ShadowError::InvalidConfig(reason)) = &result {
            emit_with_context(&SP102, reason);
        }
        result
    }

    fn check(&self) -> Result<(), ShadowError> {
        if !(3..=7).contains(&self.shadow_scale) {
            return Err(ShadowError::InvalidConfig("shadow_scale must be in 3..=7"));
        }
        if self.fill_strategy == FillStrategy::Marker && self.shadow_scale != 3 {
            return Err(ShadowError::InvalidConfig(
                "marker fill strategy requires shadow_scale 3",
            ));
        }
        if !self.page_size.is_power_of_two() {
            return Err(ShadowError::InvalidConfig("page_size must be a power of two"));
        }
        let granularity = self.granularity();
        if self.app_size == 0 || !is_aligned(self.app_size, granularity) {
            return Err(ShadowError::InvalidConfig(
                "app_size must be a nonzero multiple of the granularity",
            ));
        }
        if !is_aligned(self.app_base, granularity) {
            return Err(ShadowError::InvalidConfig("app_base must be granule aligned"));
        }
        let window_end = self
            .app_base
            .checked_add(self.app_size)
            .ok_or(ShadowError::InvalidConfig("application window overflows"))?;
        // One past the last shadow byte must be representable.
        ((window_end - 1) >> self.shadow_scale)
            .checked_add(self.shadow_offset)
            .and_then(|last| last.checked_add(1))
            .ok_or(ShadowError::InvalidConfig("shadow_offset overflows the shadow address space"))?;
        Ok(())
    }

    /// Apply a `key=value` options string on top of this config.
    ///
    /// Entries are separated by `:`, `,` or whitespace. Unknown keys are
    /// reported as a warning and skipped; malformed values are errors.
    pub fn apply_options(mut self, options: &str) -> Result<Self, ShadowError> {
        let entries = options
            .split(|c: char| c == ':' || c == ',' || c.is_whitespace())
            .filter(|entry| !entry.is_empty());

        for entry in entries {
            let (key, value) = entry.split_once('=').unwrap_or((entry, ""));
            let invalid = || ShadowError::InvalidOption {
                key: key.to_string(),
                value: value.to_string(),
            };

            match key {
                "poison_partial" => self.poison_partial = parse_flag(value).ok_or_else(invalid)?,
                "clear_shadow_mmap_threshold" => {
                    self.clear_shadow_mmap_threshold = parse_size(value).ok_or_else(invalid)?
                }
                "shadow_scale" => self.shadow_scale = value.parse().map_err(|_| invalid())?,
                "shadow_offset" => self.shadow_offset = parse_size(value).ok_or_else(invalid)?,
                "app_base" => self.app_base = parse_size(value).ok_or_else(invalid)?,
                "app_size" => self.app_size = parse_size(value).ok_or_else(invalid)?,
                "page_size" => self.page_size = parse_size(value).ok_or_else(invalid)?,
                "fill_strategy" => self.fill_strategy = value.parse().map_err(|_| invalid())?,
                _ => emit_with_context(&SP101, key),
            }
        }

        Ok(self)
    }

    /// Parse an options string over the defaults.
    pub fn parse_options(options: &str) -> Result<Self, ShadowError> {
        Self::default().apply_options(options)
    }

    /// Load from the `SHADOWPOISON_OPTIONS` environment variable.
    ///
    /// Returns the defaults when the variable is unset.
    pub fn from_env() -> Result<Self, ShadowError> {
        match std::env::var(OPTIONS_ENV) {
            Ok(options) => Self::parse_options(&options),
            Err(_) => Ok(Self::default()),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(ShadowConfig::default().validate().is_ok());
        assert!(ShadowConfig::minimal().validate().is_ok());
        assert!(ShadowConfig::coarse().validate().is_ok());
        assert_eq!(ShadowConfig::coarse().granularity(), 128);
    }

    #[test]
    fn test_marker_requires_scale_3() {
        let config = ShadowConfig::default().with_scale(7);
        assert!(matches!(config.validate(), Err(ShadowError::InvalidConfig(_))));

        let config = config.with_fill_strategy(FillStrategy::Flat);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_window() {
        let misaligned = ShadowConfig::minimal().with_window(0x1004, mb(1));
        assert!(misaligned.validate().is_err());

        let empty = ShadowConfig::minimal().with_window(0, 0);
        assert!(empty.validate().is_err());

        let page = ShadowConfig::minimal().with_page_size(3000);
        assert!(page.validate().is_err());
    }

    #[test]
    fn test_rejects_overflowing_offset() {
        let config = ShadowConfig::minimal().with_offset(usize::MAX);
        assert_eq!(
            config.validate(),
            Err(ShadowError::InvalidConfig("shadow_offset overflows the shadow address space"))
        );

        // Largest offset whose shadow still fits.
        let last_granule = (mb(1) - 1) >> 3;
        let config = ShadowConfig::minimal().with_offset(usize::MAX - last_granule - 1);
        assert!(config.validate().is_ok());
        let config = ShadowConfig::minimal().with_offset(usize::MAX - last_granule);
        assert!(config.validate().is_err());

        let options = format!("shadow_offset={:#x}", usize::MAX - 0xff);
        let parsed = ShadowConfig::parse_options(&options).unwrap();
        assert!(parsed.validate().is_err());
    }

    #[test]
    fn test_parse_options() {
        let config = ShadowConfig::parse_options(
            "poison_partial=0:clear_shadow_mmap_threshold=128k:fill_strategy=flat,app_size=0x200000",
        )
        .unwrap();

        assert!(!config.poison_partial);
        assert_eq!(config.clear_shadow_mmap_threshold, kb(128));
        assert_eq!(config.fill_strategy, FillStrategy::Flat);
        assert_eq!(config.app_size, mb(2));
        assert_eq!(config.shadow_scale, 3);
    }

    #[test]
    fn test_parse_options_rejects_bad_value() {
        let err = ShadowConfig::parse_options("page_size=huge").unwrap_err();
        assert_eq!(
            err,
            ShadowError::InvalidOption {
                key: "page_size".into(),
                value: "huge".into()
            }
        );

        assert!(ShadowConfig::parse_options("poison_partial=maybe").is_err());
    }

    #[test]
    fn test_bare_flag_enables() {
        let config = ShadowConfig::default()
            .with_poison_partial(false)
            .apply_options("poison_partial")
            .unwrap();
        assert!(config.poison_partial);
    }
}
