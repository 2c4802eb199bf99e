//! Shadow write statistics.

use crate::util::size::format_bytes;

/// Counters describing what the shadow engine has written.
///
/// All counters stay at zero with the `minimal` feature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowStats {
    /// Bulk poison calls (nonzero value).
    pub poison_calls: u64,

    /// Bulk unpoison calls (value 0).
    pub unpoison_calls: u64,

    /// Redzone tail encodings.
    pub redzone_calls: u64,

    /// Shadow bytes covered by writes (written or released).
    pub shadow_bytes_written: u64,

    /// Contiguous fill operations issued by the filler.
    pub fill_ops: u64,

    /// Shadow bytes handed to the page releaser.
    pub bytes_released: u64,

    /// Poisoning requests dropped because the gate was closed.
    pub gate_skips: u64,
}

impl ShadowStats {
    /// Create empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bulk write calls.
    pub fn bulk_calls(&self) -> u64 {
        self.poison_calls + self.unpoison_calls
    }

    /// Average fills per bulk call; the marker strategy keeps this logarithmic.
    pub fn fills_per_call(&self) -> f64 {
        if self.bulk_calls() == 0 {
            return 0.0;
        }
        self.fill_ops as f64 / self.bulk_calls() as f64
    }
}

impl std::fmt::Display for ShadowStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Shadow Statistics:")?;
        writeln!(f, "  Poison calls:    {}", self.poison_calls)?;
        writeln!(f, "  Unpoison calls:  {}", self.unpoison_calls)?;
        writeln!(f, "  Redzone calls:   {}", self.redzone_calls)?;
        writeln!(f, "  Shadow written:  {}", format_bytes(self.shadow_bytes_written as usize))?;
        writeln!(f, "  Fill ops:        {}", self.fill_ops)?;
        writeln!(f, "  Released:        {}", format_bytes(self.bytes_released as usize))?;
        writeln!(f, "  Gate skips:      {}", self.gate_skips)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_per_call() {
        let mut stats = ShadowStats::new();
        assert_eq!(stats.fills_per_call(), 0.0);

        stats.unpoison_calls = 2;
        stats.poison_calls = 2;
        stats.fill_ops = 10;
        assert_eq!(stats.fills_per_call(), 2.5);
    }

    #[test]
    fn test_display() {
        let stats = ShadowStats {
            shadow_bytes_written: 2048,
            ..ShadowStats::default()
        };
        let text = stats.to_string();
        assert!(text.contains("Shadow written:  2.00 KB"));
    }
}
