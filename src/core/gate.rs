//! Poisoning gate.
//!
//! A single switch guarding destructive shadow writes. Unpoisoning is always
//! allowed; poisoning with the gate closed is a caller bug caught by debug
//! assertions on the fast paths and skipped by the generic entry points.

use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "debug")]
use crate::debug::backtrace::GateTrace;

/// Process-wide enable/disable state for shadow poisoning.
///
/// Shared as `Arc<PoisonGate>` between the shadow engine and whichever
/// component brackets trusted regions. Loads and stores are relaxed: the flag
/// is an assertion aid, not a barrier.
pub struct PoisonGate {
    enabled: AtomicBool,
    #[cfg(feature = "debug")]
    closed_at: GateTrace,
}

impl PoisonGate {
    /// Create a gate in the given state.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            #[cfg(feature = "debug")]
            closed_at: GateTrace::new(),
        }
    }

    /// Open or close the gate.
    pub fn set_can_poison_memory(&self, enabled: bool) {
        #[cfg(feature = "debug")]
        if !enabled {
            self.closed_at.capture();
        }

        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether poisoning writes are currently allowed.
    #[inline]
    pub fn can_poison_memory(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Whether a write of `value` is allowed right now.
    #[inline]
    pub fn permits(&self, value: u8) -> bool {
        value == 0 || self.can_poison_memory()
    }

    /// Describe where the gate was last closed, for assertion messages.
    pub fn closed_site(&self) -> String {
        #[cfg(feature = "debug")]
        {
            self.closed_at
                .last()
                .unwrap_or_else(|| "gate never closed".to_string())
        }

        #[cfg(not(feature = "debug"))]
        {
            "enable the `debug` feature to record where the gate was closed".to_string()
        }
    }
}

#[cfg(feature = "debug")]
impl PoisonGate {
    /// Number of times the gate has been closed.
    pub fn close_count(&self) -> u64 {
        self.closed_at.close_count()
    }
}

impl Default for PoisonGate {
    fn default() -> Self {
        Self::new(true)
    }
}

impl std::fmt::Debug for PoisonGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoisonGate")
            .field("enabled", &self.can_poison_memory())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_enabled() {
        let gate = PoisonGate::default();
        assert!(gate.can_poison_memory());
        assert!(gate.permits(0xfa));
    }

    #[test]
    fn test_unpoison_always_permitted() {
        let gate = PoisonGate::new(true);
        gate.set_can_poison_memory(false);

        assert!(!gate.can_poison_memory());
        assert!(gate.permits(0));
        assert!(!gate.permits(1));

        gate.set_can_poison_memory(true);
        assert!(gate.permits(1));
    }

    #[test]
    #[cfg(feature = "debug")]
    fn test_close_site_recorded() {
        let gate = PoisonGate::default();
        assert_eq!(gate.closed_site(), "gate never closed");

        gate.set_can_poison_memory(false);
        assert_eq!(gate.close_count(), 1);
        assert_ne!(gate.closed_site(), "gate never closed");
    }
}
