//! Backtrace capture for the poisoning gate.
//!
//! Records where the gate was last closed so that a poisoning write tripping
//! the gate assertion can point at the code that disabled poisoning.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::sync::mutex::Mutex;

/// Last recorded gate-close site.
pub struct GateTrace {
    last: Mutex<Option<String>>,
    closes: AtomicU64,
}

impl GateTrace {
    /// Create an empty trace.
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
            closes: AtomicU64::new(0),
        }
    }

    /// Capture the current stack as the gate-close site.
    pub fn capture(&self) {
        let bt = backtrace::Backtrace::new();
        *self.last.lock() = Some(format!("{:?}", bt));
        self.closes.fetch_add(1, Ordering::Relaxed);
    }

    /// Formatted backtrace of the most recent close, if any.
    pub fn last(&self) -> Option<String> {
        self.last.lock().clone()
    }

    /// Number of times the gate was closed.
    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }
}

impl Default for GateTrace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_records_site() {
        let trace = GateTrace::new();
        assert!(trace.last().is_none());

        trace.capture();
        assert_eq!(trace.close_count(), 1);
        assert!(trace.last().is_some());
    }
}
