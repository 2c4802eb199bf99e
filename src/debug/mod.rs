//! Debug utilities for tracking gate misuse.
//!
//! Only compiled when the `debug` feature is enabled.

pub(crate) mod backtrace;
