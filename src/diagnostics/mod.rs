//! Runtime diagnostics.
//!
//! Contract violations are reported as coded diagnostics, in the style of
//! compiler errors, rather than failing silently:
//!
//! - **Emission**: stderr in debug builds, the `log` crate with the `log`
//!   feature, or an installed [`DiagnosticSink`]
//! - **Strict mode**: optional panic-on-error for CI (`SHADOWPOISON_STRICT`)
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                        |
//! |-------|--------------------------------|
//! | SP0xx | Shadow writer contract         |
//! | SP1xx | Configuration                  |
//! | SP2xx | Page reclaim                   |
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use shadowpoison::diagnostics::{install_sink, CollectingSink};
//! use shadowpoison::{ShadowConfig, ShadowMemory};
//!
//! let sink = Arc::new(CollectingSink::new());
//! install_sink(Some(sink.clone()));
//!
//! let mut shadow = ShadowMemory::new(ShadowConfig::minimal()).unwrap();
//! assert!(shadow.poison_shadow(0x1004, 8, 0xfa).is_err());
//! assert!(sink.contains("SP002"));
//!
//! install_sink(None);
//! ```

pub mod emit;
pub mod kind;
pub mod macros;
pub mod strict;

pub use emit::{
    emit, emit_with_context, install_sink, is_suppressed, suppress_diagnostics, CollectingSink,
    DiagnosticSink,
};
pub use kind::{Diagnostic, DiagnosticKind};
pub use strict::{init_from_env, set_strict_mode, strict_mode, StrictMode, StrictModeGuard};

// Predefined diagnostics
pub use kind::{SP001, SP002, SP003, SP004, SP101, SP102, SP201};
