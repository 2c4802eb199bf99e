//! # shadowpoison
//!
//! Shadow-memory poisoning engine for memory-safety instrumentation runtimes.
//!
//! Every granule of application memory (8 bytes by default) is described by
//! one shadow byte. This crate owns those bytes and the rules for writing
//! them: bulk poison and unpoison, partial right redzones, a global
//! poisoning gate and page-level reclaim of unneeded shadow.
//!
//! ## Features
//!
//! - Affine address mapping `shadow = (addr >> scale) + offset`, or any
//!   injected [`AddressMapper`]
//! - Marker-based bulk unpoison: O(log N) fills per call
//! - Flat fill with page release for large unpoisons
//! - Redzone tail encoding with a partial-granule policy
//! - Shared poisoning gate, toggled without locking the engine
//! - Thread-safe handle and lock-free deferred reclaim queue
//! - Coded runtime diagnostics with an optional strict mode
//!
//! ## Quick Start
//!
//! ```rust
//! use shadowpoison::{ShadowConfig, ShadowMemory, ShadowState};
//!
//! let mut shadow = ShadowMemory::new(ShadowConfig::minimal()).unwrap();
//!
//! // A 20-byte object at 0x1000 with its redzone up to 0x1040.
//! shadow.poison_shadow_partial_right_redzone(0x1000, 20, 64, 0xfa).unwrap();
//!
//! assert_eq!(shadow.classify_addr(0x1010), Some(ShadowState::Partial { addressable: 4 }));
//! assert_eq!(shadow.region_is_poisoned(0x1000, 32), Some(0x1014));
//!
//! // Object freed: make the whole span addressable again.
//! shadow.poison_shadow(0x1000, 64, 0).unwrap();
//! assert_eq!(shadow.region_is_poisoned(0x1000, 64), None);
//! ```

pub mod api;
pub mod core;
pub mod diagnostics;
pub mod error;

#[cfg(feature = "debug")]
mod debug;
mod sync;
mod util;

// Re-export public API at crate root for convenience
pub use api::config::{ShadowConfig, OPTIONS_ENV};
pub use api::reclaim::ReclaimQueue;
pub use api::shadow::ShadowMemory;
pub use api::shared::SharedShadow;
pub use api::stats::ShadowStats;
pub use error::ShadowError;

// Core building blocks
pub use crate::core::filler::{FillReport, FillStrategy, FlatFiller, MarkerFiller, ShadowFiller};
pub use crate::core::gate::PoisonGate;
pub use crate::core::mapper::{AddressMapper, AffineMapper};
pub use crate::core::marker::{classify, ShadowState};
pub use crate::core::reclaimer::{PageReleaser, ShadowRegion, ZeroingReleaser};

// Diagnostics - Core types and predefined codes
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use diagnostics::{set_strict_mode, StrictMode, StrictModeGuard};
pub use diagnostics::{SP001, SP002, SP003, SP004, SP101, SP102, SP201};
