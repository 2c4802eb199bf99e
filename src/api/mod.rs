//! Public API for shadowpoison.
//!
//! This module contains all user-facing types.
//! Most users only need [`ShadowMemory`](shadow::ShadowMemory) and
//! [`ShadowConfig`](config::ShadowConfig).

pub mod config;
pub mod reclaim;
pub mod shadow;
pub mod shared;
pub mod stats;
