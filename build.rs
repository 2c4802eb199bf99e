//! Build script for shadowpoison.
//!
//! Emits feature notes so integrators can see which optional layers are on.

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DEBUG");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_PARKING_LOT");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_MINIMAL");

    let debug_enabled = env::var("CARGO_FEATURE_DEBUG").is_ok();
    let minimal_enabled = env::var("CARGO_FEATURE_MINIMAL").is_ok();

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    // =========================================================================
    // Feature-specific diagnostics
    // =========================================================================

    if debug_enabled && is_release {
        emit_warning("'debug' feature enabled in a release build");
        emit_note("Gate backtraces are captured on every set_can_poison_memory(false).");
    }

    if is_release {
        emit_note("Poisoning preconditions are debug assertions and are not checked in release.");
    }

    if minimal_enabled {
        emit_note("Minimal mode: ShadowStats counters stay at zero.");
    }

    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("wasm") {
        emit_warning("WebAssembly target detected");
        emit_note("The default page releaser only zeroes shadow; no memory is returned to the host.");
    }
}

// =============================================================================
// Diagnostic emission helpers
// =============================================================================

fn emit_note(msg: &str) {
    println!("cargo:warning=[shadowpoison]    {}", msg);
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[shadowpoison] ⚠️  {}", msg);
}
