//! Diagnostic kinds and predefined codes.

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard error - a precondition or contract was violated.
    Error,
    /// A warning - something is probably wrong or suboptimal.
    Warning,
    /// Additional context about another diagnostic.
    Note,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
///
/// Diagnostic codes follow the pattern:
/// - `SP0xx` - Shadow writer / entry point issues
/// - `SP1xx` - Configuration issues
/// - `SP2xx` - Page reclaim issues
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "SP001").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Add a note to this diagnostic.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Add a help message to this diagnostic.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

// =============================================================================
// Predefined diagnostics (SP0xx - Shadow writer)
// =============================================================================

/// SP001: Poisoning write requested while the gate is closed.
pub const SP001: Diagnostic = Diagnostic::error(
    "SP001",
    "poisoning shadow write while poisoning is disabled"
).with_note("only unpoisoning (value 0) is permitted while the gate is closed")
 .with_help("call set_can_poison_memory(true) first, or route through poison_shadow() which skips the write");

/// SP002: Generic entry point received a misaligned range.
pub const SP002: Diagnostic = Diagnostic::error(
    "SP002",
    "shadow range is not aligned to the shadow granularity"
).with_note("both the start and the end of a poisoned range must be granule aligned")
 .with_help("round the range to the granularity, or use the redzone encoder for a partial tail");

/// SP003: Generic entry point received a range outside the shadow window.
pub const SP003: Diagnostic = Diagnostic::error(
    "SP003",
    "shadow range lies outside the configured shadow window"
).with_note("the shadow arena only covers [app_base, app_base + app_size)")
 .with_help("widen app_size in ShadowConfig");

/// SP004: Poison value collides with the unpoison marker band.
pub const SP004: Diagnostic = Diagnostic::error(
    "SP004",
    "poison value lies in the unpoison marker band"
).with_note("with the marker fill strategy, shadow bytes 8..=64 read back as addressable")
 .with_help("use a value of 65 or above (conventionally 0xf1..=0xff), or the flat fill strategy");

// =============================================================================
// Predefined diagnostics (SP1xx - Configuration)
// =============================================================================

/// SP101: Unknown key in an options string.
pub const SP101: Diagnostic = Diagnostic::warning(
    "SP101",
    "unknown shadow option ignored"
).with_help("recognised keys: poison_partial, clear_shadow_mmap_threshold, shadow_scale, shadow_offset, app_base, app_size, page_size, fill_strategy");

/// SP102: Configuration rejected.
pub const SP102: Diagnostic = Diagnostic::error(
    "SP102",
    "shadow configuration rejected"
).with_note("the marker fill strategy is only defined for 8-byte granules");

// =============================================================================
// Predefined diagnostics (SP2xx - Page reclaim)
// =============================================================================

/// SP201: Flush requested over shadow that is not addressable.
pub const SP201: Diagnostic = Diagnostic::warning(
    "SP201",
    "shadow flush over a range that still holds poison"
).with_note("released pages read back as addressable, so the poison is lost")
 .with_help("only flush ranges that were unpoisoned first");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_kinds() {
        assert_eq!(SP001.kind, DiagnosticKind::Error);
        assert_eq!(SP101.kind, DiagnosticKind::Warning);
        assert_eq!(SP201.code, "SP201");
        assert!(SP002.help.is_some());
        assert!(SP101.note.is_none());
    }
}
