//! Diagnostic macros.
//!
//! All of these compile to nothing in release builds unless the
//! `diagnostics` feature is enabled.

/// Emit an ad-hoc diagnostic.
///
/// # Example
///
/// ```rust
/// shadowpoison::sp_diagnostic!(
///     Warning,
///     code = "SP900",
///     message = "shadow window is unusually small",
///     help = "raise app_size"
/// );
/// ```
#[macro_export]
macro_rules! sp_diagnostic {
    (
        $kind:ident,
        code = $code:expr,
        message = $msg:expr
        $(, note = $note:expr)?
        $(, help = $help:expr)?
    ) => {{
        #[cfg(any(debug_assertions, feature = "diagnostics"))]
        {
            let diag = $crate::diagnostics::Diagnostic {
                kind: $crate::diagnostics::DiagnosticKind::$kind,
                code: $code,
                message: $msg,
                note: None $(.or(Some($note)))?,
                help: None $(.or(Some($help)))?,
            };
            $crate::diagnostics::emit(&diag);
        }
    }};
}

/// Emit a predefined diagnostic by code, optionally with a context string.
///
/// ```rust
/// shadowpoison::sp_emit!(SP201);
/// shadowpoison::sp_emit!(SP201, "shadow 0x7fff8000..0x7fff9000");
/// ```
#[macro_export]
macro_rules! sp_emit {
    ($code:ident) => {{
        #[cfg(any(debug_assertions, feature = "diagnostics"))]
        {
            $crate::diagnostics::emit(&$crate::diagnostics::$code);
        }
    }};
    ($code:ident, $ctx:expr) => {{
        #[cfg(any(debug_assertions, feature = "diagnostics"))]
        {
            $crate::diagnostics::emit_with_context(&$crate::diagnostics::$code, &$ctx);
        }
    }};
}

/// Emit a predefined diagnostic when a condition does not hold.
///
/// ```rust
/// let released_pages_clean = true;
/// shadowpoison::sp_assert!(released_pages_clean, SP201);
/// ```
#[macro_export]
macro_rules! sp_assert {
    ($cond:expr, $code:ident) => {{
        #[cfg(any(debug_assertions, feature = "diagnostics"))]
        {
            if !$cond {
                $crate::sp_emit!($code);
            }
        }
    }};
    ($cond:expr, $code:ident, $ctx:expr) => {{
        #[cfg(any(debug_assertions, feature = "diagnostics"))]
        {
            if !$cond {
                $crate::sp_emit!($code, $ctx);
            }
        }
    }};
}
