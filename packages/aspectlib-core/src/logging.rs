//! Compile-time gated signal tracing.

/// Trace every signal exchange only when the `signal_debug_logs` Cargo
/// feature is enabled.
///
/// With the feature disabled (default), this macro compiles to a no-op while
/// still type-checking format arguments.
macro_rules! signal_log {
    ($($arg:tt)*) => {{
        #[cfg(feature = "signal_debug_logs")]
        {
            log::trace!($($arg)*);
        }
        #[cfg(not(feature = "signal_debug_logs"))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

pub(crate) use signal_log;
