//! Diagnostics emitted by the propagation engine itself.
//!
//! Each event is named `"Component.Event"` and carries a few key/value
//! fields. The names an operator is most likely to filter on:
//!
//! | event | level | when |
//! |---|---|---|
//! | `Extractor.Rejected` | debug | an inbound `traceparent` failed to decode, with its `reason` |
//! | `Extractor.NoTraceparent` | debug | the request carried no `traceparent` |
//! | `Propagator.NoActiveContext` | debug | an outbound call was made outside any span |
//! | `Context.UnbalancedScope` | warn | a scope guard was dropped out of order |
//! | `Context.StaleGuard` | warn | a guard outlived the scope it was attached in |
//! | `Request.UnbalancedScope` | warn | a request ended with scopes still attached |
//! | `Settings.InvalidEnvValue` | warn | a `TRACECONTEXT_*` variable could not be parsed |
//!
//! With demo mode on, `Extractor.Continued`, `Propagator.Injected`,
//! `Request.Begin` and `Request.End` are logged at info level for every
//! request.
//!
//! Events go to `tracing` when the calling crate's `internal-logs` feature
//! is on, with the calling crate's name as target. Unit tests also print them
//! to stdout, visible with `--nocapture`.
//!
//! These macros are meant for this crate and for carrier adapters built on
//! it, not for application logging.

/// Shared body of the `tc_*` macros. `$level` is the `tracing` macro to use.
// `name` is repeated as a field until `tracing::Fmt` displays event names.
// See issue: https://github.com/tokio-rs/tracing/issues/2774
#[doc(hidden)]
#[macro_export]
macro_rules! __tc_log {
    ($level:ident, name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::$level!(
                name: $name,
                target: env!("CARGO_PKG_NAME"),
                name = $name
                $(, $key = $value)*
            );
        }

        #[cfg(test)]
        {
            print!("tc_{}: name={}", stringify!($level), $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )*
            print!("\n");
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),*);
        }
    };
}

/// Logs an informational event. Only used in demo mode.
///
/// ```rust
/// use tracecontext::tc_info;
/// tc_info!(name: "Request.Begin", span_name = "query (root)", is_root = true);
/// ```
#[macro_export]
macro_rules! tc_info {
    ($($args:tt)*) => {
        $crate::__tc_log!(info, $($args)*)
    };
}

/// Logs a warning, for misuse that the engine repaired.
///
/// ```rust
/// use tracecontext::tc_warn;
/// tc_warn!(name: "Context.UnbalancedScope", expected = 2, found = 3);
/// ```
#[macro_export]
macro_rules! tc_warn {
    ($($args:tt)*) => {
        $crate::__tc_log!(warn, $($args)*)
    };
}

/// Logs a debug event, for untrusted input that was set aside.
///
/// ```rust
/// use tracecontext::tc_debug;
/// tc_debug!(name: "Extractor.Rejected", reason = "unsupported_version");
/// tc_debug!(name: "Extractor.NoTraceparent");
/// ```
#[macro_export]
macro_rules! tc_debug {
    ($($args:tt)*) => {
        $crate::__tc_log!(debug, $($args)*)
    };
}

/// Logs an error, right before a strict-mode panic.
///
/// ```rust
/// use tracecontext::tc_error;
/// tc_error!(name: "Context.UnbalancedScope", message = "expected depth 1, found 2");
/// ```
#[macro_export]
macro_rules! tc_error {
    ($($args:tt)*) => {
        $crate::__tc_log!(error, $($args)*)
    };
}
