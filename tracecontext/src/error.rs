//! Error types for decoding and propagation.
use thiserror::Error;

/// Why a `traceparent` value could not be turned into a span context.
///
/// Every variant is non-fatal: the extractor resolves all of them to "no
/// context" and the request starts a new root trace.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DecodeError {
    /// Wrong number of `-` separated fields, bad flags, or more than one header value.
    #[error("traceparent is malformed")]
    MalformedHeader,

    /// The version field is anything other than `00`.
    #[error("traceparent version is not supported, only 00 is accepted")]
    UnsupportedVersion,

    /// Trace id is not 32 lowercase hex characters, or is all zeros.
    #[error("trace id must be 32 lowercase hex characters and not all zero")]
    InvalidTraceId,

    /// Span id is not 16 lowercase hex characters, or is all zeros.
    #[error("span id must be 16 lowercase hex characters and not all zero")]
    InvalidSpanId,
}

impl DecodeError {
    /// Short stable label, used as a log field.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeError::MalformedHeader => "malformed_header",
            DecodeError::UnsupportedVersion => "unsupported_version",
            DecodeError::InvalidTraceId => "invalid_trace_id",
            DecodeError::InvalidSpanId => "invalid_span_id",
        }
    }
}

/// Errors caused by misuse of the propagation API.
///
/// Unlike [`DecodeError`] these point at a bug in the calling handler rather
/// than at untrusted input, so they are returned to the caller.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum PropagationError {
    /// `inject` was called while no valid span context was ambient.
    ///
    /// Omitting the header instead would make the downstream hop start a
    /// disconnected root trace.
    #[error("no active span context to propagate")]
    NoActiveContext,

    /// A scope was detached while it was not the innermost one, or a request
    /// ended with scopes still attached.
    #[error("unbalanced context scope: expected depth {expected}, found {found}")]
    UnbalancedScope {
        /// Depth the scope stack should have had.
        expected: usize,
        /// Depth the scope stack actually had.
        found: usize,
    },
}

/// Result type for propagation operations.
pub type PropagationResult<T> = Result<T, PropagationError>;
