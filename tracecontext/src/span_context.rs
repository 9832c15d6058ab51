use crate::{SpanId, TraceFlags, TraceId};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Opaque `tracestate` header value.
///
/// The value is forwarded byte-for-byte and is never parsed: vendor entries
/// belong to their vendors, and application metadata does not go here.
///
/// See the [W3C specification] for the format other systems use.
///
/// [W3C specification]: https://www.w3.org/TR/trace-context/#tracestate-header
#[derive(Clone, Default, Eq, PartialEq, Hash)]
pub struct TraceState(Option<Arc<str>>);

impl TraceState {
    /// The empty `TraceState`, as a constant
    pub const NONE: TraceState = TraceState(None);

    /// Wraps a raw header value. Empty values are treated as absent.
    pub fn from_header(value: &str) -> Self {
        if value.is_empty() {
            TraceState::NONE
        } else {
            TraceState(Some(Arc::from(value)))
        }
    }

    /// The raw header value, exactly as received.
    pub fn header(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Returns `true` if no `tracestate` was received.
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for TraceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TraceState").field(&self.header()).finish()
    }
}

/// Immutable identity of one span, as carried in a `traceparent` header.
///
/// This representation conforms to the [W3C TraceContext specification].
/// A context decoded from inbound headers is *remote*; one generated by this
/// process is *local*. Being remote is the only thing that distinguishes a
/// span recorded elsewhere from one recorded here.
///
/// [W3C TraceContext specification]: https://www.w3.org/TR/trace-context
#[derive(Clone, Copy, Debug, PartialEq, Hash, Eq)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
}

impl SpanContext {
    /// An invalid span context
    pub const NONE: SpanContext = SpanContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        trace_flags: TraceFlags::NOT_SAMPLED,
        is_remote: false,
    };

    /// Construct a new `SpanContext`
    pub const fn new(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        is_remote: bool,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
        }
    }

    /// A local context for a new span in the same trace, keeping the flags.
    pub fn child(&self, span_id: SpanId) -> Self {
        SpanContext {
            trace_id: self.trace_id,
            span_id,
            trace_flags: self.trace_flags,
            is_remote: false,
        }
    }

    /// The [`TraceId`] for this span context.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The [`SpanId`] for this span context.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Returns details about the trace.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Returns `true` if the span context has a valid (non-zero) `trace_id` and a
    /// valid (non-zero) `span_id`.
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }

    /// Returns `true` if the span context was propagated from a remote parent.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Returns `true` if the `sampled` trace flag is set.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }
}
