//! # W3C `traceparent` codec
//!
//! The `traceparent` header identifies the span a request was sent from.
//! Here's an example of a `traceparent` header.
//!
//! `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
//!
//! It has four `-` separated fields:
//!
//!    - version, always `00`
//!    - trace-id, 32 lowercase hex characters
//!    - parent-id, 16 lowercase hex characters
//!    - trace-flags, 2 lowercase hex characters
//!
//! Only version `00` is accepted; anything else is rejected rather than
//! parsed forward-compatibly.
//!
//! See the [w3c trace-context docs] for more details.
//!
//! [w3c trace-context docs]: https://w3c.github.io/trace-context/
use crate::error::DecodeError;
use crate::validate::{validate_span_id, validate_trace_id};
use crate::{SpanContext, TraceFlags};

/// Header carrying the span context.
pub const TRACEPARENT_HEADER: &str = "traceparent";
/// Header carrying opaque vendor state.
pub const TRACESTATE_HEADER: &str = "tracestate";
/// The only `traceparent` version this codec reads or writes.
pub const SUPPORTED_VERSION: &str = "00";

const FIELD_COUNT: usize = 4;
const FLAGS_HEX_LEN: usize = 2;

/// Decodes a `traceparent` value into a remote [`SpanContext`].
///
/// The result is remote even when the value was produced by [`encode`] from
/// a local context in this process.
///
/// Checks run in order: field count, version, trace id, span id, flags. The
/// first failing check decides the error.
///
/// ```
/// use tracecontext::codec;
///
/// let cx = codec::decode("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01").unwrap();
/// assert_eq!(cx.trace_id().to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
/// assert!(cx.is_remote());
/// ```
pub fn decode(header: &str) -> Result<SpanContext, DecodeError> {
    let parts = header.trim().split('-').collect::<Vec<&str>>();
    if parts.len() != FIELD_COUNT {
        return Err(DecodeError::MalformedHeader);
    }

    if parts[0] != SUPPORTED_VERSION {
        return Err(DecodeError::UnsupportedVersion);
    }

    let trace_id = validate_trace_id(parts[1])?;
    let span_id = validate_span_id(parts[2])?;
    let trace_flags = decode_flags(parts[3])?;

    Ok(SpanContext::new(trace_id, span_id, trace_flags, true))
}

fn decode_flags(field: &str) -> Result<TraceFlags, DecodeError> {
    let lower_hex = field
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if field.len() != FLAGS_HEX_LEN || !lower_hex {
        return Err(DecodeError::MalformedHeader);
    }
    u8::from_str_radix(field, 16)
        .map(TraceFlags::new)
        .map_err(|_| DecodeError::MalformedHeader)
}

/// Encodes a span context as a version `00` `traceparent` value.
///
/// All flag bits are written as they are; decoding gives them back unchanged.
/// Whether the context is remote is not part of the wire format, so
/// [`decode`] of the result always yields a remote context:
/// `decode(encode(cx)) == Ok(cx)` holds for valid remote contexts, and for
/// valid local ones it holds on trace id, span id and flags.
///
/// ```
/// use tracecontext::{codec, SpanContext, SpanId, TraceFlags, TraceId};
///
/// let local = SpanContext::new(TraceId::from(1), SpanId::from(2), TraceFlags::SAMPLED, false);
/// let decoded = codec::decode(&codec::encode(&local)).unwrap();
/// assert_eq!(
///     (decoded.trace_id(), decoded.span_id(), decoded.trace_flags()),
///     (local.trace_id(), local.span_id(), local.trace_flags())
/// );
/// assert!(decoded.is_remote());
/// ```
pub fn encode(cx: &SpanContext) -> String {
    format!(
        "{}-{}-{}-{:02x}",
        SUPPORTED_VERSION,
        cx.trace_id(),
        cx.span_id(),
        cx.trace_flags()
    )
}
