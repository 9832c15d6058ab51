//! Format checks for the id fields of a `traceparent` header.
//!
//! Both checks are total: any `&str` (empty, unicode, over-length) yields
//! either a valid id or a [`DecodeError`], never a panic.
use crate::error::DecodeError;
use crate::{SpanId, TraceId};

const TRACE_ID_HEX_LEN: usize = 32;
const SPAN_ID_HEX_LEN: usize = 16;

#[inline]
fn is_lower_hex(b: u8) -> bool {
    b.is_ascii_digit() || (b'a'..=b'f').contains(&b)
}

/// Returns `true` if `s` is exactly `len` lowercase hex characters and not all zeros.
fn is_canonical_id(s: &str, len: usize) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == len && bytes.iter().all(|&b| is_lower_hex(b)) && bytes.iter().any(|&b| b != b'0')
}

/// Validates a trace id field: exactly 32 lowercase hex characters, not all `'0'`.
///
/// ```
/// use tracecontext::validate::validate_trace_id;
///
/// assert!(validate_trace_id("4bf92f3577b34da6a3ce929d0e0e4736").is_ok());
/// assert!(validate_trace_id("00000000000000000000000000000000").is_err());
/// ```
pub fn validate_trace_id(s: &str) -> Result<TraceId, DecodeError> {
    if !is_canonical_id(s, TRACE_ID_HEX_LEN) {
        return Err(DecodeError::InvalidTraceId);
    }
    u128::from_str_radix(s, 16)
        .map(TraceId::from)
        .map_err(|_| DecodeError::InvalidTraceId)
}

/// Validates a span id field: exactly 16 lowercase hex characters, not all `'0'`.
pub fn validate_span_id(s: &str) -> Result<SpanId, DecodeError> {
    if !is_canonical_id(s, SPAN_ID_HEX_LEN) {
        return Err(DecodeError::InvalidSpanId);
    }
    u64::from_str_radix(s, 16)
        .map(SpanId::from)
        .map_err(|_| DecodeError::InvalidSpanId)
}
