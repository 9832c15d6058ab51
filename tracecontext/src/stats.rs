//! Counters for extraction, injection and scope outcomes.
use crate::error::DecodeError;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated on every extraction, injection and scope
/// imbalance.
///
/// Counters only ever grow; read them with [`PropagationStats::snapshot`].
#[derive(Debug, Default)]
pub struct PropagationStats {
    extracted: AtomicU64,
    missing: AtomicU64,
    malformed_header: AtomicU64,
    unsupported_version: AtomicU64,
    invalid_trace_id: AtomicU64,
    invalid_span_id: AtomicU64,
    injected: AtomicU64,
    inject_failures: AtomicU64,
    unbalanced_scopes: AtomicU64,
}

/// Point-in-time copy of [`PropagationStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct StatsSnapshot {
    /// Inbound requests that carried a valid `traceparent`.
    pub extracted: u64,
    /// Inbound requests without a `traceparent`.
    pub missing: u64,
    /// Rejections with [`DecodeError::MalformedHeader`].
    pub malformed_header: u64,
    /// Rejections with [`DecodeError::UnsupportedVersion`].
    pub unsupported_version: u64,
    /// Rejections with [`DecodeError::InvalidTraceId`].
    pub invalid_trace_id: u64,
    /// Rejections with [`DecodeError::InvalidSpanId`].
    pub invalid_span_id: u64,
    /// Outbound header sets written.
    pub injected: u64,
    /// `inject` calls made with no active context.
    pub inject_failures: u64,
    /// Scopes detached out of order or left attached.
    pub unbalanced_scopes: u64,
}

impl StatsSnapshot {
    /// All rejected inbound headers, whatever the reason.
    pub fn rejected(&self) -> u64 {
        self.malformed_header + self.unsupported_version + self.invalid_trace_id + self.invalid_span_id
    }

    /// Inbound requests that started a new root trace.
    pub fn roots(&self) -> u64 {
        self.missing + self.rejected()
    }
}

impl PropagationStats {
    /// Zeroed counters.
    pub const fn new() -> Self {
        PropagationStats {
            extracted: AtomicU64::new(0),
            missing: AtomicU64::new(0),
            malformed_header: AtomicU64::new(0),
            unsupported_version: AtomicU64::new(0),
            invalid_trace_id: AtomicU64::new(0),
            invalid_span_id: AtomicU64::new(0),
            injected: AtomicU64::new(0),
            inject_failures: AtomicU64::new(0),
            unbalanced_scopes: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_extracted(&self) {
        self.extracted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_missing(&self) {
        self.missing.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self, err: DecodeError) {
        let counter = match err {
            DecodeError::MalformedHeader => &self.malformed_header,
            DecodeError::UnsupportedVersion => &self.unsupported_version,
            DecodeError::InvalidTraceId => &self.invalid_trace_id,
            DecodeError::InvalidSpanId => &self.invalid_span_id,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_injected(&self) {
        self.injected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_inject_failure(&self) {
        self.inject_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unbalanced_scope(&self) {
        self.unbalanced_scopes.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter.
    ///
    /// Counters are read one by one, so a snapshot taken under load may mix
    /// values from slightly different instants.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            extracted: self.extracted.load(Ordering::Relaxed),
            missing: self.missing.load(Ordering::Relaxed),
            malformed_header: self.malformed_header.load(Ordering::Relaxed),
            unsupported_version: self.unsupported_version.load(Ordering::Relaxed),
            invalid_trace_id: self.invalid_trace_id.load(Ordering::Relaxed),
            invalid_span_id: self.invalid_span_id.load(Ordering::Relaxed),
            injected: self.injected.load(Ordering::Relaxed),
            inject_failures: self.inject_failures.load(Ordering::Relaxed),
            unbalanced_scopes: self.unbalanced_scopes.load(Ordering::Relaxed),
        }
    }
}
