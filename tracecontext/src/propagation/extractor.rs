use super::Extractor;
use crate::codec::{self, TRACEPARENT_HEADER, TRACESTATE_HEADER};
use crate::error::DecodeError;
use crate::settings::SharedSettings;
use crate::stats::PropagationStats;
use crate::{global, tc_debug, tc_info, Context, ContextGuard, SpanContext, TraceState};
use std::sync::Arc;

/// Outcome of reading an inbound request's headers.
///
/// Untrusted input never produces an error here: a missing or invalid
/// `traceparent` yields `context: None` and `is_root: true`, and the
/// request starts a new trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extraction {
    /// The remote span context, if a valid `traceparent` was found.
    pub context: Option<SpanContext>,
    /// The opaque `tracestate` sent alongside a valid `traceparent`.
    pub trace_state: TraceState,
    /// `true` when the request starts a new trace.
    pub is_root: bool,
    /// Why a `traceparent` that was present got rejected.
    pub rejection: Option<DecodeError>,
}

impl Extraction {
    fn root(rejection: Option<DecodeError>) -> Self {
        Extraction {
            context: None,
            trace_state: TraceState::NONE,
            is_root: true,
            rejection,
        }
    }

    fn remote(context: SpanContext, trace_state: TraceState) -> Self {
        Extraction {
            context: Some(context),
            trace_state,
            is_root: false,
            rejection: None,
        }
    }

    /// The extraction as a [`Context`]; empty for roots.
    pub fn into_context(self) -> Context {
        match self.context {
            Some(span_context) => Context::new()
                .with_remote_span_context(span_context)
                .with_trace_state(self.trace_state),
            None => Context::new(),
        }
    }

    /// Makes the remote context ambient. Roots attach nothing.
    pub fn attach(self) -> Option<ContextGuard> {
        if self.is_root {
            None
        } else {
            Some(self.into_context().attach())
        }
    }
}

/// Reads `traceparent` (and `tracestate`) from inbound carriers.
///
/// Outcomes are counted in [`PropagationStats`]; rejections are logged at
/// debug level with their reason.
#[derive(Clone, Debug)]
pub struct ContextExtractor {
    stats: Arc<PropagationStats>,
    settings: SharedSettings,
}

impl Default for ContextExtractor {
    fn default() -> Self {
        ContextExtractor {
            stats: Arc::clone(global::stats()),
            settings: global::settings().clone(),
        }
    }
}

impl ContextExtractor {
    /// An extractor reporting into the global stats and settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports into `stats` instead of the global counters.
    pub fn with_stats(mut self, stats: Arc<PropagationStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Reads settings from `settings` instead of the global ones.
    pub fn with_settings(mut self, settings: SharedSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Resolves the carrier's headers to a remote span context or a root.
    pub fn extract<E: Extractor + ?Sized>(&self, extractor: &E) -> Extraction {
        let values = match extractor.get_all(TRACEPARENT_HEADER) {
            Some(values) if !values.is_empty() => values,
            _ => {
                self.stats.record_missing();
                tc_debug!(name: "Extractor.NoTraceparent");
                return Extraction::root(None);
            }
        };

        let decoded = match values.as_slice() {
            [value] => codec::decode(value),
            _ => Err(DecodeError::MalformedHeader),
        };

        match decoded {
            Ok(span_context) => {
                self.stats.record_extracted();
                let trace_state = extractor
                    .get_all(TRACESTATE_HEADER)
                    .map(|values| TraceState::from_header(&values.join(",")))
                    .unwrap_or_default();
                if self.settings.snapshot().demo_mode {
                    tc_info!(
                        name: "Extractor.Continued",
                        traceparent = &*values[0],
                        tracestate = trace_state.header().unwrap_or("")
                    );
                }
                Extraction::remote(span_context, trace_state)
            }
            Err(err) => {
                self.stats.record_rejected(err);
                tc_debug!(
                    name: "Extractor.Rejected",
                    reason = err.as_str(),
                    values = values.len()
                );
                if self.settings.snapshot().demo_mode {
                    tc_info!(
                        name: "Extractor.Rejected",
                        reason = err.as_str(),
                        traceparent = &*values[0]
                    );
                }
                Extraction::root(Some(err))
            }
        }
    }
}
