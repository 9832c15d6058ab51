use super::Injector;
use crate::codec::{self, TRACEPARENT_HEADER, TRACESTATE_HEADER};
use crate::error::{PropagationError, PropagationResult};
use crate::settings::SharedSettings;
use crate::stats::PropagationStats;
use crate::{global, tc_debug, tc_info, Context};
use std::collections::HashMap;
use std::sync::Arc;

static TRACE_CONTEXT_HEADER_FIELDS: [&str; 2] = [TRACEPARENT_HEADER, TRACESTATE_HEADER];

/// Writes the ambient span context onto outbound requests.
///
/// Headers are computed from the context at the moment of the call, so two
/// concurrent requests never share a header buffer.
///
/// ```
/// use tracecontext::propagation::ContextPropagator;
/// use tracecontext::{Context, PropagationError, SpanContext, SpanId, TraceFlags, TraceId};
///
/// let propagator = ContextPropagator::new();
/// assert_eq!(propagator.headers(), Err(PropagationError::NoActiveContext));
///
/// let span = SpanContext::new(TraceId::from(1), SpanId::from(2), TraceFlags::SAMPLED, false);
/// let _guard = Context::new().with_span(span, None).attach();
/// let headers = propagator.headers().unwrap();
/// assert_eq!(
///     headers["traceparent"],
///     "00-00000000000000000000000000000001-0000000000000002-01"
/// );
/// ```
#[derive(Clone, Debug)]
pub struct ContextPropagator {
    stats: Arc<PropagationStats>,
    settings: SharedSettings,
}

impl Default for ContextPropagator {
    fn default() -> Self {
        ContextPropagator {
            stats: Arc::clone(global::stats()),
            settings: global::settings().clone(),
        }
    }
}

impl ContextPropagator {
    /// A propagator reporting into the global stats and settings.
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

    /// Properly encodes the span context of `cx` and injects it into the
    /// `Injector`, followed by its `tracestate` if there is one and
    /// forwarding is enabled.
    ///
    /// Returns [`PropagationError::NoActiveContext`] without touching the
    /// injector when `cx` has no valid span context.
    pub fn inject(&self, cx: &Context, injector: &mut dyn Injector) -> PropagationResult<()> {
        let span_context = match cx.span_context() {
            Some(span_context) if span_context.is_valid() => span_context,
            _ => {
                self.stats.record_inject_failure();
                tc_debug!(name: "Propagator.NoActiveContext");
                return Err(PropagationError::NoActiveContext);
            }
        };

        let settings = self.settings.snapshot();
        let trace_state = cx
            .trace_state()
            .header()
            .filter(|_| settings.forward_tracestate);

        injector.reserve(if trace_state.is_some() { 2 } else { 1 });
        let header_value = codec::encode(span_context);
        if settings.demo_mode {
            tc_info!(
                name: "Propagator.Injected",
                traceparent = header_value.as_str(),
                tracestate = trace_state.unwrap_or("")
            );
        }
        injector.set(TRACEPARENT_HEADER, header_value);
        if let Some(trace_state) = trace_state {
            injector.set(TRACESTATE_HEADER, trace_state.to_string());
        }

        self.stats.record_injected();
        Ok(())
    }

    /// Injects the context ambient on this thread or task.
    pub fn inject_current(&self, injector: &mut dyn Injector) -> PropagationResult<()> {
        Context::map_current(|cx| self.inject(cx, injector))
    }

    /// Outbound headers for `cx`, in a fresh map.
    pub fn headers_for(&self, cx: &Context) -> PropagationResult<HashMap<String, String>> {
        let mut headers: HashMap<String, String> = HashMap::new();
        self.inject(cx, &mut headers)?;
        Ok(headers)
    }

    /// Outbound headers for the ambient context, in a fresh map.
    pub fn headers(&self) -> PropagationResult<HashMap<String, String>> {
        Context::map_current(|cx| self.headers_for(cx))
    }

    /// Header names this propagator may write.
    pub fn fields(&self) -> &'static [&'static str] {
        &TRACE_CONTEXT_HEADER_FIELDS
    }
}
