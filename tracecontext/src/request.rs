//! Request correlation at handler entry.
//!
//! [`Correlator`] bundles everything a service needs on the inbound side:
//! it extracts the caller's span context, creates the local server span
//! (a child of the caller's, or the root of a new trace), names it, and
//! makes it ambient for the rest of the handler.
//!
//! ```
//! use std::collections::HashMap;
//! use tracecontext::{Context, RequestScope};
//!
//! let mut inbound = HashMap::new();
//! inbound.insert(
//!     "traceparent".to_string(),
//!     "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
//! );
//!
//! let scope = RequestScope::begin("validate", &inbound);
//! assert!(!scope.is_root());
//! assert_eq!(scope.name().name, "validate");
//!
//! // Outbound calls made from here carry the local span.
//! let outbound = scope.outbound_headers().unwrap();
//! assert!(outbound["traceparent"].starts_with("00-4bf92f3577b34da6a3ce929d0e0e4736-"));
//!
//! let summary = scope.finish().unwrap();
//! assert_eq!(summary.parent_span_id.unwrap().to_string(), "00f067aa0ba902b7");
//! assert!(Context::current().span_context().is_none());
//! ```
use crate::context::report_unbalanced;
use crate::error::{DecodeError, PropagationResult};
use crate::id_generator::{IdGenerator, RandomIdGenerator};
use crate::naming::{NamingPolicy, RootDecisionPolicy, SpanName};
use crate::propagation::{ContextExtractor, ContextPropagator, Extraction, Extractor, Injector};
use crate::settings::SharedSettings;
use crate::{
    global, tc_info, tc_warn, Context, ContextGuard, SpanContext, SpanId, TraceFlags, TraceId,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Builds the local span for each inbound request.
///
/// Cloning is cheap; one instance is meant to be shared by every handler of
/// a service.
#[derive(Clone, Debug)]
pub struct Correlator {
    id_generator: Arc<dyn IdGenerator>,
    naming: Arc<dyn NamingPolicy>,
    extractor: ContextExtractor,
    propagator: ContextPropagator,
    settings: SharedSettings,
}

impl Default for Correlator {
    fn default() -> Self {
        Correlator {
            id_generator: Arc::new(RandomIdGenerator::default()),
            naming: Arc::new(RootDecisionPolicy::default()),
            extractor: ContextExtractor::default(),
            propagator: ContextPropagator::default(),
            settings: global::settings().clone(),
        }
    }
}

impl Correlator {
    /// A correlator using random ids, the default naming policy and the
    /// global settings and stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the id generator used for local spans and new traces.
    pub fn with_id_generator<T: IdGenerator + 'static>(mut self, id_generator: T) -> Self {
        self.id_generator = Arc::new(id_generator);
        self
    }

    /// Sets the naming policy.
    pub fn with_naming_policy<T: NamingPolicy + 'static>(mut self, naming: T) -> Self {
        self.naming = Arc::new(naming);
        self
    }

    /// Sets the extractor used on inbound headers.
    pub fn with_extractor(mut self, extractor: ContextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Sets the propagator used for outbound headers.
    pub fn with_propagator(mut self, propagator: ContextPropagator) -> Self {
        self.propagator = propagator;
        self
    }

    /// Uses `settings` here and in the extractor and propagator.
    pub fn with_settings(mut self, settings: SharedSettings) -> Self {
        self.extractor = self.extractor.with_settings(settings.clone());
        self.propagator = self.propagator.with_settings(settings.clone());
        self.settings = settings;
        self
    }

    /// The propagator for outbound calls.
    pub fn propagator(&self) -> &ContextPropagator {
        &self.propagator
    }

    /// Resolves the local span for a request without attaching it.
    ///
    /// Use this from async handlers: attach the span's context to the
    /// handler future with [`FutureContextExt`](crate::FutureContextExt)
    /// instead of holding a [`RequestScope`] across `.await`.
    pub fn start_span<E: Extractor + ?Sized>(&self, operation: &str, carrier: &E) -> RequestSpan {
        let Extraction {
            context,
            trace_state,
            is_root,
            rejection,
        } = self.extractor.extract(carrier);

        let span_id = self.id_generator.new_span_id();
        let context = match context {
            Some(remote) => Context::new()
                .with_span(remote.child(span_id), Some(remote.span_id()))
                .with_trace_state(trace_state),
            None => Context::new().with_span(
                SpanContext::new(
                    self.id_generator.new_trace_id(),
                    span_id,
                    TraceFlags::SAMPLED,
                    false,
                ),
                None,
            ),
        };

        RequestSpan {
            name: self.naming.name(operation, is_root),
            context,
            is_root,
            rejection,
        }
    }

    /// Starts a request: resolves its local span and makes it ambient until
    /// the returned scope is finished or dropped.
    pub fn begin_request<E: Extractor + ?Sized>(
        &self,
        operation: &str,
        carrier: &E,
    ) -> RequestScope {
        let span = self.start_span(operation, carrier);
        self.enter(span)
    }

    /// Makes a span returned by [`Correlator::start_span`] ambient.
    pub fn enter(&self, span: RequestSpan) -> RequestScope {
        let settings = self.settings.snapshot();
        if settings.demo_mode {
            tc_info!(
                name: "Request.Begin",
                span_name = &*span.name.name,
                is_root = span.is_root,
                span_id = span.span_id().to_string(),
                trace_id = span.trace_id().to_string()
            );
        }

        let depth = Context::scope_depth();
        let guard = span.context.clone().attach();
        RequestScope {
            span,
            start: Instant::now(),
            failure: None,
            depth,
            guard: Some(guard),
            propagator: self.propagator.clone(),
            strict: cfg!(feature = "strict-scope") || settings.strict_scope,
            demo_mode: settings.demo_mode,
        }
    }
}

/// The local server span for one request, not yet attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSpan {
    name: SpanName,
    context: Context,
    is_root: bool,
    rejection: Option<DecodeError>,
}

impl RequestSpan {
    /// The span's display name and kind.
    pub fn name(&self) -> &SpanName {
        &self.name
    }

    /// The context to make ambient while handling the request.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// `true` when the request started a new trace.
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Why the inbound `traceparent` was rejected, if it was.
    pub fn rejection(&self) -> Option<DecodeError> {
        self.rejection
    }

    /// The caller's span, for continued traces.
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.context.parent_span_id()
    }

    /// The local span's id.
    pub fn span_id(&self) -> SpanId {
        self.span_context().span_id()
    }

    /// The trace the local span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.span_context().trace_id()
    }

    /// The local span's context.
    pub fn span_context(&self) -> SpanContext {
        self.context
            .span_context()
            .copied()
            .unwrap_or(SpanContext::NONE)
    }
}

/// An attached request span.
///
/// The span stays ambient until [`RequestScope::finish`] is called or the
/// scope is dropped, on every exit path. Either way the scope stack is
/// checked: scopes attached inside the handler and never detached are
/// dropped and reported.
#[must_use = "dropping the scope immediately ends the request"]
pub struct RequestScope {
    span: RequestSpan,
    start: Instant,
    failure: Option<String>,
    depth: usize,
    guard: Option<ContextGuard>,
    propagator: ContextPropagator,
    strict: bool,
    demo_mode: bool,
}

/// What a finished request looked like.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct RequestSummary {
    /// The span's display name and kind.
    pub name: SpanName,
    /// The local span's context.
    pub span_context: SpanContext,
    /// The caller's span, for continued traces.
    pub parent_span_id: Option<SpanId>,
    /// `true` when the request started a new trace.
    pub is_root: bool,
    /// Time between entering and finishing the scope.
    pub elapsed: Duration,
    /// Reason given to [`RequestScope::fail`], if any.
    pub failure: Option<String>,
}

impl RequestScope {
    /// Starts a request with a default [`Correlator`].
    pub fn begin<E: Extractor + ?Sized>(operation: &str, carrier: &E) -> Self {
        Correlator::default().begin_request(operation, carrier)
    }

    /// Marks the local span as failed. Only the last reason is kept.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
    }

    /// The attached span.
    pub fn span(&self) -> &RequestSpan {
        &self.span
    }

    /// The local span's context.
    pub fn span_context(&self) -> SpanContext {
        self.span.span_context()
    }

    /// The span's display name and kind.
    pub fn name(&self) -> &SpanName {
        self.span.name()
    }

    /// `true` when the request started a new trace.
    pub fn is_root(&self) -> bool {
        self.span.is_root()
    }

    /// The caller's span, for continued traces.
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.span.parent_span_id()
    }

    /// Time since the scope was entered.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Headers for an outbound call made on behalf of this request.
    pub fn outbound_headers(&self) -> PropagationResult<HashMap<String, String>> {
        self.propagator.headers_for(&self.span.context)
    }

    /// Injects this request's span into an outbound carrier.
    pub fn inject(&self, injector: &mut dyn Injector) -> PropagationResult<()> {
        self.propagator.inject(&self.span.context, injector)
    }

    /// Ends the request.
    ///
    /// Returns [`PropagationError::UnbalancedScope`](crate::PropagationError::UnbalancedScope)
    /// if scopes attached
    /// inside the handler were still attached; they are detached before
    /// returning.
    pub fn finish(mut self) -> PropagationResult<RequestSummary> {
        let balance = self.close();
        let summary = RequestSummary {
            name: self.span.name.clone(),
            span_context: self.span.span_context(),
            parent_span_id: self.span.parent_span_id(),
            is_root: self.span.is_root,
            elapsed: self.start.elapsed(),
            failure: self.failure.take(),
        };

        match balance {
            Ok(()) => Ok(summary),
            Err(err) => {
                global::stats().record_unbalanced_scope();
                tc_warn!(
                    name: "Request.UnbalancedScope",
                    span_name = &*summary.name.name,
                    message = err.to_string()
                );
                Err(err)
            }
        }
    }

    fn close(&mut self) -> PropagationResult<()> {
        let Some(guard) = self.guard.take() else {
            return Ok(());
        };

        let leaked = Context::truncate_scopes(self.depth + 1);
        let detached = guard.detach();

        if self.demo_mode {
            tc_info!(
                name: "Request.End",
                span_name = &*self.span.name.name,
                span_id = self.span.span_id().to_string(),
                elapsed_ms = self.start.elapsed().as_millis() as u64,
                failed = self.failure.is_some()
            );
        }

        leaked.and(detached)
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            report_unbalanced(&err, self.strict);
        }
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("span", &self.span)
            .field("depth", &self.depth)
            .field("attached", &self.guard.is_some())
            .field("failure", &self.failure)
            .finish()
    }
}
