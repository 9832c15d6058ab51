//! Client-side session correlation.
//!
//! A browser session owns one trace. The first time it is needed,
//! [`SessionChainTracker::initialize`] creates the session root; every
//! outbound operation after that is a span in the same trace. Operations
//! chain linearly, each one parented on the span of the operation right
//! before it, so the session reads as a sequence rather than a tree.
//!
//! ```
//! use tracecontext::session::{OperationKind, SessionChainTracker};
//!
//! let tracker = SessionChainTracker::new();
//! let root = tracker.initialize();
//!
//! let first = tracker.next_operation_headers(OperationKind::Query).unwrap();
//! assert_eq!(first.parent_span_id(), root.root_span_id());
//!
//! let second = tracker.next_operation_headers(OperationKind::Query).unwrap();
//! assert_eq!(second.parent_span_id(), first.span_context().span_id());
//! assert_eq!(second.span_context().trace_id(), root.trace_id());
//! ```
use crate::codec::{self, TRACEPARENT_HEADER};
use crate::error::{PropagationError, PropagationResult};
use crate::id_generator::{IdGenerator, RandomIdGenerator};
use crate::propagation::Injector;
use crate::{tc_debug, SpanContext, SpanId, TraceFlags, TraceId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

/// Header naming the span an operation's span is parented on.
///
/// Application metadata for the session view. Servers never use it to
/// decide the parent of their own spans; `traceparent` alone does that.
pub const PARENT_SPAN_ID_HEADER: &str = "x-parent-span-id";

/// The span every operation of a session descends from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionRoot {
    trace_id: TraceId,
    root_span_id: SpanId,
    start_time: SystemTime,
    started: Instant,
}

impl SessionRoot {
    /// The session's trace.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The root span's id.
    pub fn root_span_id(&self) -> SpanId {
        self.root_span_id
    }

    /// Wall clock time the session started.
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// Time since the session started.
    pub fn duration(&self) -> Duration {
        self.started.elapsed()
    }

    /// The root as a span context.
    pub fn span_context(&self) -> SpanContext {
        SpanContext::new(self.trace_id, self.root_span_id, TraceFlags::SAMPLED, false)
    }
}

/// What the user did to trigger an operation.
///
/// Every kind takes its place in the chain; the kind only labels it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// A query sent to the backend.
    Query,
    /// Any other user action, such as a checkout or a page load.
    Action,
}

/// Headers for one outbound operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationHeaders {
    kind: OperationKind,
    span_context: SpanContext,
    parent_span_id: SpanId,
    traceparent: String,
}

impl OperationHeaders {
    /// The kind the operation was created with.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// The span created for the operation.
    pub fn span_context(&self) -> SpanContext {
        self.span_context
    }

    /// The span the operation's span is parented on.
    pub fn parent_span_id(&self) -> SpanId {
        self.parent_span_id
    }

    /// The encoded `traceparent` value.
    pub fn traceparent(&self) -> &str {
        &self.traceparent
    }

    /// Writes `traceparent` and `x-parent-span-id`.
    pub fn inject(&self, injector: &mut dyn Injector) {
        injector.reserve(2);
        injector.set(TRACEPARENT_HEADER, self.traceparent.clone());
        injector.set(PARENT_SPAN_ID_HEADER, self.parent_span_id.to_string());
    }

    /// The headers in a fresh map.
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut headers: HashMap<String, String> = HashMap::with_capacity(2);
        self.inject(&mut headers);
        headers
    }
}

#[derive(Debug, Default)]
struct SessionState {
    root: Option<SessionRoot>,
    chain_tip: Option<SpanId>,
}

/// Tracks the session root and the tip of the operation chain.
///
/// States are uninitialized and active. Every method takes `&self`, so one
/// tracker can be shared between UI callbacks; operations are serialized by
/// an internal lock.
#[derive(Clone, Debug)]
pub struct SessionChainTracker {
    id_generator: Arc<dyn IdGenerator>,
    state: Arc<Mutex<SessionState>>,
}

impl Default for SessionChainTracker {
    fn default() -> Self {
        SessionChainTracker {
            id_generator: Arc::new(RandomIdGenerator::default()),
            state: Arc::default(),
        }
    }
}

impl SessionChainTracker {
    /// An uninitialized tracker using random ids.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the id generator used for the root and operation spans.
    pub fn with_id_generator<T: IdGenerator + 'static>(mut self, id_generator: T) -> Self {
        self.id_generator = Arc::new(id_generator);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Creates the session root, or returns the existing one.
    pub fn initialize(&self) -> SessionRoot {
        let mut state = self.lock();
        if let Some(root) = state.root {
            return root;
        }

        let root = SessionRoot {
            trace_id: self.id_generator.new_trace_id(),
            root_span_id: self.id_generator.new_span_id(),
            start_time: SystemTime::now(),
            started: Instant::now(),
        };
        tc_debug!(
            name: "Session.Initialized",
            trace_id = root.trace_id.to_string(),
            root_span_id = root.root_span_id.to_string()
        );
        state.root = Some(root);
        root
    }

    /// The session root, if initialized.
    pub fn root(&self) -> Option<SessionRoot> {
        self.lock().root
    }

    /// Returns `true` once [`SessionChainTracker::initialize`] has run.
    pub fn is_initialized(&self) -> bool {
        self.lock().root.is_some()
    }

    /// Creates the span for the next outbound operation and its headers.
    ///
    /// Returns [`PropagationError::NoActiveContext`] before
    /// [`SessionChainTracker::initialize`].
    pub fn next_operation_headers(&self, kind: OperationKind) -> PropagationResult<OperationHeaders> {
        let mut state = self.lock();
        let root = state.root.ok_or(PropagationError::NoActiveContext)?;

        let parent_span_id = state.chain_tip.unwrap_or(root.root_span_id);
        let span_context = root.span_context().child(self.id_generator.new_span_id());
        state.chain_tip = Some(span_context.span_id());

        Ok(OperationHeaders {
            kind,
            span_context,
            parent_span_id,
            traceparent: codec::encode(&span_context),
        })
    }

    /// Records the span id the server returned for the operation just made;
    /// the next operation chains off it.
    ///
    /// Invalid span ids are ignored.
    pub fn record_returned_span(&self, span_id: SpanId) -> PropagationResult<()> {
        let mut state = self.lock();
        if state.root.is_none() {
            return Err(PropagationError::NoActiveContext);
        }
        if !span_id.is_valid() {
            tc_debug!(name: "Session.InvalidReturnedSpan");
            return Ok(());
        }
        state.chain_tip = Some(span_id);
        Ok(())
    }

    /// The span the next operation will be parented on.
    pub fn chain_tip(&self) -> Option<SpanId> {
        let state = self.lock();
        state
            .chain_tip
            .or_else(|| state.root.map(|root| root.root_span_id))
    }

    /// Time since the session root was created.
    pub fn duration(&self) -> Option<Duration> {
        self.lock().root.map(|root| root.duration())
    }

    /// Forgets the session; the next [`SessionChainTracker::initialize`]
    /// starts a new trace.
    pub fn reset(&self) {
        *self.lock() = SessionState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_generator::IncrementIdGenerator;
    use crate::propagation::{ContextExtractor, Extractor};
    use crate::settings::{Settings, SharedSettings};
    use crate::stats::PropagationStats;

    fn tracker() -> SessionChainTracker {
        SessionChainTracker::new().with_id_generator(IncrementIdGenerator::new())
    }

    #[test]
    fn initialize_is_idempotent() {
        let tracker = SessionChainTracker::new();
        let first = tracker.initialize();
        let second = tracker.initialize();

        assert_eq!(first, second);
        assert_eq!(first.trace_id(), second.trace_id());
        assert_eq!(first.root_span_id(), second.root_span_id());
        assert!(first.trace_id().is_valid());
        assert!(first.root_span_id().is_valid());
    }

    #[test]
    fn uninitialized_tracker_has_no_context() {
        let tracker = tracker();

        assert!(!tracker.is_initialized());
        assert_eq!(
            tracker.next_operation_headers(OperationKind::Query),
            Err(PropagationError::NoActiveContext)
        );
        assert_eq!(
            tracker.record_returned_span(SpanId::from(5)),
            Err(PropagationError::NoActiveContext)
        );
        assert_eq!(tracker.duration(), None);
        assert_eq!(tracker.chain_tip(), None);
    }

    #[test]
    fn queries_chain_linearly() {
        let tracker = tracker();
        let root = tracker.initialize();

        let first = tracker.next_operation_headers(OperationKind::Query).unwrap();
        let second = tracker.next_operation_headers(OperationKind::Query).unwrap();
        let third = tracker.next_operation_headers(OperationKind::Query).unwrap();

        assert_eq!(first.parent_span_id(), root.root_span_id());
        assert_eq!(second.parent_span_id(), first.span_context().span_id());
        assert_eq!(third.parent_span_id(), second.span_context().span_id());
        for headers in [&first, &second, &third] {
            assert_eq!(headers.span_context().trace_id(), root.trace_id());
        }
    }

    #[test]
    fn returned_span_becomes_chain_tip() {
        let tracker = tracker();
        tracker.initialize();

        tracker.next_operation_headers(OperationKind::Query).unwrap();
        tracker.record_returned_span(SpanId::from(0xbeef)).unwrap();
        let next = tracker.next_operation_headers(OperationKind::Query).unwrap();
        assert_eq!(next.parent_span_id(), SpanId::from(0xbeef));

        tracker.record_returned_span(SpanId::INVALID).unwrap();
        assert_eq!(tracker.chain_tip(), Some(next.span_context().span_id()));
    }

    #[test]
    fn every_kind_extends_the_chain() {
        let tracker = tracker();
        let root = tracker.initialize();

        let query = tracker.next_operation_headers(OperationKind::Query).unwrap();
        let action = tracker.next_operation_headers(OperationKind::Action).unwrap();
        let next = tracker.next_operation_headers(OperationKind::Query).unwrap();

        assert_eq!(query.parent_span_id(), root.root_span_id());
        assert_eq!(action.kind(), OperationKind::Action);
        assert_eq!(action.parent_span_id(), query.span_context().span_id());
        assert_eq!(action.span_context().trace_id(), root.trace_id());
        assert_eq!(next.parent_span_id(), action.span_context().span_id());
        assert_eq!(tracker.chain_tip(), Some(next.span_context().span_id()));
    }

    #[test]
    fn headers_are_valid_traceparents() {
        let tracker = tracker();
        tracker.initialize();
        let headers = tracker
            .next_operation_headers(OperationKind::Query)
            .unwrap()
            .to_map();

        assert_eq!(
            headers[TRACEPARENT_HEADER],
            "00-00000000000000000000000000000001-0000000000000003-01"
        );
        assert_eq!(headers[PARENT_SPAN_ID_HEADER], "0000000000000002");

        // The server continues the operation's span, never the metadata header.
        let extraction = ContextExtractor::new()
            .with_stats(Arc::new(PropagationStats::new()))
            .with_settings(SharedSettings::new(Settings::default()))
            .extract(&headers);
        assert_eq!(
            extraction.context.map(|cx| cx.span_id()),
            Some(SpanId::from(3))
        );
        assert!(Extractor::get(&headers, "X-Parent-Span-Id").is_some());
    }

    #[test]
    fn reset_starts_a_new_trace() {
        let tracker = tracker();
        let first = tracker.initialize();
        tracker.next_operation_headers(OperationKind::Query).unwrap();

        tracker.reset();
        assert!(!tracker.is_initialized());

        let second = tracker.initialize();
        assert_ne!(first.trace_id(), second.trace_id());
        assert_eq!(tracker.chain_tip(), Some(second.root_span_id()));
    }

    #[test]
    fn duration_grows() {
        let tracker = tracker();
        tracker.initialize();
        let before = tracker.duration().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(tracker.duration().unwrap() > before);
    }

    #[test]
    fn concurrent_queries_form_one_chain() {
        let tracker = tracker();
        let root = tracker.initialize();

        let mut all = std::thread::scope(|scope| {
            let handles = (0..4)
                .map(|_| {
                    let tracker = tracker.clone();
                    scope.spawn(move || {
                        (0..25)
                            .map(|_| tracker.next_operation_headers(OperationKind::Query).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>()
        });

        // Ids are handed out under the lock, so sorting by span id recovers
        // the order the chain was built in.
        all.sort_by_key(|headers| headers.span_context().span_id().to_bytes());
        assert_eq!(all[0].parent_span_id(), root.root_span_id());
        for pair in all.windows(2) {
            assert_eq!(pair[1].parent_span_id(), pair[0].span_context().span_id());
        }
    }
}
