//! Execution-scoped ambient context.
//!
//! The `context` module associates the span a request is working on with the
//! thread (or, through [`FutureContextExt`], the task) that handles it, so
//! that outbound calls can be stamped with it without passing it around.
//!
//! # Main Types
//!
//! - [`Context`]: An immutable snapshot of the ambient span.
//! - [`ContextGuard`]: The token returned by [`Context::attach`]; dropping it
//!   restores the previous context.
//!
use crate::error::{PropagationError, PropagationResult};
use crate::{global, tc_error, tc_warn, SpanContext, SpanId, TraceState};
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;

#[cfg(test)]
mod tests;

mod future_ext;

pub use future_ext::{FutureContextExt, StreamContextExt, WithContext};

thread_local! {
    static CURRENT_CONTEXT: RefCell<ContextStack> = RefCell::new(ContextStack::default());
}

/// The span a request is currently working on.
///
/// A [`Context`] carries an optional [`SpanContext`], the id of the remote
/// span that the local span continues (if any), and the opaque `tracestate`
/// received with it. [`Context`]s are immutable; `with_*` methods return new
/// contexts.
///
/// ## Managing the current context
///
/// Contexts are associated with the caller's current execution unit on a
/// given thread via the [`attach`] method, and previous contexts are restored
/// by dropping the returned [`ContextGuard`]. Contexts nest with strict stack
/// discipline. A snapshot of the current one is available via
/// [`Context::current`].
///
/// [`attach`]: Context::attach()
///
/// # Examples
///
/// ```
/// use tracecontext::{Context, SpanContext, SpanId, TraceFlags, TraceId};
///
/// let remote = SpanContext::new(TraceId::from(1), SpanId::from(2), TraceFlags::SAMPLED, true);
///
/// {
///     let _guard = Context::new().with_remote_span_context(remote).attach();
///     assert_eq!(Context::current().span_context(), Some(&remote));
/// }
///
/// // Dropping the guard restored the empty context
/// assert_eq!(Context::current().span_context(), None);
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Context {
    span: Option<SpanContext>,
    parent_span_id: Option<SpanId>,
    trace_state: TraceState,
}

impl Context {
    /// Creates an empty `Context`.
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns an immutable snapshot of the current thread's context.
    pub fn current() -> Self {
        Self::map_current(|cx| cx.clone())
    }

    /// Applies a function to the current context returning its value.
    ///
    /// Note: This function will panic if you attempt to attach another context
    /// while the current one is still borrowed.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| cx.borrow().map_current_cx(f))
    }

    /// Number of scopes currently attached on this thread.
    pub fn scope_depth() -> usize {
        CURRENT_CONTEXT.with(|cx| cx.borrow().depth())
    }

    /// The span context, if one is set.
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.span.as_ref()
    }

    /// Returns `true` if a valid span context is set.
    pub fn has_active_span(&self) -> bool {
        self.span.is_some_and(|span| span.is_valid())
    }

    /// The remote span the local span continues, if any.
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    /// The opaque `tracestate` received with the span context.
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }

    /// Returns a copy of this context with the given remote span context.
    pub fn with_remote_span_context(&self, span_context: SpanContext) -> Self {
        Context {
            span: Some(span_context),
            parent_span_id: None,
            trace_state: self.trace_state.clone(),
        }
    }

    /// Returns a copy of this context with the given span and its parent.
    pub fn with_span(&self, span_context: SpanContext, parent_span_id: Option<SpanId>) -> Self {
        Context {
            span: Some(span_context),
            parent_span_id,
            trace_state: self.trace_state.clone(),
        }
    }

    /// Returns a copy of this context carrying the given `tracestate`.
    pub fn with_trace_state(&self, trace_state: TraceState) -> Self {
        Context {
            span: self.span,
            parent_span_id: self.parent_span_id,
            trace_state,
        }
    }

    /// A context for a new local span whose parent is this context's span.
    ///
    /// Returns `None` if this context has no valid span to descend from.
    pub fn child(&self, span_id: SpanId) -> Option<Self> {
        let parent = self.span.filter(SpanContext::is_valid)?;
        Some(Context {
            span: Some(parent.child(span_id)),
            parent_span_id: Some(parent.span_id()),
            trace_state: self.trace_state.clone(),
        })
    }

    /// Replaces the current context on this thread with this context.
    ///
    /// Dropping the returned [`ContextGuard`] will reset the current context to the
    /// previous value.
    ///
    /// Guards do not need to be explicitly dropped:
    ///
    /// ```
    /// use tracecontext::{Context, SpanContext, SpanId, TraceFlags, TraceId};
    ///
    /// fn handle() -> Result<(), &'static str> {
    ///     let span = SpanContext::new(TraceId::from(1), SpanId::from(2), TraceFlags::SAMPLED, false);
    ///     // NOTE: a variable name after the underscore is **required** or rust
    ///     // will drop the guard, restoring the previous context _immediately_.
    ///     let _guard = Context::new().with_span(span, None).attach();
    ///
    ///     // early returns drop the guard too
    ///     Err("downstream unavailable")
    /// }
    ///
    /// assert!(handle().is_err());
    /// assert!(Context::current().span_context().is_none());
    /// ```
    pub fn attach(self) -> ContextGuard {
        let (cx_pos, generation) = CURRENT_CONTEXT.with(|cx| cx.borrow_mut().push(self));

        ContextGuard {
            cx_pos,
            generation,
            active: true,
            _marker: PhantomData,
        }
    }

    /// Drops every scope above `depth` on this thread, reporting them as
    /// unbalanced. Used when a request ends with scopes still attached.
    pub(crate) fn truncate_scopes(depth: usize) -> PropagationResult<()> {
        CURRENT_CONTEXT.with(|cx| cx.borrow_mut().truncate(depth))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Context");
        match &self.span {
            Some(span) => dbg.field("span", span),
            None => dbg.field("span", &"None"),
        };
        dbg.field("parent_span_id", &self.parent_span_id)
            .field("trace_state", &self.trace_state)
            .finish()
    }
}

/// A guard that resets the current context to the prior context when dropped.
///
/// This is the token for one [`Context::attach`] call. It cannot be sent to
/// another thread, so it can never be held across an unrelated request.
#[derive(Debug)]
#[must_use = "dropping the guard immediately detaches the context"]
pub struct ContextGuard {
    // The position of the context in the stack. This is used to pop the context.
    cx_pos: u16,
    // Tells this guard's entry apart from a later one at the same position.
    generation: u64,
    active: bool,
    // Ensure this type is !Send as it relies on thread locals
    _marker: PhantomData<*const ()>,
}

impl ContextGuard {
    /// Detaches the context now, instead of when the guard goes out of scope.
    ///
    /// Returns [`PropagationError::UnbalancedScope`] if this guard is not the
    /// innermost one still attached. The context stays visible until the
    /// scopes nested inside it are gone either way.
    pub fn detach(mut self) -> PropagationResult<()> {
        self.active = false;
        let result = pop_position(self.cx_pos, self.generation);
        if result.is_err() {
            global::stats().record_unbalanced_scope();
        }
        result
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(err) = pop_position(self.cx_pos, self.generation) {
            report_unbalanced(&err, global::strict_scope());
        }
    }
}

fn pop_position(pos: u16, generation: u64) -> PropagationResult<()> {
    if pos > ContextStack::BASE_POS && pos < ContextStack::MAX_POS {
        CURRENT_CONTEXT.with(|context_stack| context_stack.borrow_mut().pop_id(pos, generation))
    } else {
        Ok(())
    }
}

/// Counts and logs a scope imbalance, or panics in strict mode.
pub(crate) fn report_unbalanced(err: &PropagationError, strict: bool) {
    global::stats().record_unbalanced_scope();
    if strict && !std::thread::panicking() {
        tc_error!(name: "Context.UnbalancedScope", message = err.to_string());
        panic!("{err}");
    }
    tc_warn!(name: "Context.UnbalancedScope", message = err.to_string());
}

/// A stack for keeping track of the [`Context`] instances that have been attached
/// to a thread.
///
/// Entry `n - 1` holds the context attached by the guard with position `n`.
/// Popping a position below the top is out of order: the entry is marked
/// dead but stays in place, and it is swept away once every entry above it
/// has been popped. The current context is always the topmost entry, so
/// nested scopes keep seeing what they attached.
///
/// Positions are reused once entries are truncated, so every entry also
/// carries the generation it was pushed with. A guard only pops the entry
/// whose position and generation both match its own.
///
/// The stack relies on the fact that it is thread local and that the
/// [`ContextGuard`] instances that are constructed using ids from it can't be
/// moved to other threads.
struct ContextStack {
    /// This is the current [`Context`] that is active on this thread. If the
    /// `stack` is empty it's an empty [`Context`].
    ///
    /// Having this here allows for fast access to the current [`Context`].
    current_cx: Context,
    /// Attached contexts.
    stack: Vec<ScopeEntry>,
    /// Generation handed to the last pushed entry.
    generation: u64,
    /// Ensure this type is !Send as it relies on thread locals
    _marker: PhantomData<*const ()>,
}

impl ContextStack {
    const BASE_POS: u16 = 0;
    const MAX_POS: u16 = u16::MAX;
    const INITIAL_CAPACITY: usize = 8;

    #[inline(always)]
    fn push(&mut self, cx: Context) -> (u16, u64) {
        let next_id = self.stack.len() + 1;
        if next_id < ContextStack::MAX_POS.into() {
            self.generation += 1;
            self.current_cx = cx.clone();
            self.stack.push(ScopeEntry {
                generation: self.generation,
                cx: Some(cx),
            });
            (next_id as u16, self.generation)
        } else {
            // This is an overflow, log it and ignore it.
            tc_warn!(
                name: "Context.AttachFailed",
                message = format!("Too many contexts. Max limit is {}. \
                  Context::current() remains unchanged as this attach failed. \
                  Dropping the returned ContextGuard will have no impact on Context::current().",
                  ContextStack::MAX_POS)
            );
            (ContextStack::MAX_POS, 0)
        }
    }

    #[inline(always)]
    fn pop_id(&mut self, pos: u16, generation: u64) -> PropagationResult<()> {
        let len = self.stack.len();
        let index = pos as usize;
        if index == 0 || index > len {
            tc_warn!(
                name: "Context.PopOutOfBounds",
                position = pos,
                stack_length = len,
                message = "Attempted to pop beyond the end of the context stack"
            );
            return Err(PropagationError::UnbalancedScope {
                expected: len,
                found: index,
            });
        }

        if self.stack[index - 1].generation != generation {
            // The guard's own entry was truncated and the position reused.
            tc_warn!(
                name: "Context.StaleGuard",
                position = pos,
                generation = generation,
                message = "Guard outlived its scope, leaving the context stack unchanged"
            );
            return Err(PropagationError::UnbalancedScope {
                expected: len,
                found: index,
            });
        }

        if index == len {
            self.stack.pop();
            self.sweep_dead();
            self.restore_current();
            Ok(())
        } else {
            self.stack[index - 1].cx = None;
            Err(PropagationError::UnbalancedScope {
                expected: len,
                found: index,
            })
        }
    }

    /// Drops everything above `depth`. Returns an error if anything was there.
    fn truncate(&mut self, depth: usize) -> PropagationResult<()> {
        let len = self.stack.len();
        if len <= depth {
            return Ok(());
        }
        self.stack.truncate(depth);
        self.sweep_dead();
        self.restore_current();
        Err(PropagationError::UnbalancedScope {
            expected: depth,
            found: len,
        })
    }

    /// Pops entries that were detached out of order and are now on top.
    fn sweep_dead(&mut self) {
        while let Some(ScopeEntry { cx: None, .. }) = self.stack.last() {
            self.stack.pop();
        }
    }

    fn restore_current(&mut self) {
        self.current_cx = match self.stack.last() {
            Some(ScopeEntry { cx: Some(cx), .. }) => cx.clone(),
            _ => Context::default(),
        };
    }

    fn depth(&self) -> usize {
        self.stack.len()
    }

    #[inline(always)]
    fn map_current_cx<T>(&self, f: impl FnOnce(&Context) -> T) -> T {
        f(&self.current_cx)
    }
}

/// One attached context, `None` once popped out of order.
struct ScopeEntry {
    generation: u64,
    cx: Option<Context>,
}

impl Default for ContextStack {
    fn default() -> Self {
        ContextStack {
            current_cx: Context::default(),
            stack: Vec::with_capacity(ContextStack::INITIAL_CAPACITY),
            generation: 0,
            _marker: PhantomData,
        }
    }
}
