//! Task-local ambient context for async handlers.
//!
//! A thread-local stack alone is not enough once a handler awaits: the
//! executor may poll other tasks on the same thread in between. Wrapping the
//! handler future in [`WithContext`] attaches its context for the duration of
//! each poll and detaches it before the poll returns, so the context follows
//! the task rather than the thread.
//!
//! A [`ContextGuard`](crate::ContextGuard) created inside the future must not
//! be held across an `.await`; the wrapper's own scope would then be detached
//! out of order, which is reported as an unbalanced scope.
use crate::Context;
use futures_core::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::Context as TaskContext;
use std::task::Poll;

impl<T: std::future::Future> std::future::Future for WithContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.trace_cx.clone().attach();

        this.inner.poll(task_cx)
    }
}

impl<T: Stream> Stream for WithContext<T> {
    type Item = T::Item;

    fn poll_next(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let _guard = this.trace_cx.clone().attach();
        T::poll_next(this.inner, task_cx)
    }
}

pin_project! {
    /// A future or stream that has an associated context.
    #[derive(Clone, Debug)]
    pub struct WithContext<T> {
        #[pin]
        inner: T,
        trace_cx: Context,
    }
}

// The following two extension traits are _almost_ identical,
// but need to be separate to avoid overlapping implementation errors.

impl<F: std::future::Future> FutureContextExt for F {}
/// Extension trait attaching a context to a future.
pub trait FutureContextExt: Sized {
    /// Attaches the provided [`Context`] to this future, returning a `WithContext`
    /// wrapper.
    ///
    /// The attached context will be set as current while this future is being polled.
    ///
    /// ```
    /// use tracecontext::{Context, FutureContextExt, SpanContext, SpanId, TraceFlags, TraceId};
    ///
    /// let span = SpanContext::new(TraceId::from(1), SpanId::from(2), TraceFlags::SAMPLED, false);
    /// let cx = Context::new().with_span(span, None);
    ///
    /// let seen = futures_executor::block_on(
    ///     async { Context::current().span_context().copied() }.with_context(cx),
    /// );
    /// assert_eq!(seen, Some(span));
    /// assert!(Context::current().span_context().is_none());
    /// ```
    fn with_context(self, trace_cx: Context) -> WithContext<Self> {
        WithContext {
            inner: self,
            trace_cx,
        }
    }

    /// Attaches the current [`Context`] to this future, returning a `WithContext`
    /// wrapper.
    ///
    /// Use this before spawning so the spawned task keeps the caller's span.
    fn with_current_context(self) -> WithContext<Self> {
        let trace_cx = Context::current();
        self.with_context(trace_cx)
    }
}

impl<S: Stream> StreamContextExt for S {}
/// Extension trait attaching a context to a stream.
pub trait StreamContextExt: Sized {
    /// Attaches the provided [`Context`] to this stream, returning a `WithContext`
    /// wrapper.
    ///
    /// The attached context will be set as current while this stream is being polled.
    fn with_context(self, trace_cx: Context) -> WithContext<Self> {
        WithContext {
            inner: self,
            trace_cx,
        }
    }

    /// Attaches the current [`Context`] to this stream, returning a `WithContext`
    /// wrapper.
    fn with_current_context(self) -> WithContext<Self> {
        let trace_cx = Context::current();
        self.with_context(trace_cx)
    }
}
