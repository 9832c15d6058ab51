use super::*;
use crate::{SpanContext, SpanId, TraceFlags, TraceId};
use std::time::Duration;
use tokio::time::sleep;

fn span(id: u64) -> SpanContext {
    SpanContext::new(TraceId::from(0xabc), SpanId::from(id), TraceFlags::SAMPLED, false)
}

fn cx(id: u64) -> Context {
    Context::new().with_span(span(id), None)
}

fn current_span_id() -> Option<SpanId> {
    Context::map_current(|cx| cx.span_context().map(SpanContext::span_id))
}

#[test]
fn context_immutable() {
    // start with Current, which should be an empty context
    let cx = Context::current();
    assert_eq!(cx.span_context(), None);

    // with_span should return a new context,
    // leaving the original context unchanged
    let cx_new = cx.with_span(span(1), Some(SpanId::from(9)));
    assert_eq!(cx.span_context(), None);
    assert_eq!(cx_new.span_context(), Some(&span(1)));
    assert_eq!(cx_new.parent_span_id(), Some(SpanId::from(9)));

    let cx_newer = cx_new.with_trace_state(TraceState::from_header("a=b"));
    assert_eq!(cx_new.trace_state(), &TraceState::NONE);
    assert_eq!(cx_newer.trace_state().header(), Some("a=b"));
    assert_eq!(cx_newer.span_context(), Some(&span(1)));
}

#[test]
fn child_descends_from_span() {
    let parent = cx(1).with_trace_state(TraceState::from_header("vendor=x"));
    let child = parent.child(SpanId::from(2)).unwrap();

    let child_span = child.span_context().unwrap();
    assert_eq!(child_span.trace_id(), TraceId::from(0xabc));
    assert_eq!(child_span.span_id(), SpanId::from(2));
    assert!(!child_span.is_remote());
    assert_eq!(child.parent_span_id(), Some(SpanId::from(1)));
    assert_eq!(child.trace_state().header(), Some("vendor=x"));

    assert!(Context::new().child(SpanId::from(2)).is_none());
    assert!(Context::new()
        .with_span(SpanContext::NONE, None)
        .child(SpanId::from(2))
        .is_none());
}

#[test]
fn nested_contexts() {
    let _outer_guard = cx(1).attach();
    assert_eq!(current_span_id(), Some(SpanId::from(1)));
    assert_eq!(Context::scope_depth(), 1);

    {
        let _inner_guard = cx(2).attach();
        assert_eq!(current_span_id(), Some(SpanId::from(2)));
        assert_eq!(Context::scope_depth(), 2);
    }

    // Resets to the outer span when the inner guard is dropped
    assert_eq!(current_span_id(), Some(SpanId::from(1)));
    assert_eq!(Context::scope_depth(), 1);
}

#[test]
fn early_return_detaches() {
    fn handler(fail: bool) -> Result<SpanId, &'static str> {
        let _guard = cx(7).attach();
        if fail {
            return Err("validation failed");
        }
        current_span_id().ok_or("no span")
    }

    assert_eq!(handler(false), Ok(SpanId::from(7)));
    assert_eq!(current_span_id(), None);
    assert_eq!(handler(true), Err("validation failed"));
    assert_eq!(current_span_id(), None);
    assert_eq!(Context::scope_depth(), 0);
}

#[test]
fn panic_unwinding_detaches() {
    let result = std::panic::catch_unwind(|| {
        let _guard = cx(3).attach();
        panic!("handler blew up");
    });
    assert!(result.is_err());
    assert_eq!(current_span_id(), None);
    assert_eq!(Context::scope_depth(), 0);
}

#[test]
fn explicit_detach_in_order() {
    let outer = cx(1).attach();
    let inner = cx(2).attach();

    assert_eq!(inner.detach(), Ok(()));
    assert_eq!(current_span_id(), Some(SpanId::from(1)));
    assert_eq!(outer.detach(), Ok(()));
    assert_eq!(current_span_id(), None);
}

#[test]
fn overlapping_contexts_are_reported() {
    let before = global::stats().snapshot().unbalanced_scopes;

    let outer_guard = cx(1).attach();
    let inner_guard = cx(2).attach();

    assert_eq!(
        outer_guard.detach(),
        Err(PropagationError::UnbalancedScope {
            expected: 2,
            found: 1
        })
    );

    // `inner_guard` is still alive so its span should still be current
    assert_eq!(current_span_id(), Some(SpanId::from(2)));

    drop(inner_guard);

    // Both guards are gone, the outer span must not come back.
    assert_eq!(current_span_id(), None);
    assert_eq!(Context::scope_depth(), 0);
    assert!(global::stats().snapshot().unbalanced_scopes > before);
}

#[test]
fn balanced_sequences_restore_the_starting_context() {
    let _base = cx(100).attach();
    let start = Context::current();

    // Every prefix of nesting depth, each unwound in stack order
    for depth in 1..=16u64 {
        let mut guards = Vec::new();
        for id in 1..=depth {
            guards.push(cx(id).attach());
            assert_eq!(current_span_id(), Some(SpanId::from(id)));
        }
        while let Some(guard) = guards.pop() {
            assert_eq!(guard.detach(), Ok(()));
        }
        assert_eq!(Context::current(), start);
    }

    // Interleaved: sibling scopes inside a parent scope
    {
        let _parent = cx(1).attach();
        for sibling in 2..6 {
            let _child = cx(sibling).attach();
            {
                let _grandchild = cx(sibling * 10).attach();
                assert_eq!(current_span_id(), Some(SpanId::from(sibling * 10)));
            }
            assert_eq!(current_span_id(), Some(SpanId::from(sibling)));
        }
        assert_eq!(current_span_id(), Some(SpanId::from(1)));
    }
    assert_eq!(Context::current(), start);
}

#[test]
fn truncate_drops_leaked_scopes() {
    let _request = cx(1).attach();
    let depth = Context::scope_depth();

    std::mem::forget(cx(2).attach());
    std::mem::forget(cx(3).attach());
    assert_eq!(current_span_id(), Some(SpanId::from(3)));

    assert_eq!(
        Context::truncate_scopes(depth),
        Err(PropagationError::UnbalancedScope {
            expected: depth,
            found: depth + 2
        })
    );
    assert_eq!(current_span_id(), Some(SpanId::from(1)));
    assert_eq!(Context::truncate_scopes(depth), Ok(()));
}

#[test]
fn stale_guard_detach_leaves_newer_scope_attached() {
    let _outer = cx(1).attach();
    let leaked = cx(2).attach();
    assert!(Context::truncate_scopes(1).is_err());

    let _newer = cx(3).attach();
    assert_eq!(
        leaked.detach(),
        Err(PropagationError::UnbalancedScope {
            expected: 2,
            found: 2
        })
    );
    assert_eq!(current_span_id(), Some(SpanId::from(3)));
    assert_eq!(Context::scope_depth(), 2);
}

#[cfg(not(feature = "strict-scope"))]
#[test]
fn stale_guard_drop_is_counted() {
    let before = global::stats().snapshot().unbalanced_scopes;
    let _outer = cx(1).attach();
    let leaked = cx(2).attach();
    assert!(Context::truncate_scopes(1).is_err());

    let newer = cx(3).attach();
    drop(leaked);
    assert_eq!(current_span_id(), Some(SpanId::from(3)));
    assert!(global::stats().snapshot().unbalanced_scopes > before);

    drop(newer);
    assert_eq!(current_span_id(), Some(SpanId::from(1)));
}

#[cfg(not(feature = "strict-scope"))]
#[test]
fn out_of_order_drop_counts_and_warns() {
    let before = global::stats().snapshot().unbalanced_scopes;
    let outer = cx(1).attach();
    let inner = cx(2).attach();

    drop(outer);
    assert_eq!(current_span_id(), Some(SpanId::from(2)));
    assert!(global::stats().snapshot().unbalanced_scopes > before);

    drop(inner);
    assert_eq!(current_span_id(), None);
    assert_eq!(Context::scope_depth(), 0);
}

#[cfg(feature = "strict-scope")]
#[test]
#[should_panic(expected = "unbalanced context scope")]
fn out_of_order_drop_panics_when_strict() {
    let outer = cx(1).attach();
    let _inner = cx(2).attach();
    drop(outer);
}

#[test]
fn strict_report_panics() {
    let err = PropagationError::UnbalancedScope {
        expected: 1,
        found: 2,
    };
    let result = std::panic::catch_unwind(|| report_unbalanced(&err, true));
    assert!(result.is_err());

    // Non-strict only counts.
    let before = global::stats().snapshot().unbalanced_scopes;
    report_unbalanced(&err, false);
    assert!(global::stats().snapshot().unbalanced_scopes > before);
}

#[test]
fn contexts_are_thread_local() {
    let _guard = cx(1).attach();
    let seen = std::thread::spawn(current_span_id).join().unwrap();
    assert_eq!(seen, None);
    assert_eq!(current_span_id(), Some(SpanId::from(1)));
}

/// Tests that a new ContextStack is created with the correct initial capacity.
#[test]
fn test_initial_capacity() {
    let stack = ContextStack::default();
    assert_eq!(stack.stack.capacity(), ContextStack::INITIAL_CAPACITY);
}

/// Tests popping contexts in non-sequential order.
#[test]
fn test_pop_id_out_of_order() {
    let mut stack = ContextStack::default();

    let (id1, gen1) = stack.push(cx(1));
    let (id2, gen2) = stack.push(cx(2));
    let (id3, gen3) = stack.push(cx(3));

    // Pop middle context first - should not affect current context
    assert!(stack.pop_id(id2, gen2).is_err());
    assert_eq!(stack.current_cx, cx(3));
    assert_eq!(stack.stack.len(), 3); // Length unchanged for middle pops

    // Pop last context - sweeps the dead middle entry, restores the first
    assert_eq!(stack.pop_id(id3, gen3), Ok(()));
    assert_eq!(stack.current_cx, cx(1));
    assert_eq!(stack.stack.len(), 1);

    // Pop first context - should restore to empty state
    assert_eq!(stack.pop_id(id1, gen1), Ok(()));
    assert_eq!(stack.current_cx, Context::default());
    assert_eq!(stack.stack.len(), 0);
}

/// Tests edge cases in context stack operations. IRL these should log
/// warnings, and definitely not panic.
#[test]
fn test_pop_id_edge_cases() {
    let mut stack = ContextStack::default();

    assert!(stack.pop_id(ContextStack::BASE_POS, 0).is_err());
    assert_eq!(stack.stack.len(), 0);

    assert!(stack.pop_id(1000, 1).is_err());
    assert_eq!(stack.stack.len(), 0);

    assert!(stack.pop_id(1, 1).is_err());
    assert_eq!(stack.stack.len(), 0);

    // Right position, wrong generation
    let (id, generation) = stack.push(cx(1));
    assert!(stack.pop_id(id, generation + 1).is_err());
    assert_eq!(stack.stack.len(), 1);
    assert_eq!(stack.current_cx, cx(1));
}

/// A position freed by truncation and reused by a new attach belongs to the
/// new scope only.
#[test]
fn test_pop_id_after_truncate_ignores_stale_generation() {
    let mut stack = ContextStack::default();

    let (outer, outer_gen) = stack.push(cx(1));
    let (leaked, leaked_gen) = stack.push(cx(2));
    assert!(stack.truncate(1).is_err());

    let (newer, newer_gen) = stack.push(cx(3));
    assert_eq!(newer, leaked);
    assert_ne!(newer_gen, leaked_gen);

    assert!(stack.pop_id(leaked, leaked_gen).is_err());
    assert_eq!(stack.current_cx, cx(3));
    assert_eq!(stack.stack.len(), 2);

    assert_eq!(stack.pop_id(newer, newer_gen), Ok(()));
    assert_eq!(stack.pop_id(outer, outer_gen), Ok(()));
    assert_eq!(stack.current_cx, Context::default());
}

/// Once we push beyond the maximum position, the current context must stay
/// unchanged.
#[test]
fn test_push_overflow() {
    let mut stack = ContextStack::default();
    let max_pos = ContextStack::MAX_POS as usize;

    for i in 0..max_pos - 1 {
        let (id, _) = stack.push(cx(i as u64 + 1));
        assert_eq!(id, (i + 1) as u16);
    }

    let (id, _) = stack.push(cx(u64::MAX));
    assert_eq!(id, ContextStack::MAX_POS);
    assert_eq!(stack.current_cx, cx(max_pos as u64 - 1));
}

/// Tests that:
/// 1. The parent context is visible inside async operations
/// 2. Contexts attached inside async operations do not leak out
#[tokio::test]
async fn test_async_context_propagation() {
    async fn nested_operation() {
        assert_eq!(
            current_span_id(),
            Some(SpanId::from(42)),
            "Parent context should be available in async operation"
        );

        let child = Context::current().child(SpanId::from(43)).unwrap();

        FutureContextExt::with_context(
            async {
                assert_eq!(current_span_id(), Some(SpanId::from(43)));

                // Do some async work to simulate real-world scenario
                sleep(Duration::from_millis(10)).await;

                // Still there after the task was suspended
                assert_eq!(current_span_id(), Some(SpanId::from(43)));
                assert_eq!(
                    Context::current().parent_span_id(),
                    Some(SpanId::from(42))
                );
            },
            child,
        )
        .await;

        assert_eq!(current_span_id(), Some(SpanId::from(42)));
    }

    FutureContextExt::with_context(nested_operation(), cx(42)).await;

    assert_eq!(current_span_id(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_tasks_do_not_share_context() {
    let tasks = (1..=8u64)
        .map(|id| {
            tokio::spawn(FutureContextExt::with_context(
                async move {
                    for _ in 0..5 {
                        assert_eq!(current_span_id(), Some(SpanId::from(id)));
                        tokio::task::yield_now().await;
                    }
                    current_span_id()
                },
                cx(id),
            ))
        })
        .collect::<Vec<_>>();

    for (index, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), Some(SpanId::from(index as u64 + 1)));
    }
}
