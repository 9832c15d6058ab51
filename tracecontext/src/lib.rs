//! Propagation and correlation of W3C trace context across HTTP services.
//!
//! *[Supported Rust Versions](#supported-rust-versions)*
//!
//! # Overview
//!
//! Independent services (a browser UI, an API gateway, query and validation
//! services, catalog and storage backends) each emit their own spans. This
//! crate stitches them into one trace by carrying the caller's span identity
//! in the [W3C `traceparent` header], and by keeping the span a request is
//! working on ambient, so that every outbound call made while handling the
//! request carries it on.
//!
//! The carrier is best-effort and untrusted. A missing or malformed header
//! never fails a request: the request simply starts a new trace.
//!
//! [W3C `traceparent` header]: https://www.w3.org/TR/trace-context/#traceparent-header
//!
//! ## What does this crate contain?
//!
//! - **[`codec`]** encodes and decodes `traceparent` values.
//! - **[`validate`]** checks trace and span ids in their hex form.
//! - **[`propagation`]** reads inbound headers ([`ContextExtractor`]) and
//!   writes outbound ones ([`ContextPropagator`]) through the [`Extractor`]
//!   and [`Injector`] carrier traits.
//! - **[`Context`]** and [`ContextGuard`] keep the current span ambient for a
//!   thread, or for a task with [`FutureContextExt`].
//! - **[`naming`]** labels a request's span depending on whether it started
//!   a new trace.
//! - **[`request`]** ties the above together at handler entry.
//! - **[`session`]** builds the client side of a session: one trace, with
//!   queries chained one after the other.
//!
//! Storing, exporting and sampling spans is left to a tracing SDK; this
//! crate only decides which span is whose parent.
//!
//! [`Extractor`]: propagation::Extractor
//! [`Injector`]: propagation::Injector
//! [`ContextExtractor`]: propagation::ContextExtractor
//! [`ContextPropagator`]: propagation::ContextPropagator
//!
//! # Getting Started
//!
//! ```
//! use std::collections::HashMap;
//! use tracecontext::propagation::ContextPropagator;
//! use tracecontext::RequestScope;
//!
//! fn handle(inbound: &HashMap<String, String>) -> Result<(), Box<dyn std::error::Error>> {
//!     // Continue the caller's trace, or start a new one.
//!     let scope = RequestScope::begin("query", inbound);
//!
//!     // Every outbound call carries the ambient span.
//!     let outbound = ContextPropagator::new().headers()?;
//!     assert!(outbound.contains_key("traceparent"));
//!
//!     scope.finish()?;
//!     Ok(())
//! }
//!
//! handle(&HashMap::new()).unwrap();
//! ```
//!
//! # Crate Feature Flags
//!
//! The following core crate feature flags are available:
//!
//! * `internal-logs`: Emits the crate's own diagnostics (rejected headers,
//!   unbalanced scopes) as `tracing` events. Enabled by default.
//! * `strict-scope`: Panics instead of warning when a scope is detached out
//!   of order. Meant for test builds.
//! * `testing`: Exposes [`IncrementIdGenerator`](id_generator::IncrementIdGenerator)
//!   for deterministic ids.
//!
//! ## Configuration
//!
//! Runtime settings live in [`Settings`], read from the environment by
//! [`global::settings`]:
//!
//! * `TRACECONTEXT_STRICT_SCOPE`: same as the `strict-scope` feature.
//! * `TRACECONTEXT_FORWARD_TRACESTATE`: forward inbound `tracestate` on
//!   outbound calls. Defaults to on.
//! * `TRACECONTEXT_DEMO_MODE`: log every extraction and injection at info
//!   level.
//!
//! # Supported Rust Versions
//!
//! This crate is built against the latest stable release. The minimum
//! supported version is 1.75. The current policy is not to raise the minimum
//! supported version in a patch release.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![allow(clippy::needless_doctest_main)]
#![cfg_attr(
    docsrs,
    feature(doc_cfg, doc_auto_cfg),
    deny(rustdoc::broken_intra_doc_links)
)]

pub mod global;

pub mod codec;

mod context;

pub use context::{Context, ContextGuard, FutureContextExt, StreamContextExt, WithContext};

mod error;

pub use error::{DecodeError, PropagationError, PropagationResult};

pub mod id_generator;

pub mod naming;

pub mod propagation;

pub mod request;

pub use request::{Correlator, RequestScope, RequestSpan, RequestSummary};

pub mod session;

mod settings;

pub use settings::{
    Settings, SharedSettings, DEMO_MODE_ENV, FORWARD_TRACESTATE_ENV, STRICT_SCOPE_ENV,
};

mod span_context;

pub use span_context::{SpanContext, TraceState};

mod stats;

pub use stats::{PropagationStats, StatsSnapshot};

mod trace_context;

pub use trace_context::{SpanId, TraceFlags, TraceId};

pub mod validate;

#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
