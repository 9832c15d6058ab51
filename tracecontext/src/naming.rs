//! Span naming for inbound requests.
//!
//! Whether a request continues a trace or starts a new one is decided by the
//! extractor. This module only turns that decision into a label for
//! dashboards; nothing on the propagation path reads it.
use std::borrow::Cow;
use std::fmt;

/// Name used when the operation name is empty.
pub const UNNAMED_OPERATION: &str = "unnamed";

/// `SpanKind` describes the relationship between the Span, its parents,
/// and its children in a `Trace`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// Indicates that the span describes a synchronous request to
    /// some remote service. This span is the parent of a remote `Server`
    /// span and waits for its response.
    Client,

    /// Indicates that the span covers server-side handling of a
    /// synchronous RPC or other remote request. This span is the child of
    /// a remote `Client` span that was expected to wait for a response.
    #[default]
    Server,

    /// Indicates that the span represents an internal
    /// operation within an application, as opposed to an operations with
    /// remote parents or children.
    Internal,
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanKind::Client => write!(f, "client"),
            SpanKind::Server => write!(f, "server"),
            SpanKind::Internal => write!(f, "internal"),
        }
    }
}

/// Display name and kind hint for a span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanName {
    /// Human readable span name.
    pub name: Cow<'static, str>,
    /// Kind hint for the exporter.
    pub kind: SpanKind,
}

/// Maps an operation and its root status to a [`SpanName`].
///
/// Implementations must be pure: the same input always gives the same name.
pub trait NamingPolicy: Send + Sync + fmt::Debug {
    /// Names the local span for `operation`.
    fn name(&self, operation: &str, is_root: bool) -> SpanName;
}

/// Default [`NamingPolicy`]: root spans get a `" (root)"` suffix.
///
/// ```
/// use tracecontext::naming::{NamingPolicy, RootDecisionPolicy, SpanKind};
///
/// let policy = RootDecisionPolicy::new();
/// assert_eq!(policy.name("checkout", true).name, "checkout (root)");
/// assert_eq!(policy.name("checkout", false).name, "checkout");
/// assert_eq!(policy.name("checkout", false).kind, SpanKind::Server);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RootDecisionPolicy {
    _private: (),
}

impl RootDecisionPolicy {
    /// Create a new `RootDecisionPolicy`.
    pub fn new() -> Self {
        RootDecisionPolicy { _private: () }
    }
}

impl NamingPolicy for RootDecisionPolicy {
    fn name(&self, operation: &str, is_root: bool) -> SpanName {
        let operation = if operation.is_empty() {
            UNNAMED_OPERATION
        } else {
            operation
        };
        let name = if is_root {
            Cow::Owned(format!("{operation} (root)"))
        } else {
            Cow::Owned(operation.to_string())
        };

        SpanName {
            name,
            kind: SpanKind::Server,
        }
    }
}
