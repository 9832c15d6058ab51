//! # Header propagation
//!
//! The span a request works on crosses process boundaries as a `traceparent`
//! header. [`ContextExtractor`] reads it from an inbound request, and
//! [`ContextPropagator`] writes the ambient context onto outbound ones.
//!
//! Both work on carriers through the [`Extractor`] and [`Injector`] traits,
//! so the same code serves `HashMap`s, header lists and (in
//! `tracecontext-http`) `http::HeaderMap`.
//!
//! ```
//! use std::collections::HashMap;
//! use tracecontext::propagation::{ContextExtractor, ContextPropagator};
//!
//! let mut inbound = HashMap::new();
//! inbound.insert(
//!     "Traceparent".to_string(),
//!     "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
//! );
//!
//! let extraction = ContextExtractor::new().extract(&inbound);
//! assert!(!extraction.is_root);
//!
//! let outbound = ContextPropagator::new()
//!     .headers_for(&extraction.into_context())
//!     .unwrap();
//! assert_eq!(
//!     outbound["traceparent"],
//!     "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
//! );
//! ```
use std::borrow::Cow;
use std::collections::HashMap;

mod extractor;
mod propagator;

pub use extractor::{ContextExtractor, Extraction};
pub use propagator::ContextPropagator;

/// Injector provides an interface for adding fields from an underlying struct like `HashMap`
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);

    #[allow(unused_variables)]
    /// Hint to reserve capacity for at least `additional` more entries to be inserted.
    fn reserve(&mut self, additional: usize) {}
}

/// Extractor provides an interface for removing fields from an underlying struct like `HashMap`
///
/// Lookups must be case-insensitive: `Traceparent`, `TRACEPARENT` and
/// `traceparent` name the same header.
pub trait Extractor {
    /// Get a value from a key from the underlying data.
    fn get(&self, key: &str) -> Option<Cow<'_, str>>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<Cow<'_, str>>;

    /// Get all values from a key from the underlying data.
    fn get_all(&self, key: &str) -> Option<Vec<Cow<'_, str>>> {
        self.get(key).map(|value| vec![value])
    }
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }

    /// Reserves capacity for at least `additional` more entries to be inserted.
    fn reserve(&mut self, additional: usize) {
        self.reserve(additional);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap.
    ///
    /// Keys written through [`Injector::set`] are lowercase; keys inserted
    /// directly may not be, so a miss falls back to a case-insensitive scan.
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(&key.to_lowercase())
            .or_else(|| {
                self.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(|v| Cow::Borrowed(v.as_str()))
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<Cow<'_, str>> {
        self.keys()
            .map(|k| Cow::Borrowed(k.as_str()))
            .collect::<Vec<_>>()
    }

    /// Every value whose key matches case-insensitively.
    ///
    /// A map can hold `traceparent` and `Traceparent` side by side; both are
    /// returned so the caller can tell the header was sent twice.
    fn get_all(&self, key: &str) -> Option<Vec<Cow<'_, str>>> {
        let values = self
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| Cow::Borrowed(v.as_str()))
            .collect::<Vec<_>>();
        (!values.is_empty()).then_some(values)
    }
}

/// Ordered header lists, as received from a raw HTTP parser.
impl<K: AsRef<str>, V: AsRef<str>> Extractor for [(K, V)] {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.iter()
            .find(|(k, _)| k.as_ref().eq_ignore_ascii_case(key))
            .map(|(_, v)| Cow::Borrowed(v.as_ref()))
    }

    fn keys(&self) -> Vec<Cow<'_, str>> {
        self.iter().map(|(k, _)| Cow::Borrowed(k.as_ref())).collect()
    }

    fn get_all(&self, key: &str) -> Option<Vec<Cow<'_, str>>> {
        let values = self
            .iter()
            .filter(|(k, _)| k.as_ref().eq_ignore_ascii_case(key))
            .map(|(_, v)| Cow::Borrowed(v.as_ref()))
            .collect::<Vec<_>>();
        (!values.is_empty()).then_some(values)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> Extractor for Vec<(K, V)> {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        Extractor::get(self.as_slice(), key)
    }

    fn keys(&self) -> Vec<Cow<'_, str>> {
        Extractor::keys(self.as_slice())
    }

    fn get_all(&self, key: &str) -> Option<Vec<Cow<'_, str>>> {
        Extractor::get_all(self.as_slice(), key)
    }
}

/// Appends headers, keeping any already present with the same name.
impl Injector for Vec<(String, String)> {
    fn set(&mut self, key: &str, value: String) {
        self.push((key.to_lowercase(), value));
    }

    fn reserve(&mut self, additional: usize) {
        Vec::reserve(self, additional);
    }
}
