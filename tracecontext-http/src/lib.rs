//! [`http`] carriers for `tracecontext`.
//!
//! [`HeaderExtractor`] and [`HeaderInjector`] adapt an [`http::HeaderMap`]
//! to the carrier traits, and the request helpers apply the extractor,
//! propagator and correlator to whole [`http::Request`]s.
//!
//! ```
//! use tracecontext::propagation::{ContextExtractor, ContextPropagator};
//! use tracecontext_http::{extract_request, inject_request, Request};
//!
//! let inbound = Request::builder()
//!     .header("Traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
//!     .body(())
//!     .unwrap();
//! let extraction = extract_request(&ContextExtractor::new(), &inbound);
//! assert!(!extraction.is_root);
//!
//! let _guard = extraction.attach();
//! let mut outbound = Request::builder().uri("http://catalog/items").body(()).unwrap();
//! inject_request(&ContextPropagator::new(), &mut outbound).unwrap();
//! assert_eq!(
//!     outbound.headers()["traceparent"],
//!     "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
//! );
//! ```
use std::borrow::Cow;

#[doc(no_inline)]
pub use http::{HeaderMap, Request};
use tracecontext::propagation::{
    ContextExtractor, ContextPropagator, Extraction, Extractor, Injector,
};
use tracecontext::{tc_debug, Correlator, PropagationResult, RequestScope};

/// Helper for injecting headers into HTTP Requests. This is used for trace
/// context propagation over HTTP.
#[derive(Debug)]
pub struct HeaderInjector<'a>(pub &'a mut http::HeaderMap);

impl Injector for HeaderInjector<'_> {
    /// Set a key and value in the HeaderMap.  Does nothing if the key or value are not valid inputs.
    ///
    /// A dropped header is logged with its name and the length of its value.
    fn set(&mut self, key: &str, value: String) {
        if let Ok(name) = http::header::HeaderName::from_bytes(key.as_bytes()) {
            if let Ok(val) = http::header::HeaderValue::from_str(&value) {
                self.0.insert(name, val);
                return;
            }
        }
        tc_debug!(
            name: "HeaderInjector.InvalidHeader",
            key = key,
            value_len = value.len()
        );
    }

    fn reserve(&mut self, additional: usize) {
        self.0.reserve(additional);
    }
}

/// Helper for extracting headers from HTTP Requests. This is used for trace
/// context propagation over HTTP.
///
/// Header names are case-insensitive. Values that are not valid UTF-8 are
/// returned lossily so that they still count as present and fail decoding.
#[derive(Debug)]
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    /// Get a value for a key from the HeaderMap.
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.0
            .get(key)
            .map(|value| String::from_utf8_lossy(value.as_bytes()))
    }

    /// Collect all the keys from the HeaderMap.
    fn keys(&self) -> Vec<Cow<'_, str>> {
        self.0
            .keys()
            .map(|value| Cow::Borrowed(value.as_str()))
            .collect::<Vec<_>>()
    }

    /// Get all values for a key from the HeaderMap.
    fn get_all(&self, key: &str) -> Option<Vec<Cow<'_, str>>> {
        let values = self
            .0
            .get_all(key)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()))
            .collect::<Vec<_>>();
        (!values.is_empty()).then_some(values)
    }
}

/// Reads the caller's span context from an inbound request.
pub fn extract_request<B>(extractor: &ContextExtractor, request: &Request<B>) -> Extraction {
    extractor.extract(&HeaderExtractor(request.headers()))
}

/// Writes the ambient span context onto an outbound request.
pub fn inject_request<B>(
    propagator: &ContextPropagator,
    request: &mut Request<B>,
) -> PropagationResult<()> {
    propagator.inject_current(&mut HeaderInjector(request.headers_mut()))
}

/// Starts handling an inbound request, naming it `"{method} {path}"`.
pub fn begin_request<B>(correlator: &Correlator, request: &Request<B>) -> RequestScope {
    let operation = format!("{} {}", request.method(), request.uri().path());
    correlator.begin_request(&operation, &HeaderExtractor(request.headers()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use tracecontext::{
        Context, DecodeError, PropagationError, PropagationStats, Settings, SharedSettings,
        SpanContext, SpanId, TraceFlags, TraceId,
    };

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn extractor() -> ContextExtractor {
        ContextExtractor::new()
            .with_stats(Arc::new(PropagationStats::new()))
            .with_settings(SharedSettings::new(Settings::default()))
    }

    fn propagator() -> ContextPropagator {
        ContextPropagator::new()
            .with_stats(Arc::new(PropagationStats::new()))
            .with_settings(SharedSettings::new(Settings::default()))
    }

    #[test]
    fn http_headers_get() {
        let mut carrier = http::HeaderMap::new();
        HeaderInjector(&mut carrier).set("headerName", "value".to_string());

        assert_eq!(
            HeaderExtractor(&carrier).get("HEADERNAME"),
            Some(Cow::Borrowed("value")),
            "case insensitive extraction"
        )
    }

    #[test]
    fn http_headers_get_all() {
        let mut carrier = http::HeaderMap::new();
        carrier.append("traceparent", "first".parse().unwrap());
        carrier.append("traceparent", "second".parse().unwrap());

        assert_eq!(
            HeaderExtractor(&carrier).get_all("TRACEPARENT"),
            Some(vec![Cow::Borrowed("first"), Cow::Borrowed("second")])
        );
        assert_eq!(HeaderExtractor(&carrier).get_all("tracestate"), None);
    }

    #[test]
    fn http_headers_keys() {
        let mut carrier = http::HeaderMap::new();
        HeaderInjector(&mut carrier).set("headerName1", "value1".to_string());
        HeaderInjector(&mut carrier).set("headerName2", "value2".to_string());

        let extractor = HeaderExtractor(&carrier);
        let got = extractor.keys();
        assert_eq!(got.len(), 2);
        assert!(got.contains(&Cow::Borrowed("headername1")));
        assert!(got.contains(&Cow::Borrowed("headername2")));
    }

    #[test]
    fn invalid_header_values_are_skipped() {
        let mut carrier = http::HeaderMap::new();
        HeaderInjector(&mut carrier).set("bad header", "value".to_string());
        HeaderInjector(&mut carrier).set("traceparent", "line\nbreak".to_string());

        assert!(carrier.is_empty());
    }

    #[test]
    fn non_utf8_value_is_rejected_not_missing() {
        let mut carrier = http::HeaderMap::new();
        carrier.insert(
            "traceparent",
            http::HeaderValue::from_bytes(b"00-\xff\xfe").unwrap(),
        );

        let extraction = extractor().extract(&HeaderExtractor(&carrier));
        assert!(extraction.is_root);
        assert_eq!(extraction.rejection, Some(DecodeError::MalformedHeader));
    }

    #[rstest]
    #[case("traceparent")]
    #[case("Traceparent")]
    #[case("TRACEPARENT")]
    #[case("traceParent")]
    fn extract_request_any_case(#[case] name: &str) {
        let request = Request::builder()
            .header(name, TRACEPARENT)
            .body(())
            .unwrap();

        let extraction = extract_request(&extractor(), &request);
        assert_eq!(
            extraction.context,
            Some(SpanContext::new(
                TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736),
                SpanId::from(0x00f0_67aa_0ba9_02b7),
                TraceFlags::SAMPLED,
                true,
            ))
        );
    }

    #[test]
    fn repeated_header_is_malformed() {
        let request = Request::builder()
            .header("traceparent", TRACEPARENT)
            .header("traceparent", TRACEPARENT)
            .body(())
            .unwrap();

        let extraction = extract_request(&extractor(), &request);
        assert!(extraction.is_root);
        assert_eq!(extraction.rejection, Some(DecodeError::MalformedHeader));
    }

    #[test]
    fn inject_request_without_context_fails() {
        let mut request = Request::builder().body(()).unwrap();

        assert_eq!(
            inject_request(&propagator(), &mut request),
            Err(PropagationError::NoActiveContext)
        );
        assert!(request.headers().is_empty());
    }

    #[test]
    fn begin_request_names_by_route() {
        let request = Request::builder()
            .method("POST")
            .uri("http://gateway/api/query?q=1")
            .header("traceparent", TRACEPARENT)
            .body(())
            .unwrap();
        let correlator = Correlator::new()
            .with_extractor(extractor())
            .with_propagator(propagator())
            .with_settings(SharedSettings::new(Settings::default()));

        let scope = begin_request(&correlator, &request);
        assert_eq!(scope.name().name, "POST /api/query");
        assert_eq!(scope.parent_span_id(), Some(SpanId::from(0x00f0_67aa_0ba9_02b7)));

        let mut outbound = Request::builder().body(()).unwrap();
        inject_request(&propagator(), &mut outbound).unwrap();
        let forwarded = outbound.headers()["traceparent"].to_str().unwrap();
        assert!(forwarded.starts_with("00-4bf92f3577b34da6a3ce929d0e0e4736-"));
        assert!(!forwarded.contains("00f067aa0ba902b7"));

        scope.finish().unwrap();
        assert!(Context::current().span_context().is_none());
    }
}
