//! Per-request metadata and the options that shape it.

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Metadata for an individual dispatch attempt.
///
/// Transports start every attempt from [`RequestMetadata::default`] and apply
/// the call's [`RequestOpt`]s to it in order.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// The HTTP method. Calls to the service are `POST` unless changed.
    pub method: Method,

    /// Headers for this request. These replace connection-level headers of the
    /// same name.
    pub headers: HeaderMap,

    /// Query parameters, appended to the endpoint in order.
    pub query_params: Vec<(String, String)>,

    /// Timeout for this request, overriding the connection timeout.
    pub timeout: Option<Duration>,
}

impl RequestMetadata {
    /// Creates a new `RequestMetadata` with the given method.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            query_params: Vec::new(),
            timeout: None,
        }
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new(Method::POST)
    }
}

/// A function applied to [`RequestMetadata`] before an attempt is sent.
///
/// Options are applied in the order they are given, so a later option wins
/// where two of them conflict.
///
/// # Examples
///
/// ```
/// use followcall::request::{RequestMetadata, RequestOpt};
/// use http::{HeaderName, HeaderValue};
///
/// let opts = [
///     RequestOpt::header(HeaderName::from_static("x-stream"), HeaderValue::from_static("a")),
///     RequestOpt::header(HeaderName::from_static("x-stream"), HeaderValue::from_static("b")),
/// ];
///
/// let mut metadata = RequestMetadata::default();
/// for opt in &opts {
///     opt.apply(&mut metadata);
/// }
/// assert_eq!(metadata.headers["x-stream"], "b");
/// ```
#[derive(Clone)]
pub struct RequestOpt(Arc<dyn Fn(&mut RequestMetadata) + Send + Sync>);

impl RequestOpt {
    /// Creates a request option from an arbitrary function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut RequestMetadata) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Applies the option.
    pub fn apply(&self, metadata: &mut RequestMetadata) {
        (self.0)(metadata)
    }

    /// Sets a header, replacing earlier values of the same name.
    pub fn header(name: HeaderName, value: HeaderValue) -> Self {
        Self::new(move |m| {
            m.headers.insert(name.clone(), value.clone());
        })
    }

    /// Appends a query parameter.
    pub fn query(key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        Self::new(move |m| m.query_params.push((key.clone(), value.clone())))
    }

    /// Sets the timeout for this request.
    pub fn timeout(timeout: Duration) -> Self {
        Self::new(move |m| m.timeout = Some(timeout))
    }

    /// Sets the HTTP method.
    pub fn method(method: Method) -> Self {
        Self::new(move |m| m.method = method.clone())
    }
}

impl fmt::Debug for RequestOpt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestOpt(..)")
    }
}

/// Applies `opts` in order to a fresh [`RequestMetadata`].
pub fn build_metadata(opts: &[RequestOpt]) -> RequestMetadata {
    let mut metadata = RequestMetadata::default();
    for opt in opts {
        opt.apply(&mut metadata);
    }
    metadata
}
