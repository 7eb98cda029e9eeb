//! Responses returned by transports.
//!
//! Transports hand back responses as `Box<dyn Response>`, so that decorators
//! (the redirect-aware caller, scoped overrides) can pass them through without
//! knowing the concrete type. The HTTP transport in this crate produces
//! [`HttpResponse`], which is also the kind the redirect logic knows how to read.

use crate::{Error, Result};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::time::Duration;

/// A response produced by a transport.
///
/// Dropping a response releases whatever it holds.
pub trait Response: Any + fmt::Debug + Send + Sync {
    /// The HTTP status the response was delivered with.
    fn status(&self) -> StatusCode;

    /// Upcasts for by-reference downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Upcasts for by-value downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl dyn Response {
    /// Returns `true` if the response is of type `T`.
    pub fn is<T: Response>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Returns a reference to the concrete response, if it is of type `T`.
    pub fn downcast_ref<T: Response>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Converts into the concrete response, if it is of type `T`.
    ///
    /// On a mismatch the response is dropped and `None` is returned.
    pub fn downcast<T: Response>(self: Box<Self>) -> Option<Box<T>> {
        self.into_any().downcast::<T>().ok()
    }
}

/// A fully-read HTTP response.
///
/// # Examples
///
/// ```
/// use followcall::HttpResponse;
/// use http::{HeaderMap, HeaderValue, StatusCode};
/// use std::time::Duration;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("location", HeaderValue::from_static("//10.0.0.2:5050"));
///
/// let response = HttpResponse::new(
///     String::new(),
///     StatusCode::TEMPORARY_REDIRECT,
///     headers,
///     Duration::from_millis(3),
/// );
///
/// assert_eq!(response.header("location"), Some("//10.0.0.2:5050"));
/// assert!(!response.is_success());
/// ```
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The raw response body as a string.
    pub raw_body: String,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// How long the attempt that produced this response took.
    pub latency: Duration,
}

impl HttpResponse {
    /// Creates a new `HttpResponse`.
    pub fn new(raw_body: String, status: StatusCode, headers: HeaderMap, latency: Duration) -> Self {
        Self {
            raw_body,
            status,
            headers,
            latency,
        }
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] with the raw body attached when
    /// the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.raw_body).map_err(|e| {
            tracing::debug!(
                error = %e,
                raw_response = %self.raw_body,
                "Failed to deserialize response"
            );
            Error::DeserializationFailed {
                raw_response: self.raw_body.clone(),
                serde_error: e.to_string(),
                status: self.status,
            }
        })
    }
}

impl Response for HttpResponse {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}
