//! The transport boundary.
//!
//! A [`Transport`] dispatches one marshaled call and lets its connection
//! [`Config`] be changed through reversible [`ClientOpt`]s. The HTTP
//! implementation lives in [`crate::HttpClient`]; tests and embedders may
//! provide their own.

use crate::opt::Opt;
use crate::request::RequestOpt;
use crate::response::Response;
use crate::Result;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::future::Future;
use std::time::Duration;

/// Connection-level settings shared by every call that goes through a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// The full URL calls are sent to.
    pub endpoint: String,

    /// Per-attempt timeout, unless a request sets its own.
    pub timeout: Option<Duration>,

    /// Headers sent with every call.
    pub headers: HeaderMap,
}

impl Config {
    /// Creates a configuration pointing at `endpoint` with no timeout or headers.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: None,
            headers: HeaderMap::new(),
        }
    }
}

/// A reversible change to a transport's [`Config`].
pub type ClientOpt = Opt<Config>;

impl Opt<Config> {
    /// Points the transport at a different endpoint.
    pub fn endpoint(endpoint: impl Into<String>) -> Self {
        let endpoint: String = endpoint.into();
        Self::set(|c: &mut Config| &mut c.endpoint, endpoint)
    }

    /// Sets (or clears) the per-attempt timeout.
    pub fn timeout(timeout: Option<Duration>) -> Self {
        Self::set(|c: &mut Config| &mut c.timeout, timeout)
    }

    /// Replaces all default headers.
    pub fn headers(headers: HeaderMap) -> Self {
        Self::set(|c: &mut Config| &mut c.headers, headers)
    }

    /// Sets one default header.
    ///
    /// The inverse restores the previous value, or removes the header if it
    /// was not set before.
    pub fn header(name: HeaderName, value: HeaderValue) -> Self {
        Self::new(move |c: &mut Config| {
            match c.headers.insert(name.clone(), value.clone()) {
                Some(previous) => Self::header(name.clone(), previous),
                None => Self::remove_header(name.clone()),
            }
        })
    }

    /// Removes one default header.
    pub fn remove_header(name: HeaderName) -> Self {
        Self::new(move |c: &mut Config| match c.headers.remove(&name) {
            Some(previous) => Self::header(name.clone(), previous),
            None => Self::noop(),
        })
    }
}

/// Something that can carry a marshaled call to the service.
///
/// Implementations hold their [`Config`] behind interior mutability, since the
/// endpoint is changed by redirects while other calls may be in flight.
/// Replacement is last-writer-wins; no ordering between concurrent calls is
/// promised.
pub trait Transport: Send + Sync {
    /// Sends one attempt of `call`, shaped by `opts`.
    ///
    /// Non-2xx answers are reported as [`crate::Error::Api`] with the response
    /// attached.
    fn send<'a>(
        &'a self,
        call: &'a serde_json::Value,
        opts: &'a [RequestOpt],
    ) -> impl Future<Output = Result<Box<dyn Response>>> + Send + 'a;

    /// Applies `opt` to the configuration and returns its inverse.
    fn apply(&self, opt: &ClientOpt) -> ClientOpt;

    /// Returns a snapshot of the current configuration.
    fn config(&self) -> Config;

    /// Returns the endpoint calls are currently sent to.
    fn endpoint(&self) -> String {
        self.config().endpoint
    }
}
