//! HTTP transport built on `reqwest`.
//!
//! [`HttpClient`] is the [`Transport`] most users want. Use
//! [`HttpClientBuilder`] to configure and create one.

use crate::{
    error::{ApiError, ErrorCode},
    request::{build_metadata, RequestOpt},
    response::{HttpResponse, Response},
    transport::{ClientOpt, Config, Transport},
    Error, Result,
};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use url::Url;

/// An HTTP transport for calls to the service.
///
/// The client is cheap to clone; clones share the connection pool and the
/// connection [`Config`], so an endpoint change made through one clone is
/// seen by all of them.
///
/// Automatic following of HTTP redirects is disabled: a `307` from the service
/// means "not the leader" and is reported as [`ErrorCode::NOT_LEADER`] for the
/// redirect-aware caller to act upon.
///
/// # Examples
///
/// ```no_run
/// use followcall::{HttpClient, Transport};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), followcall::Error> {
/// let client = HttpClient::builder()
///     .endpoint("http://master.example:5050/api/v1/scheduler")?
///     .timeout(Duration::from_secs(10))
///     .default_header("Accept", "application/json")?
///     .build()?;
///
/// let response = client.send(&serde_json::json!({"type": "TEARDOWN"}), &[]).await?;
/// println!("Status: {}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    http_client: reqwest::Client,
    config: RwLock<Config>,
}

impl HttpClient {
    /// Creates a new `HttpClientBuilder` for configuring a client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Executes a single attempt.
    async fn execute_request(
        &self,
        call: &serde_json::Value,
        opts: &[RequestOpt],
    ) -> Result<Box<dyn Response>> {
        let config = self.config();
        let metadata = build_metadata(opts);

        let mut url = Url::parse(&config.endpoint)?;
        for (key, value) in &metadata.query_params {
            url.query_pairs_mut().append_pair(key, value);
        }

        tracing::debug!(
            method = %metadata.method,
            url = %url,
            "Dispatching call"
        );

        let mut headers = config.headers;
        headers.extend(metadata.headers);

        let mut request = self
            .inner
            .http_client
            .request(metadata.method, url)
            .headers(headers)
            .json(call);

        if let Some(timeout) = metadata.timeout.or(config.timeout) {
            request = request.timeout(timeout);
        }

        let start_time = Instant::now();
        let response = request.send().await.map_err(map_send_error)?;
        self.parse_response(response, start_time).await
    }

    /// Reads the response and turns non-2xx statuses into [`ApiError`]s.
    async fn parse_response(
        &self,
        response: reqwest::Response,
        start_time: Instant,
    ) -> Result<Box<dyn Response>> {
        let status = response.status();
        let headers = response.headers().clone();
        let raw_body = response.text().await.map_err(map_send_error)?;
        let latency = start_time.elapsed();

        tracing::debug!(
            status = status.as_u16(),
            latency_ms = latency.as_millis(),
            "Received HTTP response"
        );

        let response = HttpResponse::new(raw_body, status, headers, latency);
        if status.is_success() {
            return Ok(Box::new(response));
        }

        let message = response.raw_body.clone();
        Err(ApiError::new(ErrorCode::from(status), message, Some(Box::new(response))).into())
    }
}

fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Network(e)
    }
}

impl Transport for HttpClient {
    fn send<'a>(
        &'a self,
        call: &'a serde_json::Value,
        opts: &'a [RequestOpt],
    ) -> impl Future<Output = Result<Box<dyn Response>>> + Send + 'a {
        self.execute_request(call, opts)
    }

    fn apply(&self, opt: &ClientOpt) -> ClientOpt {
        let mut config = self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        opt.apply(&mut config)
    }

    fn config(&self) -> Config {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Builder for configuring and creating an [`HttpClient`].
///
/// # Examples
///
/// ```no_run
/// use followcall::HttpClientBuilder;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), followcall::Error> {
/// let client = HttpClientBuilder::new()
///     .endpoint("http://10.0.0.1:5050/api/v1/scheduler")?
///     .timeout(Duration::from_secs(30))
///     .default_header("User-Agent", "my-framework/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HttpClientBuilder {
    endpoint: Option<Url>,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
}

impl HttpClientBuilder {
    /// Creates a new `HttpClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            default_headers: HeaderMap::new(),
            timeout: None,
        }
    }

    /// Sets the initial endpoint. Any candidate master will do; redirects
    /// lead the way to the current leader.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn endpoint(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.endpoint = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds a default header that will be included in all calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the configured `HttpClient`.
    ///
    /// # Errors
    ///
    /// Returns an error if no endpoint was provided or if the client
    /// configuration is invalid.
    pub fn build(self) -> Result<HttpClient> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| Error::ConfigurationError("Endpoint is required".to_string()))?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(HttpClient {
            inner: Arc::new(ClientInner {
                http_client,
                config: RwLock::new(Config {
                    endpoint: endpoint.into(),
                    timeout: self.timeout,
                    headers: self.default_headers,
                }),
            }),
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
