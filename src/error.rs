//! Error types for leader-following calls.
//!
//! The taxonomy separates three things a caller may want to react to
//! differently:
//!
//! - [`Error::RedirectsExhausted`]: the service kept reporting that the
//!   contacted endpoint is not the leader, and the redirect budget ran out.
//! - [`Error::Protocol`]: the service claimed a leadership redirect but the
//!   response could not be used to find the new leader.
//! - Everything else ([`Error::Api`], [`Error::Network`], [`Error::Timeout`],
//!   ...) is produced by the transport and forwarded unchanged.

use crate::response::Response;
use http::StatusCode;
use std::fmt;

/// The main error type for dispatched calls.
///
/// # Examples
///
/// ```no_run
/// use followcall::{Caller, Error, HttpClient, RedirectCaller};
///
/// # async fn example() -> Result<(), Error> {
/// let transport = HttpClient::builder()
///     .endpoint("http://master.example:5050/api/v1/scheduler")?
///     .build()?;
/// let caller = RedirectCaller::new(transport, []);
///
/// match caller.call(&serde_json::json!({"type": "SUBSCRIBE"}), &[]).await {
///     Ok(response) => println!("Accepted with status {}", response.status()),
///     Err(Error::RedirectsExhausted { attempts, endpoint }) => {
///         eprintln!("No leader after {} attempts, last seen at {}", attempts, endpoint);
///     }
///     Err(Error::Protocol(e)) => eprintln!("Unusable redirect: {}", e),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred (connection failed, DNS lookup failed, etc.).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The attempt timed out.
    #[error("Request timed out")]
    Timeout,

    /// The service answered with a non-2xx status.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The service asked us to follow the leader, but did so in a way we
    /// could not act upon.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The service kept redirecting until the per-call redirect budget was spent.
    ///
    /// # Fields
    ///
    /// * `attempts` - The number of dispatches made, including the first one
    /// * `endpoint` - The endpoint advertised by the last redirect
    #[error("No leader reached after {attempts} attempts; last redirect pointed to {endpoint}")]
    RedirectsExhausted {
        /// The number of dispatches made
        attempts: usize,
        /// The endpoint named by the final redirect
        endpoint: String,
    },

    /// Failed to deserialize a response body into the expected type.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to marshal the call payload.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns `true` if the service reported that the contacted endpoint is
    /// not the leader.
    pub fn is_not_leader(&self) -> bool {
        self.code() == Some(ErrorCode::NOT_LEADER)
    }

    /// Returns the service error code, if this is an [`ApiError`].
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Api(e) => Some(e.code),
            _ => None,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Api(e) => Some(e.code.status()),
            Error::DeserializationFailed { status, .. } => Some(*status),
            Error::Network(e) => e.status(),
            _ => None,
        }
    }
}

/// A machine-readable service error code.
///
/// The service reports errors through HTTP status codes; this type names the
/// ones it documents. Codes it does not document are still representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(u16);

impl ErrorCode {
    /// The contacted endpoint is not the leader; the `Location` header names
    /// the one that is.
    pub const NOT_LEADER: ErrorCode = ErrorCode(307);
    pub const MALFORMED_REQUEST: ErrorCode = ErrorCode(400);
    pub const UNAUTHORIZED: ErrorCode = ErrorCode(401);
    pub const FORBIDDEN: ErrorCode = ErrorCode(403);
    pub const NOT_FOUND: ErrorCode = ErrorCode(404);
    pub const METHOD_NOT_ALLOWED: ErrorCode = ErrorCode(405);
    pub const NOT_ACCEPTABLE: ErrorCode = ErrorCode(406);
    pub const CONFLICT: ErrorCode = ErrorCode(409);
    pub const UNSUPPORTED_MEDIA_TYPE: ErrorCode = ErrorCode(415);
    pub const RATE_LIMIT_EXCEEDED: ErrorCode = ErrorCode(429);
    pub const INTERNAL_SERVER_ERROR: ErrorCode = ErrorCode(500);
    pub const NOT_IMPLEMENTED: ErrorCode = ErrorCode(501);
    pub const SERVICE_UNAVAILABLE: ErrorCode = ErrorCode(503);

    /// Returns the HTTP status this code is carried by.
    pub fn status(self) -> StatusCode {
        StatusCode::from_u16(self.0).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Returns the numeric code.
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns `true` for conditions that usually clear up on their own.
    ///
    /// This crate never retries these itself; the flag is for callers that
    /// implement their own retry policy.
    pub fn is_temporary(self) -> bool {
        matches!(self, Self::RATE_LIMIT_EXCEEDED | Self::SERVICE_UNAVAILABLE)
    }

    fn name(self) -> &'static str {
        match self {
            Self::NOT_LEADER => "not leader",
            Self::MALFORMED_REQUEST => "malformed request",
            Self::UNAUTHORIZED => "unauthorized",
            Self::FORBIDDEN => "forbidden",
            Self::NOT_FOUND => "not found",
            Self::METHOD_NOT_ALLOWED => "method not allowed",
            Self::NOT_ACCEPTABLE => "not acceptable",
            Self::CONFLICT => "conflict",
            Self::UNSUPPORTED_MEDIA_TYPE => "unsupported media type",
            Self::RATE_LIMIT_EXCEEDED => "rate limit exceeded",
            Self::INTERNAL_SERVER_ERROR => "internal server error",
            Self::NOT_IMPLEMENTED => "not implemented",
            Self::SERVICE_UNAVAILABLE => "service unavailable",
            _ => "unrecognized error",
        }
    }
}

impl From<StatusCode> for ErrorCode {
    fn from(status: StatusCode) -> Self {
        ErrorCode(status.as_u16())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

/// A structured error reported by the service.
///
/// The response the error was built from travels with it, because some codes
/// (notably [`ErrorCode::NOT_LEADER`]) carry information in headers.
#[derive(thiserror::Error, Debug)]
#[error("API error {code}: {message}")]
pub struct ApiError {
    /// The machine-readable error code
    pub code: ErrorCode,
    /// The body of the error response
    pub message: String,
    /// The response the error was decoded from, if the transport kept it
    pub response: Option<Box<dyn Response>>,
}

impl ApiError {
    /// Creates a new `ApiError`.
    pub fn new(
        code: ErrorCode,
        message: impl Into<String>,
        response: Option<Box<dyn Response>>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            response,
        }
    }
}

/// The service sent a leadership redirect that cannot be followed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The transport returned a response of a kind the redirect logic cannot read.
    #[error("expected well-formed HTTP response, found something else")]
    UnexpectedResponse,

    /// The `Location` header was missing, empty, or did not name a host.
    #[error("unable to compute new endpoint from redirect (location: {location:?})")]
    BadLocation {
        /// The raw `Location` header value, empty when absent
        location: String,
    },
}

/// A specialized `Result` type for dispatched calls.
pub type Result<T> = std::result::Result<T, Error>;
