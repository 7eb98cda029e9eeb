//! Recognizing "not the leader" answers and working out where the leader is.

use crate::error::{ApiError, ErrorCode, ProtocolError};
use crate::response::{HttpResponse, Response};
use crate::{Error, Result};
use url::Url;

/// A leadership redirect: the service said it is not the leader and named
/// the endpoint that should be tried next.
///
/// This is a control signal for the redirect loop, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectCondition {
    /// The full endpoint URL of the advertised leader.
    pub endpoint: String,
}

/// The verdict on one dispatch attempt.
#[derive(Debug)]
pub enum Classification {
    /// The attempt is finished, successfully or not.
    Final(Result<Box<dyn Response>>),
    /// The attempt should be replayed against another endpoint.
    Redirect(RedirectCondition),
}

/// Decides whether `result` is a leadership redirect.
///
/// Only an [`ApiError`] with [`ErrorCode::NOT_LEADER`] is considered. Its
/// response must be an [`HttpResponse`] carrying a usable `Location` header;
/// otherwise the attempt finishes with a [`ProtocolError`]. In every case the
/// redirect response is dropped before returning.
pub fn classify(result: Result<Box<dyn Response>>, current_endpoint: &str) -> Classification {
    let response = match result {
        Err(Error::Api(ApiError {
            code: ErrorCode::NOT_LEADER,
            response,
            ..
        })) => response,
        other => return Classification::Final(other),
    };

    let Some(response) = response.and_then(|r| r.downcast::<HttpResponse>()) else {
        return Classification::Final(Err(ProtocolError::UnexpectedResponse.into()));
    };

    tracing::info!(
        status = response.status.as_u16(),
        "Endpoint is not the leader; leadership may have changed"
    );

    let location = response.header("location").unwrap_or_default().to_string();
    drop(response);

    match build_new_endpoint(&location, current_endpoint) {
        Some(endpoint) => Classification::Redirect(RedirectCondition { endpoint }),
        None => Classification::Final(Err(ProtocolError::BadLocation { location }.into())),
    }
}

/// Computes the endpoint to use after a redirect.
///
/// The host and port of `current_endpoint` are replaced by those named in
/// `location`; everything else about the current endpoint is kept. `location`
/// may be a bare `host:port`, a scheme-relative `//host:port`, or a full URL.
///
/// Returns `None` if `location` is empty or names no host, or if the current
/// endpoint is not a valid URL.
///
/// # Examples
///
/// ```
/// use followcall::redirect::build_new_endpoint;
///
/// assert_eq!(
///     build_new_endpoint("b.example:5050", "http://a.example:5050/api/v1/scheduler").as_deref(),
///     Some("http://b.example:5050/api/v1/scheduler"),
/// );
/// assert_eq!(build_new_endpoint("", "http://a.example:5050/api/v1/scheduler"), None);
/// ```
pub fn build_new_endpoint(location: &str, current_endpoint: &str) -> Option<String> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }

    // Only the authority of the location matters; its scheme must not supply
    // a default port.
    let authority = match location.split_once("://") {
        Some((_, rest)) => rest,
        None => location.trim_start_matches("//"),
    };
    // Non-special scheme: keeps the port verbatim, even one that would be a
    // default for http or https.
    let target = Url::parse(&format!("leader://{}", authority)).ok()?;

    let host = target.host_str().filter(|h| !h.is_empty())?;
    let port = target.port();

    let mut endpoint = Url::parse(current_endpoint).ok()?;
    endpoint.set_host(Some(host)).ok()?;
    endpoint.set_port(port).ok()?;
    Some(endpoint.into())
}
