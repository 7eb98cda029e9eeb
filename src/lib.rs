//! # Followcall - leader-following calls to master/replica services
//!
//! Cluster-management services often run several candidate masters, of which
//! only the elected leader accepts calls. A non-leader answers with a
//! "not leader" error and a `Location` header naming the leader it knows of.
//! Followcall hides this: a [`RedirectCaller`] notices the redirect, points its
//! transport at the advertised leader, waits a little, and replays the call.
//!
//! ## Quick Start
//!
//! ```no_run
//! use followcall::{Caller, CallerOpt, HttpClient, HttpResponse, RedirectCaller};
//! use serde::Serialize;
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct Call {
//!     #[serde(rename = "type")]
//!     kind: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), followcall::Error> {
//!     // Any candidate master will do as a starting point.
//!     let transport = HttpClient::builder()
//!         .endpoint("http://master-1.example:5050/api/v1/scheduler")?
//!         .timeout(Duration::from_secs(10))
//!         .build()?;
//!
//!     let caller = RedirectCaller::new(transport, [CallerOpt::max_redirects(5)]);
//!
//!     let response = caller
//!         .call(&Call { kind: "SUBSCRIBE".to_string() }, &[])
//!         .await?;
//!
//!     if let Some(http) = response.downcast_ref::<HttpResponse>() {
//!         println!("Leader answered in {:?}", http.latency);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Leader following** - "not leader" answers are turned into an endpoint
//!   change and a replay, bounded per call by [`RedirectSettings::max_attempts`]
//! - **Paced retries** - replays wait on a jittered, doubling backoff between a
//!   minimum and maximum period; the timer only exists while a call is redirecting
//! - **Reversible options** - every [`Opt`] returns its own inverse, so any change
//!   can be made permanently or just for a while
//! - **Scoped overrides** - [`Override`] and [`Caller::with_temporary`] change
//!   the connection (endpoint, timeout, headers) for one operation and restore
//!   it afterwards, even on failure or panic
//! - **Clear errors** - an exhausted redirect budget, an unusable redirect, and
//!   ordinary transport failures are distinct [`Error`] variants
//! - **Structured logging** with `tracing`
//!
//! ## Error Handling
//!
//! ```no_run
//! use followcall::{Caller, Error, ErrorCode, HttpClient, RedirectCaller};
//!
//! # async fn example() -> Result<(), Error> {
//! # let transport = HttpClient::builder().endpoint("http://master.example:5050/api/v1/scheduler")?.build()?;
//! let caller = RedirectCaller::new(transport, []);
//!
//! match caller.call(&serde_json::json!({"type": "RECONCILE"}), &[]).await {
//!     Ok(response) => println!("Accepted: {}", response.status()),
//!     Err(Error::RedirectsExhausted { attempts, .. }) => {
//!         eprintln!("Leadership did not settle after {} attempts", attempts);
//!     }
//!     Err(Error::Api(e)) if e.code.is_temporary() => {
//!         eprintln!("Service busy, try again later: {}", e);
//!     }
//!     Err(Error::Api(e)) if e.code == ErrorCode::MALFORMED_REQUEST => {
//!         eprintln!("Rejected: {}", e.message);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod backoff;
mod caller;
mod client;
mod error;
pub mod opt;
pub mod redirect;
pub mod request;
mod response;
mod temporary;
mod transport;

pub use caller::{Caller, CallerOpt, RedirectCaller, RedirectSettings, DEFAULT_REDIRECT_SETTINGS};
pub use client::{HttpClient, HttpClientBuilder};
pub use error::{ApiError, Error, ErrorCode, ProtocolError, Result};
pub use opt::Opt;
pub use request::{RequestMetadata, RequestOpt};
pub use response::{HttpResponse, Response};
pub use temporary::Override;
pub use transport::{ClientOpt, Config, Transport};
