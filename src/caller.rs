//! Leader-following call dispatch.
//!
//! The [`Caller`] capability is shared by the redirect-aware caller and by
//! decorators stacked on top of it (see [`crate::Override`]).

use crate::backoff::{Notifier, NotifierStats};
use crate::opt::Opt;
use crate::redirect::{self, Classification};
use crate::request::RequestOpt;
use crate::response::Response;
use crate::temporary::Restore;
use crate::transport::{ClientOpt, Transport};
use crate::{Error, Result};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// How redirects are followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectSettings {
    /// Redirects followed per top-level call.
    pub max_attempts: usize,
    /// Wait before the first replay. Should be less than `max_backoff_period`.
    pub min_backoff_period: Duration,
    /// Upper bound on the wait between replays. Should be more than `min_backoff_period`.
    pub max_backoff_period: Duration,
}

/// The settings every [`RedirectCaller`] starts from.
pub const DEFAULT_REDIRECT_SETTINGS: RedirectSettings = RedirectSettings {
    max_attempts: 9,
    min_backoff_period: Duration::from_millis(500),
    max_backoff_period: Duration::from_secs(13),
};

impl Default for RedirectSettings {
    fn default() -> Self {
        DEFAULT_REDIRECT_SETTINGS
    }
}

/// A reversible change to a caller's [`RedirectSettings`].
pub type CallerOpt = Opt<RedirectSettings>;

impl Opt<RedirectSettings> {
    /// Sets the maximum number of redirects followed per call.
    pub fn max_redirects(max: usize) -> Self {
        Self::set(|s: &mut RedirectSettings| &mut s.max_attempts, max)
    }

    /// Sets the wait before the first replay.
    pub fn min_backoff_period(period: Duration) -> Self {
        Self::set(|s: &mut RedirectSettings| &mut s.min_backoff_period, period)
    }

    /// Sets the upper bound on the wait between replays.
    pub fn max_backoff_period(period: Duration) -> Self {
        Self::set(|s: &mut RedirectSettings| &mut s.max_backoff_period, period)
    }
}

/// Dispatches calls to the service.
///
/// All futures returned by a caller are `Send`, so calls can be driven from
/// spawned tasks.
pub trait Caller: Send + Sync {
    /// Dispatches an already marshaled call.
    fn dispatch<'a>(
        &'a self,
        call: &'a serde_json::Value,
        opts: &'a [RequestOpt],
    ) -> impl Future<Output = Result<Box<dyn Response>>> + Send + 'a;

    /// Applies a connection option to the underlying transport and returns
    /// its inverse.
    fn apply(&self, opt: &ClientOpt) -> ClientOpt;

    /// Marshals `call` to JSON once and dispatches it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if `call` cannot be marshaled;
    /// otherwise whatever [`Caller::dispatch`] returns.
    fn call<'a, M>(
        &'a self,
        call: &'a M,
        opts: &'a [RequestOpt],
    ) -> impl Future<Output = Result<Box<dyn Response>>> + Send + 'a
    where
        M: Serialize + ?Sized,
    {
        let marshaled =
            serde_json::to_value(call).map_err(|e| Error::SerializationFailed(e.to_string()));
        async move {
            let call = marshaled?;
            self.dispatch(&call, opts).await
        }
    }

    /// Runs `f` with `opt` applied, restoring the previous configuration
    /// before returning.
    ///
    /// Restoration also happens if `f` panics or the returned future is
    /// dropped before completion.
    ///
    /// Each window restores the configuration it found, so windows on a shared
    /// transport must nest. Calls from several tasks that need the same
    /// temporary change should go through one [`crate::Override`], whose
    /// overlapping calls share a single application of the option.
    fn with_temporary<'a, F, Fut>(
        &'a self,
        opt: &'a ClientOpt,
        f: F,
    ) -> impl Future<Output = Fut::Output> + Send + 'a
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future + Send + 'a,
        Self: Sized,
    {
        async move {
            let _restore = Restore::apply(self, opt);
            f().await
        }
    }
}

/// A caller that follows the service's leader across redirects.
///
/// When an attempt is answered with "not leader", the caller points its
/// transport at the advertised leader, waits for the backoff notifier, and
/// replays the call, up to [`RedirectSettings::max_attempts`] times per call.
///
/// The endpoint change is visible to every call sharing the transport.
/// Concurrent calls are not ordered relative to each other; a call started
/// after another call's redirect simply begins at the new leader.
///
/// # Examples
///
/// ```no_run
/// use followcall::{Caller, CallerOpt, HttpClient, HttpResponse, RedirectCaller};
///
/// # async fn example() -> Result<(), followcall::Error> {
/// let transport = HttpClient::builder()
///     .endpoint("http://master-1.example:5050/api/v1/scheduler")?
///     .build()?;
/// let caller = RedirectCaller::new(transport, [CallerOpt::max_redirects(3)]);
///
/// let response = caller.call(&serde_json::json!({"type": "SUBSCRIBE"}), &[]).await?;
/// if let Some(http) = response.downcast_ref::<HttpResponse>() {
///     println!("Leader answered: {}", http.raw_body);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RedirectCaller<T> {
    transport: T,
    settings: Mutex<RedirectSettings>,
    notifiers: Arc<NotifierStats>,
}

impl<T: Transport> RedirectCaller<T> {
    /// Creates a caller over `transport`, applying `opts` in order to the
    /// default settings.
    pub fn new(transport: T, opts: impl IntoIterator<Item = CallerOpt>) -> Self {
        let mut settings = DEFAULT_REDIRECT_SETTINGS;
        for opt in opts {
            opt.apply(&mut settings);
        }
        Self {
            transport,
            settings: Mutex::new(settings),
            notifiers: Arc::new(NotifierStats::default()),
        }
    }

    /// Changes the redirect settings and returns the inverse option.
    ///
    /// Calls already in progress keep the settings they started with.
    pub fn configure(&self, opt: &CallerOpt) -> CallerOpt {
        let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
        opt.apply(&mut settings)
    }

    /// Returns the current redirect settings.
    pub fn settings(&self) -> RedirectSettings {
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns counters for the backoff notifiers this caller has created.
    pub fn notifier_stats(&self) -> &NotifierStats {
        &self.notifiers
    }

    async fn follow_leader(
        &self,
        call: &serde_json::Value,
        opts: &[RequestOpt],
    ) -> Result<Box<dyn Response>> {
        let settings = self.settings();
        // Created on the first redirect only; dropping it cancels the timer.
        let mut backoff: Option<Notifier> = None;
        let mut attempt = 0;

        loop {
            let result = self.transport.send(call, opts).await;
            let redirect = match redirect::classify(result, &self.transport.endpoint()) {
                Classification::Final(result) => return result,
                Classification::Redirect(redirect) => redirect,
            };

            if attempt >= settings.max_attempts {
                return Err(Error::RedirectsExhausted {
                    attempts: attempt + 1,
                    endpoint: redirect.endpoint,
                });
            }

            tracing::info!(
                endpoint = %redirect.endpoint,
                attempt = attempt + 1,
                "Redirecting to new endpoint"
            );
            self.transport.apply(&ClientOpt::endpoint(redirect.endpoint));

            backoff
                .get_or_insert_with(|| {
                    Notifier::spawn(
                        settings.min_backoff_period,
                        settings.max_backoff_period,
                        Arc::clone(&self.notifiers),
                    )
                })
                .notified()
                .await;
            attempt += 1;
        }
    }
}

impl<T: Transport> Caller for RedirectCaller<T> {
    fn dispatch<'a>(
        &'a self,
        call: &'a serde_json::Value,
        opts: &'a [RequestOpt],
    ) -> impl Future<Output = Result<Box<dyn Response>>> + Send + 'a {
        self.follow_leader(call, opts)
    }

    fn apply(&self, opt: &ClientOpt) -> ClientOpt {
        self.transport.apply(opt)
    }
}
