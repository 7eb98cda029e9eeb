//! Scoped configuration overrides.
//!
//! [`Override`] wraps a [`Caller`] and applies a connection option for the
//! duration of each call, plus request options that are added to every call.
//! The previous configuration is restored once the last overlapping call
//! through the same override returns, whatever the outcome.

use crate::caller::Caller;
use crate::request::RequestOpt;
use crate::response::Response;
use crate::transport::ClientOpt;
use crate::Result;
use std::borrow::Cow;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

/// Undoes a connection option when dropped.
pub(crate) struct Restore<'a, C: Caller> {
    caller: &'a C,
    undo: Option<ClientOpt>,
}

impl<'a, C: Caller> Restore<'a, C> {
    pub(crate) fn apply(caller: &'a C, opt: &ClientOpt) -> Self {
        let undo = caller.apply(opt);
        Self {
            caller,
            undo: Some(undo),
        }
    }
}

impl<C: Caller> Drop for Restore<'_, C> {
    fn drop(&mut self) {
        if let Some(undo) = self.undo.take() {
            self.caller.apply(&undo);
        }
    }
}

/// The calls currently inside one override, and how to undo it.
#[derive(Debug, Default)]
struct Window {
    active: usize,
    undo: Option<ClientOpt>,
}

/// Keeps an override applied while at least one call is inside it.
///
/// The first call in applies the option; the last call out applies the
/// inverse. Overlapping calls therefore never capture each other's change as
/// the state to restore.
struct WindowGuard<'a, C: Caller> {
    caller: &'a C,
    window: &'a Mutex<Window>,
}

impl<'a, C: Caller> WindowGuard<'a, C> {
    fn enter(caller: &'a C, opt: &ClientOpt, window: &'a Mutex<Window>) -> Self {
        let mut state = window.lock().unwrap_or_else(PoisonError::into_inner);
        if state.active == 0 {
            state.undo = Some(caller.apply(opt));
        }
        state.active += 1;
        drop(state);
        Self { caller, window }
    }
}

impl<C: Caller> Drop for WindowGuard<'_, C> {
    fn drop(&mut self) {
        let mut state = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        state.active -= 1;
        if state.active == 0 {
            if let Some(undo) = state.undo.take() {
                self.caller.apply(&undo);
            }
        }
    }
}

/// A caller that temporarily reconfigures its delegate for each call.
///
/// Overrides stack: each layer restores only its own change, and inner layers
/// restore before outer ones. Calls that overlap on one override share a
/// single application of its option, which is undone when the last of them
/// finishes.
///
/// # Examples
///
/// ```no_run
/// use followcall::{Caller, ClientOpt, HttpClient, Override, RedirectCaller, RequestOpt};
/// use http::{HeaderName, HeaderValue};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), followcall::Error> {
/// let transport = HttpClient::builder()
///     .endpoint("http://master.example:5050/api/v1/scheduler")?
///     .build()?;
///
/// // Subscriptions are long-lived, so lift the timeout and tag the stream.
/// let subscriber = Override::new(
///     RedirectCaller::new(transport, []),
///     ClientOpt::timeout(None),
///     [RequestOpt::header(
///         HeaderName::from_static("x-stream-purpose"),
///         HeaderValue::from_static("subscribe"),
///     )],
/// );
///
/// let response = subscriber.call(&serde_json::json!({"type": "SUBSCRIBE"}), &[]).await?;
/// println!("Subscribed: {}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Override<C> {
    delegate: C,
    opt: ClientOpt,
    request_opts: Vec<RequestOpt>,
    window: Mutex<Window>,
}

impl<C: Caller> Override<C> {
    /// Wraps `delegate` so that every call runs with `opt` applied and with
    /// `request_opts` added after the call's own request options.
    pub fn new(delegate: C, opt: ClientOpt, request_opts: impl IntoIterator<Item = RequestOpt>) -> Self {
        Self {
            delegate,
            opt,
            request_opts: request_opts.into_iter().collect(),
            window: Mutex::new(Window::default()),
        }
    }

    /// Returns the wrapped caller.
    pub fn get_ref(&self) -> &C {
        &self.delegate
    }

    /// Unwraps the override, returning the wrapped caller.
    pub fn into_inner(self) -> C {
        self.delegate
    }
}

impl<C: Caller> Caller for Override<C> {
    fn dispatch<'a>(
        &'a self,
        call: &'a serde_json::Value,
        opts: &'a [RequestOpt],
    ) -> impl Future<Output = Result<Box<dyn Response>>> + Send + 'a {
        async move {
            let _window = WindowGuard::enter(&self.delegate, &self.opt, &self.window);
            let opts = merge_request_opts(opts, &self.request_opts);
            self.delegate.dispatch(call, &opts).await
        }
    }

    fn apply(&self, opt: &ClientOpt) -> ClientOpt {
        self.delegate.apply(opt)
    }
}

/// Call-time options first, then the stored ones, so stored options win
/// where they conflict.
fn merge_request_opts<'a>(call: &'a [RequestOpt], stored: &'a [RequestOpt]) -> Cow<'a, [RequestOpt]> {
    if call.is_empty() {
        Cow::Borrowed(stored)
    } else if stored.is_empty() {
        Cow::Borrowed(call)
    } else {
        Cow::Owned(call.iter().chain(stored).cloned().collect())
    }
}
