//! Redirect loop and override behavior against a scripted in-memory transport.

use followcall::{
    ApiError, Caller, CallerOpt, ClientOpt, Config, Error, ErrorCode, HttpResponse, Override,
    ProtocolError, RedirectCaller, RequestMetadata, RequestOpt, Response, Result, Transport,
};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FOLLOWER: &str = "http://follower.example:5050/api/v1/scheduler";
const LEADER: &str = "http://leader.example:5050/api/v1/scheduler";

/// What one attempt saw when it reached the transport.
#[derive(Debug, Clone)]
struct Seen {
    config: Config,
    tags: Vec<String>,
}

/// Answers "not leader" (pointing at `leader`) from every endpoint but the
/// leader's, unless told to misbehave.
struct ScriptedTransport {
    config: Mutex<Config>,
    leader: String,
    location: Option<&'static str>,
    foreign_response: Option<Arc<AtomicUsize>>,
    latency: Duration,
    attempts: AtomicUsize,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedTransport {
    fn new(endpoint: &str, leader: &str) -> Self {
        Self {
            config: Mutex::new(Config::new(endpoint)),
            leader: leader.to_string(),
            location: Some("leader.example:5050"),
            foreign_response: None,
            latency: Duration::ZERO,
            attempts: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn answer(&self, endpoint: &str) -> Result<Box<dyn Response>> {
        if endpoint == self.leader {
            return Ok(Box::new(HttpResponse::new(
                "{}".to_string(),
                StatusCode::OK,
                HeaderMap::new(),
                Duration::ZERO,
            )));
        }

        let response: Box<dyn Response> = match &self.foreign_response {
            Some(drops) => Box::new(ForeignResponse(drops.clone())),
            None => {
                let mut headers = HeaderMap::new();
                if let Some(location) = self.location {
                    headers.insert("location", HeaderValue::from_static(location));
                }
                Box::new(HttpResponse::new(
                    String::new(),
                    StatusCode::TEMPORARY_REDIRECT,
                    headers,
                    Duration::ZERO,
                ))
            }
        };
        Err(ApiError::new(ErrorCode::NOT_LEADER, "", Some(response)).into())
    }
}

impl Transport for ScriptedTransport {
    fn send<'a>(
        &'a self,
        _call: &'a serde_json::Value,
        opts: &'a [RequestOpt],
    ) -> impl Future<Output = Result<Box<dyn Response>>> + Send + 'a {
        async move {
            tokio::task::yield_now().await;
            self.attempts.fetch_add(1, Ordering::SeqCst);

            let mut metadata = RequestMetadata::default();
            for opt in opts {
                opt.apply(&mut metadata);
            }
            let config = self.config();
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.seen.lock().unwrap().push(Seen {
                config: config.clone(),
                tags: metadata
                    .headers
                    .get_all("x-tag")
                    .iter()
                    .map(|v| v.to_str().unwrap().to_string())
                    .collect(),
            });

            self.answer(&config.endpoint)
        }
    }

    fn apply(&self, opt: &ClientOpt) -> ClientOpt {
        opt.apply(&mut self.config.lock().unwrap())
    }

    fn config(&self) -> Config {
        self.config.lock().unwrap().clone()
    }
}

/// A response kind the redirect logic does not understand. Counts drops.
#[derive(Debug)]
struct ForeignResponse(Arc<AtomicUsize>);

impl Drop for ForeignResponse {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl Response for ForeignResponse {
    fn status(&self) -> StatusCode {
        StatusCode::TEMPORARY_REDIRECT
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

fn fast(max: usize) -> Vec<CallerOpt> {
    vec![
        CallerOpt::max_redirects(max),
        CallerOpt::min_backoff_period(Duration::from_millis(1)),
        CallerOpt::max_backoff_period(Duration::from_millis(3)),
    ]
}

fn tag(value: &'static str) -> RequestOpt {
    RequestOpt::new(move |m| {
        m.headers.append("x-tag", HeaderValue::from_static(value));
    })
}

fn call() -> serde_json::Value {
    serde_json::json!({"type": "ACKNOWLEDGE"})
}

#[tokio::test]
async fn test_success_never_creates_notifier() {
    let caller = RedirectCaller::new(ScriptedTransport::new(LEADER, LEADER), fast(3));

    for _ in 0..5 {
        caller.dispatch(&call(), &[]).await.unwrap();
    }

    assert_eq!(caller.transport().attempts(), 5);
    assert_eq!(caller.notifier_stats().created(), 0);
}

#[tokio::test]
async fn test_exhaustion_counts_attempts() {
    // The advertised leader never becomes reachable.
    let caller = RedirectCaller::new(
        ScriptedTransport::new(FOLLOWER, "http://nowhere.example/"),
        fast(2),
    );

    let result = caller.dispatch(&call(), &[]).await;

    match result {
        Err(Error::RedirectsExhausted { attempts, endpoint }) => {
            assert_eq!(attempts, 3);
            assert_eq!(endpoint, LEADER);
        }
        other => panic!("Expected RedirectsExhausted, got {:?}", other),
    }
    assert_eq!(caller.transport().attempts(), 3);
    // One notifier for the whole call, released on exit.
    assert_eq!(caller.notifier_stats().created(), 1);
    assert_eq!(caller.notifier_stats().live(), 0);
}

#[tokio::test]
async fn test_zero_max_redirects_is_single_attempt() {
    let caller = RedirectCaller::new(ScriptedTransport::new(FOLLOWER, LEADER), fast(0));

    let result = caller.dispatch(&call(), &[]).await;

    assert!(matches!(
        result,
        Err(Error::RedirectsExhausted { attempts: 1, .. })
    ));
    assert_eq!(caller.transport().attempts(), 1);
    assert_eq!(caller.notifier_stats().created(), 0);
    // Nothing was followed, so the endpoint is unchanged.
    assert_eq!(caller.transport().endpoint(), FOLLOWER);
}

#[tokio::test]
async fn test_attempts_reset_per_call() {
    let transport = ScriptedTransport::new(FOLLOWER, LEADER);
    let caller = RedirectCaller::new(transport, fast(1));

    // Each call may follow one redirect; the budget is not shared.
    for _ in 0..3 {
        caller.dispatch(&call(), &[]).await.unwrap();
        caller.transport().apply(&ClientOpt::endpoint(FOLLOWER));
    }

    assert_eq!(caller.transport().attempts(), 6);
    assert_eq!(caller.notifier_stats().created(), 3);
    assert_eq!(caller.notifier_stats().live(), 0);
}

#[tokio::test]
async fn test_configure_changes_budget() {
    let caller = RedirectCaller::new(ScriptedTransport::new(FOLLOWER, LEADER), fast(0));

    let undo = caller.configure(&CallerOpt::max_redirects(1));
    caller.dispatch(&call(), &[]).await.unwrap();
    assert_eq!(caller.transport().endpoint(), LEADER);

    caller.configure(&undo);
    assert_eq!(caller.settings().max_attempts, 0);
}

#[tokio::test]
async fn test_unexpected_response_kind_is_released() {
    let drops = Arc::new(AtomicUsize::new(0));
    let mut transport = ScriptedTransport::new(FOLLOWER, LEADER);
    transport.foreign_response = Some(drops.clone());
    let caller = RedirectCaller::new(transport, fast(3));

    let result = caller.dispatch(&call(), &[]).await;

    assert!(matches!(
        result,
        Err(Error::Protocol(ProtocolError::UnexpectedResponse))
    ));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(caller.transport().attempts(), 1);
}

#[tokio::test]
async fn test_bad_location_is_not_retried() {
    let mut transport = ScriptedTransport::new(FOLLOWER, LEADER);
    transport.location = Some("");
    let caller = RedirectCaller::new(transport, fast(3));

    let result = caller.dispatch(&call(), &[]).await;

    assert!(matches!(
        result,
        Err(Error::Protocol(ProtocolError::BadLocation { .. }))
    ));
    assert_eq!(caller.transport().attempts(), 1);
    assert_eq!(caller.notifier_stats().created(), 0);
}

#[tokio::test]
async fn test_serialization_failure() {
    struct Unmarshalable;
    impl serde::Serialize for Unmarshalable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refusing to marshal"))
        }
    }

    let caller = RedirectCaller::new(ScriptedTransport::new(LEADER, LEADER), fast(3));
    let result = caller.call(&Unmarshalable, &[]).await;

    match result {
        Err(Error::SerializationFailed(msg)) => assert!(msg.contains("refusing")),
        other => panic!("Expected SerializationFailed, got {:?}", other),
    }
    assert_eq!(caller.transport().attempts(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_converge_on_leader() {
    let caller = Arc::new(RedirectCaller::new(
        ScriptedTransport::new(FOLLOWER, LEADER),
        fast(3),
    ));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let caller = Arc::clone(&caller);
            tokio::spawn(async move { caller.dispatch(&call(), &[]).await.map(|_| ()) })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(caller.transport().endpoint(), LEADER);
    assert_eq!(caller.notifier_stats().live(), 0);
}

#[tokio::test]
async fn test_override_request_opt_merge_order() {
    let caller = Override::new(
        RedirectCaller::new(ScriptedTransport::new(LEADER, LEADER), fast(3)),
        ClientOpt::noop(),
        [tag("y")],
    );

    caller.dispatch(&call(), &[tag("x")]).await.unwrap();
    caller.dispatch(&call(), &[]).await.unwrap();

    let seen = caller.get_ref().transport().seen();
    assert_eq!(seen[0].tags, vec!["x", "y"]);
    assert_eq!(seen[1].tags, vec!["y"]);
}

#[tokio::test]
async fn test_override_restores_after_failure() {
    let caller = Override::new(
        RedirectCaller::new(ScriptedTransport::new(FOLLOWER, LEADER), fast(0)),
        ClientOpt::timeout(Some(Duration::from_secs(1))),
        [],
    );
    let before = caller.get_ref().transport().config();

    let result = caller.dispatch(&call(), &[]).await;
    assert!(result.is_err());

    let seen = caller.get_ref().transport().seen();
    assert_eq!(seen[0].config.timeout, Some(Duration::from_secs(1)));
    assert_eq!(caller.get_ref().transport().config(), before);
}

fn slow_leader() -> ScriptedTransport {
    let mut transport = ScriptedTransport::new(LEADER, LEADER);
    transport.latency = Duration::from_millis(5);
    transport
}

#[tokio::test]
async fn test_overlapping_override_calls_restore_once() {
    let caller = Override::new(
        RedirectCaller::new(slow_leader(), fast(0)),
        ClientOpt::timeout(Some(Duration::from_secs(1))),
        [],
    );
    let before = caller.get_ref().transport().config();

    // The second call enters while the first still holds the override.
    let second = async {
        tokio::task::yield_now().await;
        caller.dispatch(&call(), &[]).await
    };
    let first_call = call();
    let (first, second) = tokio::join!(caller.dispatch(&first_call, &[]), second);
    first.unwrap();
    second.unwrap();

    for seen in caller.get_ref().transport().seen() {
        assert_eq!(seen.config.timeout, Some(Duration::from_secs(1)));
    }
    assert_eq!(caller.get_ref().transport().config(), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_override_shared_across_tasks_restores() {
    let caller = Arc::new(Override::new(
        RedirectCaller::new(slow_leader(), fast(0)),
        ClientOpt::timeout(Some(Duration::from_secs(1))),
        [],
    ));
    let before = caller.get_ref().transport().config();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let caller = Arc::clone(&caller);
            tokio::spawn(async move { caller.dispatch(&call(), &[]).await.map(|_| ()) })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let seen = caller.get_ref().transport().seen();
    assert_eq!(seen.len(), 8);
    assert!(seen
        .iter()
        .all(|s| s.config.timeout == Some(Duration::from_secs(1))));
    assert_eq!(caller.get_ref().transport().config(), before);

    // A later call applies the override afresh.
    caller.dispatch(&call(), &[]).await.unwrap();
    assert_eq!(
        caller.get_ref().transport().seen()[8].config.timeout,
        Some(Duration::from_secs(1))
    );
    assert_eq!(caller.get_ref().transport().config(), before);
}

#[tokio::test]
async fn test_nested_overrides_unwind_innermost_first() {
    let outer_name = HeaderName::from_static("x-outer");
    let inner_name = HeaderName::from_static("x-inner");

    let inner = Override::new(
        RedirectCaller::new(ScriptedTransport::new(LEADER, LEADER), fast(0)),
        ClientOpt::all([
            ClientOpt::header(inner_name.clone(), HeaderValue::from_static("1")),
            ClientOpt::timeout(Some(Duration::from_secs(2))),
        ]),
        [tag("inner")],
    );
    let outer = Override::new(
        inner,
        ClientOpt::all([
            ClientOpt::header(outer_name.clone(), HeaderValue::from_static("1")),
            ClientOpt::timeout(Some(Duration::from_secs(9))),
        ]),
        [tag("outer")],
    );
    let transport = || outer.get_ref().get_ref().transport();
    let before = transport().config();

    outer.dispatch(&call(), &[tag("call")]).await.unwrap();

    let seen = transport().seen();
    assert!(seen[0].config.headers.contains_key(&outer_name));
    assert!(seen[0].config.headers.contains_key(&inner_name));
    // The inner layer was applied last, so its timeout was in effect.
    assert_eq!(seen[0].config.timeout, Some(Duration::from_secs(2)));
    assert_eq!(seen[0].tags, vec!["call", "outer", "inner"]);

    // Restoring the inner layer first brings back the outer timeout, which the
    // outer layer then replaces with the original.
    assert_eq!(transport().config(), before);
}

#[tokio::test]
async fn test_with_temporary_covers_several_calls() {
    let caller = RedirectCaller::new(ScriptedTransport::new(FOLLOWER, LEADER), fast(0));
    let opt = ClientOpt::endpoint(LEADER);

    let outcome = caller
        .with_temporary(&opt, || async {
            caller.dispatch(&call(), &[]).await?;
            caller.dispatch(&call(), &[]).await?;
            Ok::<_, Error>(caller.transport().endpoint())
        })
        .await
        .unwrap();

    assert_eq!(outcome, LEADER);
    assert_eq!(caller.transport().endpoint(), FOLLOWER);
}

#[tokio::test]
async fn test_with_temporary_restores_after_panic() {
    let caller = Arc::new(RedirectCaller::new(
        ScriptedTransport::new(FOLLOWER, LEADER),
        fast(0),
    ));
    let before = caller.transport().config();

    let task = {
        let caller = Arc::clone(&caller);
        tokio::spawn(async move {
            let opt = ClientOpt::timeout(Some(Duration::from_secs(4)));
            caller
                .with_temporary(&opt, || async {
                    assert_eq!(
                        caller.transport().config().timeout,
                        Some(Duration::from_secs(4))
                    );
                    panic!("call site blew up");
                })
                .await
        })
    };

    assert!(task.await.unwrap_err().is_panic());
    assert_eq!(caller.transport().config(), before);
}
