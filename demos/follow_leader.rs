//! Subscribes through whichever master is the current leader.
//!
//! Usage: `cargo run --example follow_leader -- http://master-1:5050/api/v1/scheduler`

use followcall::{
    Caller, CallerOpt, ClientOpt, Error, HttpClient, HttpResponse, Override, RedirectCaller,
    Transport,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("followcall=info".parse().unwrap()),
        )
        .init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:5050/api/v1/scheduler".to_string());

    let transport = HttpClient::builder()
        .endpoint(&endpoint)?
        .timeout(Duration::from_secs(5))
        .build()?;

    let caller = RedirectCaller::new(
        transport,
        [
            CallerOpt::max_redirects(4),
            CallerOpt::min_backoff_period(Duration::from_millis(200)),
        ],
    );

    // The subscription itself must not time out.
    let subscriber = Override::new(caller, ClientOpt::timeout(None), []);

    let subscribe = serde_json::json!({
        "type": "SUBSCRIBE",
        "subscribe": { "framework_info": { "user": "demo", "name": "followcall demo" } }
    });

    match subscriber.call(&subscribe, &[]).await {
        Ok(response) => {
            if let Some(http) = response.downcast_ref::<HttpResponse>() {
                let leader = subscriber.get_ref().transport().endpoint();
                println!("Subscribed via {} ({:?})", leader, http.latency);
                println!("{}", http.raw_body);
            }
        }
        Err(Error::RedirectsExhausted { attempts, endpoint }) => {
            eprintln!(
                "Leadership never settled ({} attempts, last pointed at {})",
                attempts, endpoint
            );
        }
        Err(e) => eprintln!("Subscription failed: {}", e),
    }

    Ok(())
}
