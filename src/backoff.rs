//! Pacing for redirect retries.
//!
//! A [`Notifier`] runs a small timer task that publishes a notification each
//! time a caller may proceed. Waits start at a minimum period and double up to
//! a maximum, with jitter so that callers redirected at the same moment do not
//! stampede the new leader together.

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Counts notifiers created by one owner and how many are still alive.
#[derive(Debug, Default)]
pub struct NotifierStats {
    created: AtomicUsize,
    live: AtomicUsize,
}

impl NotifierStats {
    /// The number of notifiers ever created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// The number of notifiers not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// A cancellable source of backoff notifications.
///
/// Dropping the notifier fires its cancellation signal, which stops the timer
/// task immediately.
#[derive(Debug)]
pub struct Notifier {
    ticks: mpsc::Receiver<()>,
    // Held only so that dropping it cancels the timer task.
    _cancel: oneshot::Sender<()>,
    stats: Arc<NotifierStats>,
}

impl Notifier {
    /// Spawns the timer task. Must be called from within a Tokio runtime.
    ///
    /// Reversed bounds are swapped and periods below one millisecond are
    /// raised to one millisecond.
    pub fn spawn(min: Duration, max: Duration, stats: Arc<NotifierStats>) -> Self {
        let (min, max) = if max < min { (max, min) } else { (min, max) };
        let (min, max) = (min.max(MIN_PERIOD), max.max(MIN_PERIOD));

        let (tx, ticks) = mpsc::channel(1);
        let (cancel, mut cancelled) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut period = min;
            loop {
                let delay = jittered(period, max);
                tokio::select! {
                    _ = &mut cancelled => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                tokio::select! {
                    _ = &mut cancelled => break,
                    sent = tx.send(()) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
                period = period.saturating_mul(2).min(max);
            }
        });

        stats.created.fetch_add(1, Ordering::SeqCst);
        stats.live.fetch_add(1, Ordering::SeqCst);
        Self {
            ticks,
            _cancel: cancel,
            stats,
        }
    }

    /// Waits for the next notification.
    ///
    /// Returns immediately if the timer task is gone, so the wait is always
    /// bounded.
    pub async fn notified(&mut self) {
        let _ = self.ticks.recv().await;
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.stats.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Adds up to 50% jitter to `period`, never exceeding `max`.
fn jittered(period: Duration, max: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(1.0..=1.5);
    Duration::try_from_secs_f64(period.as_secs_f64() * factor)
        .unwrap_or(max)
        .min(max)
        .max(period.min(max))
}
