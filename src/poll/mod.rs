//! Fixed-interval background refresh.
//!
//! A [`Poller`] runs a task immediately and then once per interval, sending
//! each result down a channel. Cancelling the poller (explicitly, or by
//! dropping it) stops the loop; a result that completes after cancellation
//! is dropped rather than delivered.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Shortest period the loop will tick at.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running poll loop.
pub struct Poller {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Start polling `task` every `interval`. A zero interval is raised to
    /// [`MIN_INTERVAL`].
    ///
    /// Returns the handle and the receiving end of the result channel. The
    /// loop also stops once the receiver is dropped.
    pub fn spawn<F, Fut, T>(
        name: &'static str,
        interval: Duration,
        token: CancellationToken,
        mut task: F,
    ) -> (Self, mpsc::Receiver<T>)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let loop_token = token.clone();
        // tokio::time::interval panics on a zero period.
        let interval = interval.max(MIN_INTERVAL);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(poller = name, interval_ms = interval.as_millis(), "Poller started");

            loop {
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let output = tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    output = task() => output,
                };

                if loop_token.is_cancelled() {
                    debug!(poller = name, "Discarding poll result after cancellation");
                    break;
                }

                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    sent = tx.send(output) => {
                        if sent.is_err() {
                            debug!(poller = name, "Poll receiver dropped");
                            break;
                        }
                    }
                }
            }

            info!(poller = name, "Poller stopped");
        });

        (
            Self {
                token,
                handle: Some(handle),
            },
            rx,
        )
    }

    /// Stop polling. Any poll in flight is abandoned.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the poller has been told to stop.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
