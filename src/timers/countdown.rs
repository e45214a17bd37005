//! Cancellable one-second countdown.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How a countdown run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    /// Reached zero.
    Completed,
    /// Stopped, or replaced by a newer run.
    Cancelled,
}

/// Awaitable result of one countdown run.
#[derive(Debug)]
pub struct CountdownHandle {
    join: JoinHandle<CountdownOutcome>,
}

impl CountdownHandle {
    /// Wait for the run to finish.
    pub async fn wait(self) -> CountdownOutcome {
        self.join.await.unwrap_or(CountdownOutcome::Cancelled)
    }
}

/// Countdown that ticks once per second down to and including zero.
///
/// At most one run is live: starting again cancels the previous run.
///
/// # Example
///
/// ```rust,no_run
/// use prdloop::timers::{CountdownOutcome, CountdownTimer};
///
/// # async fn demo() {
/// let mut timer = CountdownTimer::new();
/// let handle = timer.start(3, |remaining| println!("{remaining}"));
/// assert_eq!(handle.wait().await, CountdownOutcome::Completed);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct CountdownTimer {
    token: Option<CancellationToken>,
}

impl CountdownTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run. `on_tick` sees `seconds` immediately, then every second
    /// until it has seen 0.
    pub fn start<F>(&mut self, seconds: u32, mut on_tick: F) -> CountdownHandle
    where
        F: FnMut(u32) + Send + 'static,
    {
        self.stop();
        let token = CancellationToken::new();
        self.token = Some(token.clone());

        let join = tokio::spawn(async move {
            on_tick(seconds);
            let mut remaining = seconds;
            while remaining > 0 {
                tokio::select! {
                    () = token.cancelled() => {
                        debug!("Countdown cancelled at {}", remaining);
                        return CountdownOutcome::Cancelled;
                    }
                    () = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
                remaining -= 1;
                on_tick(remaining);
            }
            token.cancel();
            CountdownOutcome::Completed
        });

        CountdownHandle { join }
    }

    /// Cancel the live run, if any.
    pub fn stop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_cancelled())
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
