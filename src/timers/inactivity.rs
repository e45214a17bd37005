//! Inactivity detection while the loop waits on the agent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default time without activity before the monitor fires.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default interval between inactivity checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct MonitorState {
    last_activity: Instant,
    paused: bool,
    waiting: bool,
}

/// Fires a callback once when no activity was recorded for `timeout`.
///
/// The timeout is only evaluated while the monitor is waiting and not
/// paused. Pausing keeps the last activity time.
#[derive(Debug)]
pub struct InactivityMonitor {
    timeout: Duration,
    check_interval: Duration,
    state: Arc<Mutex<MonitorState>>,
    token: Option<CancellationToken>,
}

impl Default for InactivityMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_CHECK_INTERVAL)
    }
}

impl InactivityMonitor {
    #[must_use]
    pub fn new(timeout: Duration, check_interval: Duration) -> Self {
        Self {
            timeout,
            check_interval,
            state: Arc::new(Mutex::new(MonitorState {
                last_activity: Instant::now(),
                paused: false,
                waiting: false,
            })),
            token: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the durations; applies from the next `start`.
    pub fn set_durations(&mut self, timeout: Duration, check_interval: Duration) {
        self.timeout = timeout;
        self.check_interval = check_interval;
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arm the recurring check. Any previous run is cancelled and the
    /// activity clock restarts.
    pub fn start<F>(&mut self, on_timeout: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.stop();
        {
            let mut state = self.state();
            state.last_activity = Instant::now();
            state.paused = false;
        }

        let token = CancellationToken::new();
        self.token = Some(token.clone());
        let state = Arc::clone(&self.state);
        let timeout = self.timeout;
        let check_interval = self.check_interval;

        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(Instant::now() + check_interval, check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let expired = {
                    let state = state.lock().unwrap_or_else(PoisonError::into_inner);
                    state.waiting && !state.paused && state.last_activity.elapsed() >= timeout
                };
                if expired {
                    info!("No activity for {:?}", timeout);
                    token.cancel();
                    on_timeout();
                    return;
                }
            }
        });
    }

    pub fn record_activity(&self) {
        self.state().last_activity = Instant::now();
    }

    pub fn pause(&self) {
        self.state().paused = true;
    }

    pub fn resume(&self) {
        self.state().paused = false;
    }

    pub fn set_waiting(&self, waiting: bool) {
        self.state().waiting = waiting;
    }

    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.state().waiting
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Cancel the recurring check.
    pub fn stop(&mut self) {
        if let Some(token) = self.token.take() {
            debug!("Inactivity monitor stopped");
            token.cancel();
        }
    }
}

impl Drop for InactivityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counter() -> (Arc<AtomicU32>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicU32::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn monitor() -> InactivityMonitor {
        InactivityMonitor::new(Duration::from_secs(60), Duration::from_secs(10))
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_timeout() {
        let mut monitor = monitor();
        monitor.set_waiting(true);
        let (fired, on_timeout) = counter();
        monitor.start(on_timeout);

        advance(55).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        advance(10).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        advance(120).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_defers_timeout() {
        let mut monitor = monitor();
        monitor.set_waiting(true);
        let (fired, on_timeout) = counter();
        monitor.start(on_timeout);

        advance(45).await;
        monitor.record_activity();
        advance(45).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        advance(25).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_waiting_never_fires() {
        let mut monitor = monitor();
        let (fired, on_timeout) = counter();
        monitor.start(on_timeout);
        advance(300).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_suspends_and_resume_keeps_last_activity() {
        let mut monitor = monitor();
        monitor.set_waiting(true);
        let (fired, on_timeout) = counter();
        monitor.start(on_timeout);

        monitor.pause();
        advance(120).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        monitor.resume();
        advance(15).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels() {
        let mut monitor = monitor();
        monitor.set_waiting(true);
        let (fired, on_timeout) = counter();
        monitor.start(on_timeout);
        monitor.stop();
        monitor.stop();
        advance(120).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
