//! Loop pacing timers.
//!
//! - [`CountdownTimer`] - the pause between tasks, one tick per second
//! - [`InactivityMonitor`] - detects a stalled agent while the loop waits

mod countdown;
mod inactivity;

pub use countdown::{CountdownHandle, CountdownOutcome, CountdownTimer};
pub use inactivity::{InactivityMonitor, DEFAULT_CHECK_INTERVAL, DEFAULT_TIMEOUT};
