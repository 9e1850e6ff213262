//! Restartable countdown used for the door and movement timeouts.
//!
//! The timer itself never sleeps. The FSM loop asks for its [`Timer::deadline`] and waits
//! on [`expired`] inside `tokio::select!`.

use tokio::time::{Duration, Instant};

/// Restartable countdown.
#[derive(Debug, Clone)]
pub struct Timer {
    timer_active: bool,
    timeout_duration: Duration,
    start_time: Instant,
}

/// Creates a stopped timer.
pub fn new(timeout_duration: Duration) -> Timer {
    Timer {
        timer_active: false,
        timeout_duration,
        start_time: Instant::now(),
    }
}

impl Timer {
    /// (Re)starts the countdown from now.
    pub fn timer_start(&mut self) {
        self.timer_active = true;
        self.start_time = Instant::now();
    }

    /// Stops the countdown.
    pub fn timer_stop(&mut self) {
        self.timer_active = false;
    }

    /// `true` while counting down or expired but not yet stopped.
    pub fn is_active(&self) -> bool {
        self.timer_active
    }

    /// When the timer fires, or `None` if it is stopped.
    pub fn deadline(&self) -> Option<Instant> {
        self.timer_active.then(|| self.start_time + self.timeout_duration)
    }
}

/// Completes at `deadline`, or never if there is none.
pub async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
