//! Submission pacing for batch fan-out.
//!
//! A direct governor rate limiter models the upstream quota as a burst over a
//! window. Submitters ask for budget before dispatching a worker; when the
//! bucket is dry they get back the pause to sleep before trying again. This
//! paces submissions only; in-flight concurrency is bounded separately by the
//! batch orchestrator's semaphore.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone)]
pub struct PacingGate {
    limiter: Arc<DirectRateLimiter>,
    pause: Duration,
}

impl PacingGate {
    /// `burst_limit` submissions may pass per `window`; once exhausted,
    /// callers are told to sleep `pause` before retrying.
    pub fn new(window: Duration, burst_limit: u32, pause: Duration) -> Self {
        let quota = quota_from_window(window, burst_limit);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            pause,
        }
    }

    /// Tries to take submission budget. `Err` carries the recommended pause.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        if self.limiter.check().is_ok() {
            Ok(())
        } else {
            Err(self.pause)
        }
    }

    /// Waits until budget is available.
    pub async fn acquire(&self) {
        while let Err(pause) = self.try_acquire() {
            tokio::time::sleep(pause).await;
        }
    }
}

fn quota_from_window(window: Duration, burst_limit: u32) -> Quota {
    let safe_limit = burst_limit.max(1);
    let burst = NonZeroU32::new(safe_limit).expect("safe limit must be non-zero");

    let seconds_per_cell = (window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .expect("period is always greater than zero")
        .allow_burst(burst)
}
