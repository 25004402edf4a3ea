//! Cooldown pauses between units of work.
//!
//! A cooldown is plain wall-clock waiting unless throttling is requested, in
//! which case a [`ThrottlePolicy`] decides how the time is spent. Throttling is
//! best effort: a policy that cannot lower CPU usage further is equivalent to a
//! plain sleep.

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How idle time is spent during a throttled cooldown
#[async_trait]
pub trait ThrottlePolicy: Send + Sync + Debug {
    /// Spend `duration`, returning early once `stop` is cancelled
    async fn idle(&self, duration: Duration, stop: &CancellationToken);
}

/// One sleep for the whole duration
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainSleep;

#[async_trait]
impl ThrottlePolicy for PlainSleep {
    async fn idle(&self, duration: Duration, stop: &CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = stop.cancelled() => {}
        }
    }
}

/// Short sleeps interleaved with a tiny amount of no-op work and explicit yields.
///
/// Keeps the process from looking fully idle, so schedulers that boost idle
/// processes see a low-priority process that yields on every slice instead.
#[derive(Debug, Clone, Copy)]
pub struct YieldingThrottle {
    /// Length of each sleep slice
    pub slice: Duration,
    /// Iterations of no-op work between slices
    pub work_iterations: u32,
}

impl Default for YieldingThrottle {
    fn default() -> Self {
        Self {
            slice: Duration::from_millis(250),
            work_iterations: 1_000,
        }
    }
}

#[async_trait]
impl ThrottlePolicy for YieldingThrottle {
    async fn idle(&self, duration: Duration, stop: &CancellationToken) {
        let deadline = Instant::now() + duration;

        loop {
            let now = Instant::now();
            if now >= deadline || stop.is_cancelled() {
                break;
            }

            let nap = self.slice.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                _ = stop.cancelled() => break,
            }

            let mut acc = 0u64;
            for i in 0..self.work_iterations {
                acc = std::hint::black_box(acc.wrapping_add(u64::from(i)));
            }
            std::hint::black_box(acc);
            std::thread::yield_now();
            tokio::task::yield_now().await;
        }
    }
}

/// Inserts cooldown pauses between batches and (in sequential mode) between units
#[derive(Debug, Clone)]
pub struct CooldownController {
    throttle_policy: Arc<dyn ThrottlePolicy>,
}

impl CooldownController {
    pub fn new(throttle_policy: Arc<dyn ThrottlePolicy>) -> Self {
        Self { throttle_policy }
    }

    /// Pause for `duration`.
    ///
    /// With `throttle` set, the configured [`ThrottlePolicy`] spends the time;
    /// otherwise this is a plain sleep. A graceful stop ends the pause early.
    ///
    /// # Returns
    /// The time actually spent
    pub async fn pause(
        &self,
        duration: Duration,
        throttle: bool,
        stop: &CancellationToken,
    ) -> Duration {
        if duration.is_zero() {
            return Duration::ZERO;
        }

        let start = Instant::now();
        tracing::info!(
            "Cooling down for {:.0}s{}",
            duration.as_secs_f64(),
            if throttle { " (throttled)" } else { "" }
        );

        if throttle {
            self.throttle_policy.idle(duration, stop).await;
        } else {
            PlainSleep.idle(duration, stop).await;
        }

        start.elapsed()
    }
}

impl Default for CooldownController {
    fn default() -> Self {
        Self::new(Arc::new(YieldingThrottle::default()))
    }
}
