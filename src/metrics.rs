// Run metrics
//
// Lightweight counters for one render run, logged as a summary at the end

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters for a single run.
///
/// Uses atomic operations so the coordinator can share it behind an `Arc`
/// without locks. Render results are folded in by the coordinator after each
/// batch, never by workers.
#[derive(Debug)]
pub struct RunMetrics {
    /// Questions rendered successfully
    pub units_rendered: AtomicUsize,

    /// Questions whose render failed
    pub units_failed: AtomicUsize,

    /// Questions skipped because their clip already existed
    pub units_skipped_existing: AtomicUsize,

    /// Total time spent inside RenderUnit calls, in milliseconds
    pub total_render_time_ms: AtomicU64,

    /// Number of cooldown pauses taken
    pub cooldowns: AtomicU64,

    /// Total time spent cooling down, in milliseconds
    pub total_cooldown_time_ms: AtomicU64,

    /// Number of checkpoints that had to wait for a pause signal to expire
    pub pauses: AtomicU64,

    /// Run start time
    start_time: Instant,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            units_rendered: AtomicUsize::new(0),
            units_failed: AtomicUsize::new(0),
            units_skipped_existing: AtomicUsize::new(0),
            total_render_time_ms: AtomicU64::new(0),
            cooldowns: AtomicU64::new(0),
            total_cooldown_time_ms: AtomicU64::new(0),
            pauses: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_rendered(&self, render_time: Duration) {
        self.units_rendered.fetch_add(1, Ordering::Relaxed);
        self.record_render_time(render_time);
    }

    pub fn record_failed(&self, render_time: Duration) {
        self.units_failed.fetch_add(1, Ordering::Relaxed);
        self.record_render_time(render_time);
    }

    pub fn record_skipped_existing(&self, count: usize) {
        self.units_skipped_existing.fetch_add(count, Ordering::Relaxed);
    }

    fn record_render_time(&self, duration: Duration) {
        self.total_render_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record one cooldown invocation and the time it took
    pub fn record_cooldown(&self, spent: Duration) {
        self.cooldowns.fetch_add(1, Ordering::Relaxed);
        self.total_cooldown_time_ms
            .fetch_add(spent.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_pause(&self) {
        self.pauses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cooldown_count(&self) -> u64 {
        self.cooldowns.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average render time per attempted question in milliseconds
    pub fn avg_render_time_ms(&self) -> f64 {
        let total = self.total_render_time_ms.load(Ordering::Relaxed);
        let count = self.units_rendered.load(Ordering::Relaxed)
            + self.units_failed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Run Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Questions: {} rendered, {} failed, {} already present",
            self.units_rendered.load(Ordering::Relaxed),
            self.units_failed.load(Ordering::Relaxed),
            self.units_skipped_existing.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Render time: {:.2}s (avg: {:.0}ms per question)",
            self.total_render_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_render_time_ms()
        );
        tracing::info!(
            "Cooldowns: {} ({:.0}s total), pauses observed: {}",
            self.cooldowns.load(Ordering::Relaxed),
            self.total_cooldown_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.pauses.load(Ordering::Relaxed)
        );
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = RunMetrics::new();
        assert_eq!(metrics.units_rendered.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.cooldown_count(), 0);
    }

    #[test]
    fn test_record_outcomes() {
        let metrics = RunMetrics::new();

        metrics.record_rendered(Duration::from_millis(100));
        metrics.record_rendered(Duration::from_millis(300));
        metrics.record_failed(Duration::from_millis(200));
        metrics.record_skipped_existing(4);

        assert_eq!(metrics.units_rendered.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.units_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.units_skipped_existing.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.total_render_time_ms.load(Ordering::Relaxed), 600);
        assert_eq!(metrics.avg_render_time_ms(), 200.0);
    }

    #[test]
    fn test_avg_render_time_nothing_rendered() {
        let metrics = RunMetrics::new();
        assert_eq!(metrics.avg_render_time_ms(), 0.0);
    }

    #[test]
    fn test_cooldowns_and_pauses() {
        let metrics = RunMetrics::new();

        metrics.record_cooldown(Duration::from_secs(20));
        metrics.record_cooldown(Duration::from_secs(5));
        metrics.record_pause();

        assert_eq!(metrics.cooldown_count(), 2);
        assert_eq!(metrics.total_cooldown_time_ms.load(Ordering::Relaxed), 25_000);
        assert_eq!(metrics.pauses.load(Ordering::Relaxed), 1);
    }
}
