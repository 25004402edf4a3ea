//! Batch scheduling of render jobs.
//!
//! The coordinator partitions the job list into fixed-size batches and runs
//! them one after another through a [`BatchExecutor`]. Between batches it
//! honours pause requests, graceful stops and cooldowns. Results always come
//! back in input order, whatever order the units finished in.

pub mod cooldown;
pub mod executor;
pub mod pause;
pub mod priority;

pub use cooldown::{CooldownController, PlainSleep, ThrottlePolicy, YieldingThrottle};
pub use executor::{
    BatchExecutor, BatchOutput, ExecutionContext, ParallelExecutor, SequentialExecutor,
    render_one, select_executor,
};
pub use pause::{PauseSignalHandler, PauseToken};
pub use priority::{PriorityController, PriorityError};

use crate::metrics::RunMetrics;
use crate::models::{ConfigError, JobResult, QuestionId, RenderJob, RunConfig};
use crate::services::RenderUnit;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid run configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Split `items` into consecutive chunks of at most `batch_size`, preserving order.
///
/// Only the last chunk may be shorter. No chunk is ever empty, and an empty
/// input produces no chunks. `batch_size` must be greater than zero.
pub fn partition<T>(items: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    debug_assert!(batch_size > 0);
    let size = batch_size.max(1);

    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut current = Vec::with_capacity(size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == size {
            batches.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Coordinator-owned bookkeeping for one run
#[derive(Debug)]
struct BatchState {
    queue: VecDeque<Vec<RenderJob>>,
    total_batches: usize,
    completed_batches: usize,
    results: Vec<JobResult>,
}

impl BatchState {
    fn new(jobs: Vec<RenderJob>, batch_size: usize) -> Self {
        let queue: VecDeque<_> = partition(jobs, batch_size).into();
        Self {
            total_batches: queue.len(),
            queue,
            completed_batches: 0,
            results: Vec::new(),
        }
    }

    fn next_batch(&mut self) -> Option<Vec<RenderJob>> {
        self.queue.pop_front()
    }

    /// Put jobs that were never started back at the head of the queue
    fn defer(&mut self, jobs: Vec<RenderJob>) {
        if !jobs.is_empty() {
            self.queue.push_front(jobs);
        }
    }

    fn complete(&mut self, results: Vec<JobResult>) {
        self.completed_batches += 1;
        self.results.extend(results);
    }

    fn pending_ids(&self) -> Vec<QuestionId> {
        self.queue
            .iter()
            .flatten()
            .map(|job| job.id().clone())
            .collect()
    }
}

/// What a scheduler run produced
#[derive(Debug, Clone, Default)]
pub struct ScheduleOutcome {
    /// One result per started job, in input order
    pub results: Vec<JobResult>,
    /// Jobs never started, in input order
    pub pending: Vec<QuestionId>,
    /// True when a graceful stop was requested during the run
    pub interrupted: bool,
    pub batches_run: usize,
    pub elapsed: Duration,
}

/// Drives jobs through batches, cooldowns and pause checkpoints
pub struct BatchScheduler {
    renderer: Arc<dyn RenderUnit>,
    cooldown: CooldownController,
    pause: Arc<PauseToken>,
    stop: CancellationToken,
    metrics: Arc<RunMetrics>,
}

impl BatchScheduler {
    pub fn new(
        renderer: Arc<dyn RenderUnit>,
        pause: Arc<PauseToken>,
        stop: CancellationToken,
        metrics: Arc<RunMetrics>,
    ) -> Self {
        Self {
            renderer,
            cooldown: CooldownController::default(),
            pause,
            stop,
            metrics,
        }
    }

    pub fn with_cooldown(mut self, cooldown: CooldownController) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn metrics(&self) -> &Arc<RunMetrics> {
        &self.metrics
    }

    /// Run every job, batch by batch.
    ///
    /// Individual render failures are recorded and never abort the run. A
    /// graceful stop lets in-flight units finish and leaves the rest pending.
    pub async fn run(
        &self,
        jobs: Vec<RenderJob>,
        config: &RunConfig,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        config.validate()?;

        let start = Instant::now();
        let executor = select_executor(config);
        let job_count = jobs.len();
        let mut state = BatchState::new(jobs, config.batch_size);

        tracing::info!(
            "Scheduling {} questions in {} batches of up to {} ({} mode, {} workers)",
            job_count,
            state.total_batches,
            config.batch_size,
            executor.name(),
            if config.is_sequential() { 1 } else { config.jobs }
        );

        let ctx = ExecutionContext {
            renderer: &self.renderer,
            cooldown: &self.cooldown,
            pause: &self.pause,
            stop: &self.stop,
            metrics: &self.metrics,
            cool_time: config.cool_time,
            throttle: config.throttle,
        };

        while let Some(batch) = state.next_batch() {
            if !self.stop.is_cancelled() && self.pause.wait_while_paused(&self.stop).await {
                self.metrics.record_pause();
            }

            if self.stop.is_cancelled() {
                tracing::warn!("Stop requested - no further batches will start");
                state.defer(batch);
                break;
            }

            let batch_no = state.completed_batches + 1;
            tracing::info!(
                "Batch {}/{}: questions [{}]",
                batch_no,
                state.total_batches,
                batch
                    .iter()
                    .map(|job| job.id().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            let output = executor.execute(batch, &ctx).await;
            self.record_results(&output.results);

            let ok = output.results.iter().filter(|r| r.is_success()).count();
            tracing::info!(
                "Batch {}/{} complete: {} ok, {} failed",
                batch_no,
                state.total_batches,
                ok,
                output.results.len() - ok
            );

            state.complete(output.results);

            if !output.not_started.is_empty() {
                state.defer(output.not_started);
                break;
            }

            if !executor.cools_per_unit() {
                let spent = self
                    .cooldown
                    .pause(config.cool_time, config.throttle, &self.stop)
                    .await;
                self.metrics.record_cooldown(spent);
            }
        }

        let pending = state.pending_ids();
        // A stop that lands after the last batch leaves nothing unrendered
        let interrupted = self.stop.is_cancelled() && !pending.is_empty();
        if interrupted {
            tracing::warn!(
                "Run interrupted after {} of {} batches, {} questions not started",
                state.completed_batches,
                state.total_batches,
                pending.len()
            );
        }

        Ok(ScheduleOutcome {
            results: state.results,
            pending,
            interrupted,
            batches_run: state.completed_batches,
            elapsed: start.elapsed(),
        })
    }

    fn record_results(&self, results: &[JobResult]) {
        for result in results {
            if result.is_success() {
                self.metrics.record_rendered(result.elapsed);
            } else {
                self.metrics.record_failed(result.elapsed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_exact_and_remainder() {
        let batches = partition((1..=5).collect(), 2);
        assert_eq!(batches, vec![vec![1, 2], vec![3, 4], vec![5]]);

        let batches = partition((1..=4).collect(), 2);
        assert_eq!(batches, vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_partition_empty_input() {
        let batches: Vec<Vec<u32>> = partition(Vec::new(), 3);
        assert!(batches.is_empty());
    }

    #[test]
    fn test_partition_batch_larger_than_input() {
        let batches = partition(vec!['a', 'b'], 10);
        assert_eq!(batches, vec![vec!['a', 'b']]);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        struct NeverRenders;

        #[async_trait::async_trait]
        impl RenderUnit for NeverRenders {
            async fn render(
                &self,
                _job: &RenderJob,
            ) -> Result<camino::Utf8PathBuf, crate::services::RenderError> {
                unreachable!("no job should run")
            }
        }

        let scheduler = BatchScheduler::new(
            Arc::new(NeverRenders),
            Arc::new(PauseToken::new(Duration::from_secs(30))),
            CancellationToken::new(),
            Arc::new(RunMetrics::new()),
        );
        let config = RunConfig {
            batch_size: 0,
            ..Default::default()
        };

        let err = scheduler.run(Vec::new(), &config).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Config(ConfigError::InvalidBatchSize)));
    }
}
