// Batch execution strategies
//
// Both strategies satisfy the same contract: take one batch, return one
// JobResult per started job in input order plus the jobs that were never
// started because a graceful stop arrived. The strategy is chosen once from
// the run configuration.

use crate::metrics::RunMetrics;
use crate::models::{JobResult, QuestionId, RenderJob, RunConfig};
use crate::scheduler::cooldown::CooldownController;
use crate::scheduler::pause::PauseToken;
use crate::services::{RenderUnit, is_valid_clip};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Everything a strategy needs from the coordinator for one batch
pub struct ExecutionContext<'a> {
    pub renderer: &'a Arc<dyn RenderUnit>,
    pub cooldown: &'a CooldownController,
    pub pause: &'a PauseToken,
    pub stop: &'a CancellationToken,
    pub metrics: &'a RunMetrics,
    pub cool_time: Duration,
    pub throttle: bool,
}

/// What a strategy hands back for one batch
#[derive(Debug, Default)]
pub struct BatchOutput {
    /// One result per started job, in input order
    pub results: Vec<JobResult>,
    /// Jobs never started because of a graceful stop, in input order
    pub not_started: Vec<RenderJob>,
}

#[async_trait]
pub trait BatchExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy cools down after every unit itself.
    ///
    /// When false the scheduler cools down once after each batch.
    fn cools_per_unit(&self) -> bool;

    async fn execute(&self, batch: Vec<RenderJob>, ctx: &ExecutionContext<'_>) -> BatchOutput;
}

/// Pick the strategy for a run
pub fn select_executor(config: &RunConfig) -> Box<dyn BatchExecutor> {
    if config.is_sequential() {
        Box::new(SequentialExecutor)
    } else {
        Box::new(ParallelExecutor::new(config.jobs))
    }
}

/// Invoke the RenderUnit for one job and turn the outcome into a [`JobResult`]
pub async fn render_one(renderer: &dyn RenderUnit, job: &RenderJob) -> JobResult {
    let start = Instant::now();
    let result = renderer.render(job).await;
    let elapsed = start.elapsed();

    match result {
        Ok(path) if is_valid_clip(&path) => {
            tracing::info!(
                "Question {} rendered in {:.1}s: {}",
                job.id(),
                elapsed.as_secs_f64(),
                path
            );
            JobResult::success(job.id().clone(), path, elapsed)
        }
        Ok(path) => {
            let reason = format!("renderer reported {} but the file is missing or empty", path);
            tracing::error!("Question {} failed: {}", job.id(), reason);
            JobResult::failure(job.id().clone(), reason, elapsed)
        }
        Err(e) => {
            tracing::error!("Question {} failed: {}", job.id(), e);
            JobResult::failure(job.id().clone(), e.to_string(), elapsed)
        }
    }
}

/// One unit at a time, in order, with a cooldown after every unit
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialExecutor;

#[async_trait]
impl BatchExecutor for SequentialExecutor {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn cools_per_unit(&self) -> bool {
        true
    }

    async fn execute(&self, batch: Vec<RenderJob>, ctx: &ExecutionContext<'_>) -> BatchOutput {
        let mut output = BatchOutput {
            results: Vec::with_capacity(batch.len()),
            not_started: Vec::new(),
        };
        let mut queue = batch.into_iter();

        while let Some(job) = queue.next() {
            if !ctx.stop.is_cancelled() && ctx.pause.wait_while_paused(ctx.stop).await {
                ctx.metrics.record_pause();
            }

            if ctx.stop.is_cancelled() {
                output.not_started.push(job);
                output.not_started.extend(queue.by_ref());
                break;
            }

            tracing::info!("Rendering question {}", job.id());
            output.results.push(render_one(ctx.renderer.as_ref(), &job).await);

            let spent = ctx.cooldown.pause(ctx.cool_time, ctx.throttle, ctx.stop).await;
            ctx.metrics.record_cooldown(spent);
        }

        output
    }
}

/// Bounded worker pool: at most `workers` RenderUnit calls in flight.
///
/// Workers are tokio tasks; a permit is taken before a task is spawned, so
/// extra jobs in a large batch queue behind the first `workers` ones. The whole
/// batch completes before the next one starts.
#[derive(Debug, Clone, Copy)]
pub struct ParallelExecutor {
    workers: usize,
}

impl ParallelExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

#[async_trait]
impl BatchExecutor for ParallelExecutor {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn cools_per_unit(&self) -> bool {
        false
    }

    async fn execute(&self, batch: Vec<RenderJob>, ctx: &ExecutionContext<'_>) -> BatchOutput {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles: Vec<(QuestionId, JoinHandle<JobResult>)> = Vec::with_capacity(batch.len());
        let mut output = BatchOutput::default();
        let mut queue = batch.into_iter();

        while let Some(job) = queue.next() {
            let permit = tokio::select! {
                biased;
                _ = ctx.stop.cancelled() => {
                    tracing::warn!("Stop requested - not starting question {}", job.id());
                    output.not_started.push(job);
                    output.not_started.extend(queue.by_ref());
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        // The semaphore is never closed while jobs remain
                        output.not_started.push(job);
                        output.not_started.extend(queue.by_ref());
                        break;
                    }
                },
            };

            // A pause raised mid-batch holds back units that have not started yet
            if ctx.pause.wait_while_paused(ctx.stop).await {
                ctx.metrics.record_pause();
            }
            if ctx.stop.is_cancelled() {
                tracing::warn!("Stop requested - not starting question {}", job.id());
                output.not_started.push(job);
                output.not_started.extend(queue.by_ref());
                break;
            }

            tracing::info!("Rendering question {}", job.id());
            let renderer = Arc::clone(ctx.renderer);
            let id = job.id().clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                render_one(renderer.as_ref(), &job).await
            });
            handles.push((id, handle));
        }

        // Awaiting in spawn order normalizes completion order back to input order
        for (id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Render task for question {} failed: {}", id, e);
                    JobResult::failure(id, format!("render task failed: {}", e), Duration::ZERO)
                }
            };
            output.results.push(result);
        }

        output
    }
}
