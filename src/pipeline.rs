//! End-to-end run: existence filtering, scheduling, concatenation, report.
//!
//! The pipeline owns no policy of its own. It asks the [`ExistenceChecker`]
//! what still needs rendering, hands that to the [`BatchScheduler`], and merges
//! the clips that already existed with the ones rendered this run, in question
//! order, before calling the [`Concatenator`].

use crate::metrics::RunMetrics;
use crate::models::{JobOutcome, JobResult, QuestionId, QuestionRecord, RunConfig, RunReport};
use crate::scheduler::{BatchScheduler, CooldownController, PauseToken};
use crate::services::{Concatenator, ExistenceChecker, RenderUnit};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::fs;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct Pipeline {
    config: RunConfig,
    checker: ExistenceChecker,
    renderer: Arc<dyn RenderUnit>,
    concatenator: Arc<dyn Concatenator>,
    cooldown: CooldownController,
    pause: Arc<PauseToken>,
    stop: CancellationToken,
    metrics: Arc<RunMetrics>,
}

impl Pipeline {
    pub fn new(
        config: RunConfig,
        renderer: Arc<dyn RenderUnit>,
        concatenator: Arc<dyn Concatenator>,
        pause: Arc<PauseToken>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            checker: ExistenceChecker::new(config.output_dir.clone()),
            config,
            renderer,
            concatenator,
            cooldown: CooldownController::default(),
            pause,
            stop,
            metrics: Arc::new(RunMetrics::new()),
        }
    }

    pub fn with_cooldown(mut self, cooldown: CooldownController) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn metrics(&self) -> &Arc<RunMetrics> {
        &self.metrics
    }

    /// Render whatever is missing from `questions`, then merge everything.
    ///
    /// Render and merge failures end up in the report; only setup problems
    /// (unwritable output directory, invalid configuration) are errors here.
    pub async fn run(&self, questions: Vec<QuestionRecord>) -> Result<RunReport> {
        let start = Instant::now();

        if self.config.skip_rendering {
            tracing::info!("Rendering skipped - concatenating existing clips only");
            return self.concat_existing(start).await;
        }

        self.checker
            .check_clip_names(&questions, &self.config.final_path())
            .context("Question ids do not map to distinct clip files")?;

        fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!("Failed to create output directory: {}", self.config.output_dir)
        })?;

        let plan = self.checker.plan(&questions);
        self.metrics.record_skipped_existing(plan.existing.len());

        let scheduler = BatchScheduler::new(
            Arc::clone(&self.renderer),
            Arc::clone(&self.pause),
            self.stop.clone(),
            Arc::clone(&self.metrics),
        )
        .with_cooldown(self.cooldown.clone());

        let outcome = scheduler
            .run(plan.jobs, &self.config)
            .await
            .context("Scheduling failed")?;

        let mut report = RunReport {
            skipped_existing: plan.existing.iter().map(|(id, _)| id.clone()).collect(),
            pending: outcome.pending,
            interrupted: outcome.interrupted,
            ..Default::default()
        };

        let mut clips = plan.existing;
        for JobResult { id, outcome, .. } in outcome.results {
            match outcome {
                JobOutcome::Success(path) => {
                    report.succeeded.push(id.clone());
                    clips.push((id, path));
                }
                JobOutcome::Failure(reason) => report.failed.push((id, reason)),
            }
        }
        report.concat_inputs = ordered_paths(clips);

        if report.interrupted {
            tracing::warn!("Run interrupted - final video not assembled");
        } else {
            self.concatenate(&mut report).await;
        }

        report.elapsed = start.elapsed();
        Ok(report)
    }

    async fn concat_existing(&self, start: Instant) -> Result<RunReport> {
        let final_path = self.config.final_path();
        let clips = self.checker.discover(Some(&final_path))?;
        self.metrics.record_skipped_existing(clips.len());

        let mut report = RunReport {
            skipped_existing: clips.iter().map(|(id, _)| id.clone()).collect(),
            concat_inputs: ordered_paths(clips),
            ..Default::default()
        };

        self.concatenate(&mut report).await;
        report.elapsed = start.elapsed();
        Ok(report)
    }

    async fn concatenate(&self, report: &mut RunReport) {
        let final_path = self.config.final_path();
        match self
            .concatenator
            .concatenate(&report.concat_inputs, &final_path)
            .await
        {
            Ok(path) => report.final_video = Some(path),
            Err(e) => {
                tracing::error!("Concatenation failed: {}", e);
                report.concat_error = Some(e.to_string());
            }
        }
    }
}

/// Clip paths sorted by question id
fn ordered_paths(mut clips: Vec<(QuestionId, Utf8PathBuf)>) -> Vec<Utf8PathBuf> {
    clips.sort_by(|a, b| a.0.cmp(&b.0));
    clips.into_iter().map(|(_, path)| path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerOption, RenderJob};
    use crate::services::RenderError;
    use crate::services::concat::{ConcatError, MockConcatenator};
    use async_trait::async_trait;
    use camino::Utf8Path;
    use std::time::Duration;
    use tempfile::TempDir;

    struct WritingRenderer;

    #[async_trait]
    impl RenderUnit for WritingRenderer {
        async fn render(&self, job: &RenderJob) -> Result<Utf8PathBuf, RenderError> {
            if job.id() == &QuestionId::Numeric(3) {
                return Err(RenderError::Other("font missing".into()));
            }
            std::fs::write(&job.output_path, b"clip")?;
            Ok(job.output_path.clone())
        }
    }

    fn question(id: u64) -> QuestionRecord {
        QuestionRecord::new(
            QuestionId::Numeric(id),
            format!("Question {}", id),
            vec![
                AnswerOption { label: "yes".into(), is_correct: true },
                AnswerOption { label: "no".into(), is_correct: false },
            ],
        )
        .unwrap()
    }

    fn config(dir: &TempDir) -> RunConfig {
        RunConfig {
            output_dir: Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap(),
            cool_time: Duration::ZERO,
            ..Default::default()
        }
    }

    fn pipeline(config: RunConfig, concat: MockConcatenator) -> Pipeline {
        Pipeline::new(
            config,
            Arc::new(WritingRenderer),
            Arc::new(concat),
            Arc::new(PauseToken::new(Duration::from_secs(30))),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_merges_existing_and_new_clips_in_order() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        std::fs::write(config.output_dir.join("quiz_2.mp4"), b"old").unwrap();

        let expected = vec![
            config.output_dir.join("quiz_1.mp4"),
            config.output_dir.join("quiz_2.mp4"),
            config.output_dir.join("quiz_4.mp4"),
        ];
        let final_path = config.final_path();

        let mut concat = MockConcatenator::new();
        concat
            .expect_concatenate()
            .withf(move |clips, output| clips == expected.as_slice() && output == final_path.as_path())
            .times(1)
            .returning(|_, output: &Utf8Path| Ok(output.to_path_buf()));

        let report = pipeline(config, concat)
            .run(vec![question(1), question(2), question(3), question(4)])
            .await
            .unwrap();

        assert_eq!(report.succeeded, vec![QuestionId::Numeric(1), QuestionId::Numeric(4)]);
        assert_eq!(report.skipped_existing, vec![QuestionId::Numeric(2)]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, QuestionId::Numeric(3));
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_concat_failure_is_reported() {
        let dir = TempDir::new().unwrap();

        let mut concat = MockConcatenator::new();
        concat
            .expect_concatenate()
            .returning(|_, _| Err(ConcatError::EmptyInput));

        let report = pipeline(config(&dir), concat)
            .run(vec![question(3)])
            .await
            .unwrap();

        assert!(report.concat_inputs.is_empty());
        assert!(report.concat_error.is_some());
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_interrupted_run_skips_concatenation() {
        let dir = TempDir::new().unwrap();
        let mut concat = MockConcatenator::new();
        concat.expect_concatenate().never();

        let stop = CancellationToken::new();
        stop.cancel();
        let pipeline = Pipeline::new(
            config(&dir),
            Arc::new(WritingRenderer),
            Arc::new(concat),
            Arc::new(PauseToken::new(Duration::from_secs(30))),
            stop,
        );

        let report = pipeline.run(vec![question(1), question(2)]).await.unwrap();

        assert!(report.interrupted);
        assert_eq!(report.pending, vec![QuestionId::Numeric(1), QuestionId::Numeric(2)]);
        assert!(report.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_final_cooldown_still_concatenates() {
        let dir = TempDir::new().unwrap();
        let config = RunConfig {
            jobs: 2,
            batch_size: 2,
            cool_time: Duration::from_secs(20),
            ..config(&dir)
        };

        let mut concat = MockConcatenator::new();
        concat
            .expect_concatenate()
            .times(1)
            .returning(|_, output| Ok(output.to_path_buf()));

        let stop = CancellationToken::new();
        let pipeline = Pipeline::new(
            config,
            Arc::new(WritingRenderer),
            Arc::new(concat),
            Arc::new(PauseToken::new(Duration::from_secs(30))),
            stop.clone(),
        );

        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let report = pipeline.run(vec![question(1), question(2)]).await.unwrap();

        assert!(stop.is_cancelled());
        assert!(!report.interrupted);
        assert!(report.pending.is_empty());
        assert_eq!(report.succeeded.len(), 2);
        assert!(report.final_video.is_some());
    }

    #[tokio::test]
    async fn test_colliding_clip_names_abort_before_rendering() {
        let dir = TempDir::new().unwrap();
        let mut concat = MockConcatenator::new();
        concat.expect_concatenate().never();

        let final_id = QuestionRecord::new(
            QuestionId::Text("final".into()),
            "Last one?",
            vec![AnswerOption { label: "yes".into(), is_correct: true }],
        )
        .unwrap();

        let err = pipeline(config(&dir), concat)
            .run(vec![question(1), final_id])
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("would render over the final video"));
        assert!(!dir.path().join("quiz_1.mp4").exists());
    }

    #[tokio::test]
    async fn test_skip_rendering_uses_discovered_clips() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.skip_rendering = true;
        std::fs::write(config.output_dir.join("quiz_10.mp4"), b"x").unwrap();
        std::fs::write(config.output_dir.join("quiz_9.mp4"), b"x").unwrap();
        std::fs::write(config.final_path(), b"previous final").unwrap();

        let out = config.output_dir.clone();
        let mut concat = MockConcatenator::new();
        concat
            .expect_concatenate()
            .withf(move |clips, _| {
                clips == [out.join("quiz_9.mp4"), out.join("quiz_10.mp4")].as_slice()
            })
            .times(1)
            .returning(|_, output| Ok(output.to_path_buf()));

        let report = pipeline(config, concat).run(Vec::new()).await.unwrap();

        assert!(report.succeeded.is_empty());
        assert_eq!(report.skipped_existing.len(), 2);
        assert!(report.final_video.is_some());
    }
}
