use crate::models::question::{QuestionId, QuestionRecord};
use camino::Utf8PathBuf;
use std::fmt;
use std::time::Duration;

/// One question scheduled for rendering
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub question: QuestionRecord,
    pub output_path: Utf8PathBuf,
}

impl RenderJob {
    pub fn new(question: QuestionRecord, output_path: Utf8PathBuf) -> Self {
        Self {
            question,
            output_path,
        }
    }

    pub fn id(&self) -> &QuestionId {
        &self.question.id
    }
}

/// Outcome of a single RenderUnit invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success(Utf8PathBuf),
    Failure(String),
}

/// Result of one render job, recorded by the scheduler in input order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub id: QuestionId,
    pub outcome: JobOutcome,
    pub elapsed: Duration,
}

impl JobResult {
    pub fn success(id: QuestionId, path: Utf8PathBuf, elapsed: Duration) -> Self {
        Self {
            id,
            outcome: JobOutcome::Success(path),
            elapsed,
        }
    }

    pub fn failure(id: QuestionId, reason: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            id,
            outcome: JobOutcome::Failure(reason.into()),
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Success(_))
    }

    /// Path of the rendered clip, if the job succeeded
    pub fn output_path(&self) -> Option<&Utf8PathBuf> {
        match &self.outcome {
            JobOutcome::Success(path) => Some(path),
            JobOutcome::Failure(_) => None,
        }
    }
}

/// End-of-run report.
///
/// Produced for every run, including interrupted ones and runs whose final
/// concatenation failed. The [`fmt::Display`] impl renders the user-facing
/// summary.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Questions rendered successfully during this run
    pub succeeded: Vec<QuestionId>,
    /// Questions whose render failed, with the reason
    pub failed: Vec<(QuestionId, String)>,
    /// Questions whose clip already existed and were not re-rendered
    pub skipped_existing: Vec<QuestionId>,
    /// Questions never started because the run was interrupted
    pub pending: Vec<QuestionId>,
    /// True when a graceful stop cut the run short
    pub interrupted: bool,
    /// Ordered clip list handed to the concatenator
    pub concat_inputs: Vec<Utf8PathBuf>,
    /// Path of the merged video when concatenation succeeded
    pub final_video: Option<Utf8PathBuf>,
    /// Reason the final merge failed, if it did
    pub concat_error: Option<String>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Whether the process should exit with status 0.
    ///
    /// Interrupted runs are a clean partial completion. Otherwise the final
    /// merge must have succeeded.
    pub fn is_success(&self) -> bool {
        if self.interrupted {
            return self.concat_error.is_none();
        }
        self.final_video.is_some() && self.concat_error.is_none()
    }
}

fn join_ids(ids: &[QuestionId]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.interrupted {
            "PARTIAL (interrupted)"
        } else if self.is_success() {
            "COMPLETE"
        } else {
            "FAILED"
        };

        writeln!(f, "=== Render summary: {} ===", status)?;
        writeln!(
            f,
            "Succeeded ({}): {}",
            self.succeeded.len(),
            join_ids(&self.succeeded)
        )?;
        writeln!(
            f,
            "Skipped existing ({}): {}",
            self.skipped_existing.len(),
            join_ids(&self.skipped_existing)
        )?;
        writeln!(f, "Failed ({}):", self.failed.len())?;
        for (id, reason) in &self.failed {
            writeln!(f, "  {}: {}", id, reason)?;
        }
        if !self.pending.is_empty() {
            writeln!(
                f,
                "Not started ({}): {}",
                self.pending.len(),
                join_ids(&self.pending)
            )?;
        }
        match (&self.final_video, &self.concat_error) {
            (Some(path), _) => writeln!(f, "Final video: {}", path)?,
            (None, Some(err)) => writeln!(f, "Final video: not produced ({})", err)?,
            (None, None) => writeln!(f, "Final video: not produced")?,
        }
        write!(f, "Elapsed: {:.1}s", self.elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_result_accessors() {
        let ok = JobResult::success(
            QuestionId::Numeric(1),
            Utf8PathBuf::from("out/quiz_1.mp4"),
            Duration::from_secs(3),
        );
        let bad = JobResult::failure(QuestionId::Numeric(2), "boom", Duration::ZERO);

        assert!(ok.is_success());
        assert_eq!(ok.output_path().map(|p| p.as_str()), Some("out/quiz_1.mp4"));
        assert!(!bad.is_success());
        assert!(bad.output_path().is_none());
    }

    #[test]
    fn test_report_success_rules() {
        let mut report = RunReport::default();
        assert!(!report.is_success());

        report.final_video = Some(Utf8PathBuf::from("out/final.mp4"));
        assert!(report.is_success());

        let interrupted = RunReport {
            interrupted: true,
            ..Default::default()
        };
        assert!(interrupted.is_success());
    }

    #[test]
    fn test_summary_lists_every_category() {
        let report = RunReport {
            succeeded: vec![QuestionId::Numeric(1)],
            failed: vec![(QuestionId::Numeric(2), "exit code 1".into())],
            skipped_existing: vec![QuestionId::Numeric(3)],
            pending: vec![QuestionId::Numeric(4)],
            interrupted: true,
            ..Default::default()
        };

        let text = report.to_string();
        assert!(text.contains("PARTIAL"));
        assert!(text.contains("Succeeded (1): 1"));
        assert!(text.contains("2: exit code 1"));
        assert!(text.contains("Skipped existing (1): 3"));
        assert!(text.contains("Not started (1): 4"));
    }
}
