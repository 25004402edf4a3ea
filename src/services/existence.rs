use crate::models::{QuestionError, QuestionId, QuestionRecord, RenderJob};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::collections::HashMap;
use std::fs;

/// File name prefix of every per-question clip
pub const CLIP_PREFIX: &str = "quiz_";

/// Suffix inserted before the extension while a render is in progress
const PARTIAL_MARKER: &str = ".partial";

/// Questions split into already-rendered clips and jobs still to run
#[derive(Debug, Default)]
pub struct RenderPlan {
    /// Clips that already exist, in question order
    pub existing: Vec<(QuestionId, Utf8PathBuf)>,
    /// Jobs for every question without a valid clip, in question order
    pub jobs: Vec<RenderJob>,
}

/// Decides whether a question's clip is already on disk.
///
/// Clip names are deterministic: `quiz_<id>.mp4` inside the output directory.
/// A clip counts as present only if it is a regular, non-empty file.
#[derive(Debug, Clone)]
pub struct ExistenceChecker {
    output_dir: Utf8PathBuf,

    /// Matches `quiz_<id>.mp4` and captures the id
    clip_pattern: Regex,
}

impl ExistenceChecker {
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            clip_pattern: Regex::new(r"^quiz_(.+)\.mp4$").expect("Invalid clip regex"),
        }
    }

    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Deterministic output path for a question id
    pub fn clip_path(&self, id: &QuestionId) -> Utf8PathBuf {
        self.output_dir
            .join(format!("{}{}.mp4", CLIP_PREFIX, file_safe(id)))
    }

    /// Temporary path a render writes to before it is moved into place
    pub fn partial_path(&self, id: &QuestionId) -> Utf8PathBuf {
        self.output_dir
            .join(format!("{}{}{}.mp4", CLIP_PREFIX, file_safe(id), PARTIAL_MARKER))
    }

    /// Whether the question already has a valid clip
    pub fn exists(&self, question: &QuestionRecord) -> bool {
        is_valid_clip(&self.clip_path(&question.id))
    }

    /// Make sure every question maps to its own clip file.
    ///
    /// Distinct ids can share a file name once path separators are replaced
    /// (`a/b` and `a_b`), and a textual id can land on the final video
    /// (`final` with the default final name).
    pub fn check_clip_names(
        &self,
        questions: &[QuestionRecord],
        final_video: &Utf8Path,
    ) -> std::result::Result<(), QuestionError> {
        let mut owners: HashMap<Utf8PathBuf, &QuestionId> = HashMap::new();

        for question in questions {
            let path = self.clip_path(&question.id);
            if path == final_video {
                return Err(QuestionError::FinalVideoCollision {
                    id: question.id.to_string(),
                    path: path.into_string(),
                });
            }
            if let Some(first) = owners.insert(path.clone(), &question.id) {
                return Err(QuestionError::ClipCollision {
                    first: first.to_string(),
                    second: question.id.to_string(),
                    path: path.into_string(),
                });
            }
        }

        Ok(())
    }

    /// Split `questions` into existing clips and the jobs that still need rendering
    pub fn plan(&self, questions: &[QuestionRecord]) -> RenderPlan {
        let mut plan = RenderPlan::default();

        for question in questions {
            let path = self.clip_path(&question.id);
            if is_valid_clip(&path) {
                tracing::debug!("Clip for question {} already exists: {}", question.id, path);
                plan.existing.push((question.id.clone(), path));
            } else {
                plan.jobs.push(RenderJob::new(question.clone(), path));
            }
        }

        tracing::info!(
            "{} questions already rendered, {} to render",
            plan.existing.len(),
            plan.jobs.len()
        );

        plan
    }

    /// Find every valid clip in the output directory, ordered by question id.
    ///
    /// Used when rendering is skipped entirely. Partial renders and files that
    /// do not follow the clip naming scheme are ignored, as is `exclude` (the
    /// final video, whose default name also matches the scheme). A missing
    /// output directory yields an empty list.
    pub fn discover(&self, exclude: Option<&Utf8Path>) -> Result<Vec<(QuestionId, Utf8PathBuf)>> {
        if !self.output_dir.exists() {
            tracing::warn!("Output directory {} does not exist", self.output_dir);
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.output_dir)
            .with_context(|| format!("Failed to read output directory: {}", self.output_dir))?;

        let mut clips = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read directory entry")?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };

            let Some(captures) = self.clip_pattern.captures(&name) else {
                continue;
            };
            let raw_id = &captures[1];
            if raw_id.ends_with(PARTIAL_MARKER) {
                continue;
            }

            let path = self.output_dir.join(&name);
            if exclude.is_some_and(|ex| ex == path.as_path()) {
                continue;
            }
            if is_valid_clip(&path) {
                clips.push((QuestionId::parse(raw_id), path));
            }
        }

        clips.sort_by(|a, b| a.0.cmp(&b.0));
        tracing::info!("Discovered {} existing clips in {}", clips.len(), self.output_dir);
        Ok(clips)
    }
}

/// A clip is valid when it is a regular file with a non-zero size
pub fn is_valid_clip(path: &Utf8Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

fn file_safe(id: &QuestionId) -> String {
    id.to_string().replace(['/', '\\'], "_")
}
