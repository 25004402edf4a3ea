//! Data models for QuizReel.
//!
//! - [`QuestionRecord`]: one quiz question from the question bank, ordered by [`QuestionId`]
//! - [`RenderJob`] / [`JobResult`]: a unit of render work and its recorded outcome
//! - [`RunReport`]: end-of-run summary (succeeded / failed / skipped-existing / pending)
//! - [`Settings`]: the on-disk settings file, merged with CLI values into a [`RunConfig`]
//!
//! `RunConfig` is immutable for the duration of a run; question records are
//! immutable once loaded.

pub mod config;
pub mod job;
pub mod question;

pub use config::{
    ConcatSettings, ConfigError, RendererSettings, RunConfig, RunOverrides, Settings,
};
pub use job::{JobOutcome, JobResult, RenderJob, RunReport};
pub use question::{AnswerOption, QuestionError, QuestionId, QuestionRecord, load_questions};
