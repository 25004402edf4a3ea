// QuizReel - thermally-aware batch renderer for quiz question videos
//
// This is the library crate containing the scheduler and its collaborators.
// The binary crate (main.rs) provides the command-line entry point.

pub mod cli;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod services;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::RunMetrics;
pub use models::{QuestionId, QuestionRecord, RenderJob, RunConfig, RunReport, Settings};
pub use pipeline::Pipeline;
pub use scheduler::{BatchScheduler, PauseToken, PriorityController, ScheduleOutcome};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
