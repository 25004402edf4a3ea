use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Lowest scheduling priority on Unix (highest niceness)
pub const DEFAULT_NICE: i32 = 19;
pub const DEFAULT_COOL_TIME_SECS: u64 = 20;
pub const DEFAULT_PAUSE_SECS: u64 = 30;
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 600;

/// Settings file model (`quizreel.yaml`).
///
/// Every key is optional in the file; missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Question bank JSON
    pub questions: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub final_name: String,
    pub jobs: usize,
    pub nice: i32,
    pub batch_size: usize,
    pub cool_time_secs: u64,
    pub throttle: bool,
    pub sequential: bool,
    /// Watchdog per render, 0 disables it
    pub render_timeout_secs: u64,
    pub pause_secs: u64,
    pub renderer: RendererSettings,
    pub concat: ConcatSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            questions: Utf8PathBuf::from("data/questions.json"),
            output_dir: Utf8PathBuf::from("output"),
            final_name: "quiz_final.mp4".to_string(),
            jobs: 1,
            nice: DEFAULT_NICE,
            batch_size: 1,
            cool_time_secs: DEFAULT_COOL_TIME_SECS,
            throttle: false,
            sequential: false,
            render_timeout_secs: DEFAULT_RENDER_TIMEOUT_SECS,
            pause_secs: DEFAULT_PAUSE_SECS,
            renderer: RendererSettings::default(),
            concat: ConcatSettings::default(),
        }
    }
}

/// External render command.
///
/// Arguments may contain the placeholders `{id}`, `{output}`, `{question}`
/// (the question as JSON) and `{questions}` (the question bank path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            program: "quiz-render".to_string(),
            args: vec![
                "--id".to_string(),
                "{id}".to_string(),
                "--question".to_string(),
                "{question}".to_string(),
                "--output".to_string(),
                "{output}".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcatSettings {
    pub ffmpeg: String,
    /// Clip prepended to the final video when present
    pub intro_clip: Option<Utf8PathBuf>,
}

impl Default for ConcatSettings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            intro_clip: None,
        }
    }
}

/// Command-line values that take precedence over [`Settings`]
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub questions: Option<Utf8PathBuf>,
    pub output_dir: Option<Utf8PathBuf>,
    pub final_name: Option<String>,
    pub jobs: Option<usize>,
    pub nice: Option<i32>,
    pub batch_size: Option<usize>,
    pub cool_time_secs: Option<u64>,
    pub render_timeout_secs: Option<u64>,
    pub throttle: bool,
    pub sequential: bool,
    pub skip_rendering: bool,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("Job count must be greater than zero")]
    InvalidJobs,

    #[error("Nice level {0} is outside the range -20..=19")]
    InvalidNice(i32),

    #[error("Final video name must not be empty")]
    EmptyFinalName,
}

/// Immutable configuration for a single run
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub questions: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub final_name: String,
    pub jobs: usize,
    pub nice: i32,
    pub batch_size: usize,
    pub cool_time: Duration,
    pub throttle: bool,
    pub sequential: bool,
    pub skip_rendering: bool,
    pub render_timeout: Option<Duration>,
    pub pause_duration: Duration,
    pub renderer: RendererSettings,
    pub concat: ConcatSettings,
}

impl RunConfig {
    /// Merge settings with command-line overrides and validate the result
    pub fn resolve(settings: &Settings, overrides: &RunOverrides) -> Result<Self, ConfigError> {
        let config = Self::merge(settings, overrides);
        config.validate()?;
        Ok(config)
    }

    fn merge(settings: &Settings, overrides: &RunOverrides) -> Self {
        let render_timeout_secs = overrides
            .render_timeout_secs
            .unwrap_or(settings.render_timeout_secs);

        Self {
            questions: overrides
                .questions
                .clone()
                .unwrap_or_else(|| settings.questions.clone()),
            output_dir: overrides
                .output_dir
                .clone()
                .unwrap_or_else(|| settings.output_dir.clone()),
            final_name: overrides
                .final_name
                .clone()
                .unwrap_or_else(|| settings.final_name.clone()),
            jobs: overrides.jobs.unwrap_or(settings.jobs),
            nice: overrides.nice.unwrap_or(settings.nice),
            batch_size: overrides.batch_size.unwrap_or(settings.batch_size),
            cool_time: Duration::from_secs(
                overrides.cool_time_secs.unwrap_or(settings.cool_time_secs),
            ),
            throttle: overrides.throttle || settings.throttle,
            sequential: overrides.sequential || settings.sequential,
            skip_rendering: overrides.skip_rendering,
            render_timeout: (render_timeout_secs > 0)
                .then(|| Duration::from_secs(render_timeout_secs)),
            pause_duration: Duration::from_secs(settings.pause_secs),
            renderer: settings.renderer.clone(),
            concat: settings.concat.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.jobs == 0 {
            return Err(ConfigError::InvalidJobs);
        }
        if !(-20..=19).contains(&self.nice) {
            return Err(ConfigError::InvalidNice(self.nice));
        }
        if self.final_name.trim().is_empty() {
            return Err(ConfigError::EmptyFinalName);
        }
        Ok(())
    }

    /// True when units run one at a time
    pub fn is_sequential(&self) -> bool {
        self.sequential || self.jobs == 1
    }

    pub fn final_path(&self) -> Utf8PathBuf {
        self.output_dir.join(&self.final_name)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::merge(&Settings::default(), &RunOverrides::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.jobs, 1);
        assert_eq!(settings.nice, 19);
        assert_eq!(settings.batch_size, 1);
        assert_eq!(settings.cool_time_secs, 20);
        assert_eq!(settings.pause_secs, 30);
        assert!(!settings.throttle);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let settings = Settings {
            jobs: 4,
            batch_size: 3,
            ..Default::default()
        };
        let overrides = RunOverrides {
            jobs: Some(2),
            cool_time_secs: Some(5),
            throttle: true,
            ..Default::default()
        };

        let config = RunConfig::resolve(&settings, &overrides).unwrap();
        assert_eq!(config.jobs, 2);
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.cool_time, Duration::from_secs(5));
        assert!(config.throttle);
        assert!(!config.is_sequential());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let overrides = RunOverrides {
            batch_size: Some(0),
            ..Default::default()
        };
        let err = RunConfig::resolve(&Settings::default(), &overrides).unwrap_err();
        assert_eq!(err, ConfigError::InvalidBatchSize);
    }

    #[test]
    fn test_nice_range_checked() {
        let overrides = RunOverrides {
            nice: Some(25),
            ..Default::default()
        };
        let err = RunConfig::resolve(&Settings::default(), &overrides).unwrap_err();
        assert_eq!(err, ConfigError::InvalidNice(25));
    }

    #[test]
    fn test_zero_timeout_disables_watchdog() {
        let overrides = RunOverrides {
            render_timeout_secs: Some(0),
            ..Default::default()
        };
        let config = RunConfig::resolve(&Settings::default(), &overrides).unwrap();
        assert!(config.render_timeout.is_none());
    }

    #[test]
    fn test_single_job_is_sequential() {
        let config = RunConfig::default();
        assert!(config.is_sequential());
        assert_eq!(config.final_path(), Utf8PathBuf::from("output/quiz_final.mp4"));
    }
}
