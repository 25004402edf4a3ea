use crate::config::DEFAULT_SETTINGS_FILE;
use crate::models::RunOverrides;
use camino::Utf8PathBuf;
use clap::Parser;

/// Render quiz questions into clips in thermally safe batches, then merge them
#[derive(Debug, Clone, Parser)]
#[command(name = "quizreel", version, about, long_about = None)]
pub struct Cli {
    /// Worker pool size for parallel batches
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Scheduling priority applied at startup (-20..=19, 19 is lowest)
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub nice: Option<i32>,

    /// Render one question at a time regardless of --jobs
    #[arg(long)]
    pub sequential: bool,

    /// Questions per batch
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Seconds to pause between batches (or units, when sequential)
    #[arg(long = "cool-time", value_name = "S")]
    pub cool_time: Option<u64>,

    /// Actively throttle during cooldowns
    #[arg(long)]
    pub throttle: bool,

    /// Output directory for per-question clips
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output_dir: Option<Utf8PathBuf>,

    /// Final concatenated video filename
    #[arg(short = 'f', long = "final", value_name = "NAME")]
    pub final_name: Option<String>,

    /// Skip rendering and concatenate the clips already in the output directory
    #[arg(long)]
    pub skip_rendering: bool,

    /// Question bank JSON
    #[arg(short = 'q', long, value_name = "PATH")]
    pub questions: Option<Utf8PathBuf>,

    /// Watchdog timeout per render in seconds (0 disables it)
    #[arg(long = "render-timeout", value_name = "S")]
    pub render_timeout: Option<u64>,

    /// Settings file
    #[arg(long = "config", value_name = "PATH", default_value = DEFAULT_SETTINGS_FILE, env = "QUIZREEL_CONFIG")]
    pub config_path: Utf8PathBuf,

    /// Log directory
    #[arg(long, value_name = "DIR", default_value = "logs")]
    pub log_dir: Utf8PathBuf,

    /// Debug-level logging
    #[arg(long)]
    pub debug: bool,

    /// Write the default settings file to --config and exit
    #[arg(long)]
    pub write_config: bool,
}

impl Cli {
    /// Values that take precedence over the settings file
    pub fn overrides(&self) -> RunOverrides {
        RunOverrides {
            questions: self.questions.clone(),
            output_dir: self.output_dir.clone(),
            final_name: self.final_name.clone(),
            jobs: self.jobs,
            nice: self.nice,
            batch_size: self.batch_size,
            cool_time_secs: self.cool_time,
            render_timeout_secs: self.render_timeout,
            throttle: self.throttle,
            sequential: self.sequential,
            skip_rendering: self.skip_rendering,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_leave_settings_untouched() {
        let cli = Cli::try_parse_from(["quizreel"]).unwrap();
        let overrides = cli.overrides();

        assert!(overrides.jobs.is_none());
        assert!(overrides.batch_size.is_none());
        assert!(!overrides.throttle);
        assert_eq!(cli.config_path, Utf8PathBuf::from("quizreel.yaml"));
    }

    #[test]
    fn test_scheduler_flags() {
        let cli = Cli::try_parse_from([
            "quizreel",
            "-j",
            "3",
            "--nice",
            "-5",
            "--batch-size",
            "4",
            "--cool-time",
            "10",
            "--throttle",
            "--sequential",
            "-o",
            "clips",
            "-f",
            "all.mp4",
            "--skip-rendering",
        ])
        .unwrap();
        let overrides = cli.overrides();

        assert_eq!(overrides.jobs, Some(3));
        assert_eq!(overrides.nice, Some(-5));
        assert_eq!(overrides.batch_size, Some(4));
        assert_eq!(overrides.cool_time_secs, Some(10));
        assert!(overrides.throttle);
        assert!(overrides.sequential);
        assert!(overrides.skip_rendering);
        assert_eq!(overrides.output_dir, Some(Utf8PathBuf::from("clips")));
        assert_eq!(overrides.final_name.as_deref(), Some("all.mp4"));
    }

    #[test]
    fn test_rejects_non_numeric_jobs() {
        assert!(Cli::try_parse_from(["quizreel", "-j", "many"]).is_err());
    }
}
