//! QuizReel - command-line entry point.
//!
//! # Execution Flow
//!
//! 1. Parse the command line and initialize logging → logs/quizreel.<date>
//! 2. Load `quizreel.yaml` (plus `QUIZREEL_*` environment) and merge CLI flags
//!    into an immutable [`RunConfig`]
//! 3. Lower the process priority, then build a tokio runtime whose worker
//!    threads lower their own priority on start
//! 4. Wire signals: Ctrl+C requests a graceful stop (a second one aborts),
//!    `SIGUSR1` pauses scheduling for a while
//! 5. Run the [`Pipeline`], print the summary, map the report to an exit code
//!
//! # Exit codes
//!
//! - `0`: the final video was produced, or the run was cleanly interrupted
//! - `1`: configuration/setup error, or the final merge failed (including an
//!   empty clip list)
//! - `130`: aborted by a second interrupt

use anyhow::{Context, Result};
use clap::Parser;
use quizreel::cli::Cli;
use quizreel::models::{RunConfig, load_questions};
use quizreel::scheduler::{PauseSignalHandler, PauseToken, PriorityController};
use quizreel::services::{CommandRenderer, FfmpegConcatenator};
use quizreel::{APP_NAME, ConfigManager, Pipeline, RunReport, VERSION};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const EXIT_ABORTED: i32 = 130;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match quizreel::logging::setup_logging_with_console(
        &cli.log_dir,
        "quizreel",
        cli.debug,
        true,
    ) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Logging disabled: {:#}", e);
            None
        }
    };

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    match run(cli) {
        Ok(None) => ExitCode::SUCCESS,
        Ok(Some(report)) => {
            println!("{}", report);
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<Option<RunReport>> {
    let config_manager = ConfigManager::new(&cli.config_path);

    if cli.write_config {
        config_manager.save_settings(&Default::default())?;
        println!("Wrote default settings to {}", config_manager.settings_path());
        return Ok(None);
    }

    let settings = config_manager.load_settings()?;
    let config = RunConfig::resolve(&settings, &cli.overrides())
        .context("Invalid configuration")?;

    tracing::info!(
        "Run configuration: jobs={}, batch_size={}, cool_time={}s, throttle={}, sequential={}, nice={}",
        config.jobs,
        config.batch_size,
        config.cool_time.as_secs(),
        config.throttle,
        config.is_sequential(),
        config.nice
    );

    let priority = PriorityController::new(config.nice);
    priority.apply_or_warn();

    let worker_count = if config.is_sequential() { 1 } else { config.jobs };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(worker_count + 1)
        .thread_name("quizreel-worker")
        .on_thread_start(move || priority.apply_on_worker_start())
        .build()
        .context("Failed to start tokio runtime")?;

    tracing::info!("Tokio runtime initialized with {} worker threads", worker_count + 1);

    let report = runtime.block_on(execute(config));

    // Render children are killed on drop; do not wait on stragglers
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    report.map(Some)
}

async fn execute(config: RunConfig) -> Result<RunReport> {
    let stop = CancellationToken::new();
    let pause = Arc::new(PauseToken::new(config.pause_duration));

    spawn_interrupt_handler(stop.clone());
    let _pause_listener = PauseSignalHandler::spawn(Arc::clone(&pause), stop.clone())
        .context("Failed to install pause signal handler")?;

    let questions = if config.skip_rendering {
        Vec::new()
    } else {
        load_questions(&config.questions)?
    };

    let renderer = CommandRenderer::new(&config.renderer, config.questions.clone())
        .with_timeout(config.render_timeout)
        .with_nice(config.nice);
    let concatenator = FfmpegConcatenator::new(&config.concat);

    let pipeline = Pipeline::new(
        config,
        Arc::new(renderer),
        Arc::new(concatenator),
        pause,
        stop.clone(),
    );

    let report = pipeline.run(questions).await;
    pipeline.metrics().log_summary();

    // Ends the signal listener tasks
    stop.cancel();
    report
}

/// First Ctrl+C: graceful stop. Second Ctrl+C: immediate exit.
fn spawn_interrupt_handler(stop: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("Interrupt handling unavailable");
            return;
        }
        tracing::warn!(
            "Interrupt received - finishing in-flight renders, press Ctrl+C again to abort"
        );
        stop.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("Second interrupt - aborting");
            std::process::exit(EXIT_ABORTED);
        }
    });
}
