use crate::models::{RenderJob, RendererSettings};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// How many trailing stderr bytes are kept in a failure reason
const STDERR_TAIL_BYTES: usize = 600;

/// Errors that can occur while rendering a single question
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to start renderer {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Renderer exited with {code}: {stderr}")]
    ExitStatus { code: String, stderr: String },

    #[error("Renderer produced no usable output at {0}")]
    MissingOutput(Utf8PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Renders one question into one video clip.
///
/// Implementations are opaque, CPU-bound units of work. The scheduler never
/// interrupts a call in flight; a watchdog, if any, belongs to the implementation
/// and surfaces as [`RenderError::Timeout`].
#[async_trait]
pub trait RenderUnit: Send + Sync {
    /// Render `job` and return the path of the finished clip
    async fn render(&self, job: &RenderJob) -> Result<Utf8PathBuf, RenderError>;
}

/// RenderUnit that runs an external render program per question.
///
/// The program writes to a temporary `quiz_<id>.partial.mp4`; the file is moved
/// to its final name only after the program exits successfully, so a killed or
/// failed render never leaves a clip that looks complete.
///
/// # Placeholders
///
/// - `{id}`: question id
/// - `{output}`: path the program must write (the temporary path)
/// - `{question}`: the question record as compact JSON
/// - `{questions}`: path of the question bank
///
/// The same values are exported as `QUIZREEL_ID`, `QUIZREEL_OUTPUT` and
/// `QUIZREEL_QUESTION` environment variables.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    questions_path: Utf8PathBuf,
    timeout: Option<Duration>,
    nice: Option<i32>,
}

impl CommandRenderer {
    pub fn new(settings: &RendererSettings, questions_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: settings.program.clone(),
            args: settings.args.clone(),
            questions_path: questions_path.into(),
            timeout: None,
            nice: None,
        }
    }

    /// Kill the render process if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Apply `nice` inside every spawned render process
    pub fn with_nice(mut self, nice: i32) -> Self {
        self.nice = Some(nice);
        self
    }

    /// Temporary path used while `output` is being rendered
    pub fn partial_path(output: &Utf8Path) -> Utf8PathBuf {
        output.with_extension("partial.mp4")
    }

    /// Expand the argument template for `job`, writing to `output`
    pub fn build_args(&self, job: &RenderJob, output: &Utf8Path) -> Vec<String> {
        let id = job.id().to_string();
        let question = job.question.to_json();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{id}", &id)
                    .replace("{output}", output.as_str())
                    .replace("{questions}", self.questions_path.as_str())
                    .replace("{question}", &question)
            })
            .collect()
    }

    fn build_command(&self, job: &RenderJob, output: &Utf8Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.build_args(job, output))
            .env("QUIZREEL_ID", job.id().to_string())
            .env("QUIZREEL_OUTPUT", output.as_str())
            .env("QUIZREEL_QUESTION", job.question.to_json())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        if let Some(nice) = self.nice {
            // SAFETY: the hook only issues the setpriority syscall, which is
            // async-signal-safe. A refused change is ignored.
            unsafe {
                cmd.pre_exec(move || {
                    let _ = crate::scheduler::priority::platform::set_niceness(nice);
                    Ok(())
                });
            }
        }

        cmd
    }

    async fn run_program(&self, job: &RenderJob, partial: &Utf8Path) -> Result<(), RenderError> {
        let start = Instant::now();
        let child = self
            .build_command(job, partial)
            .spawn()
            .map_err(|source| RenderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => timeout(limit, wait).await.map_err(|_| {
                tracing::warn!(
                    "Renderer for question {} timed out after {:?}",
                    job.id(),
                    limit
                );
                RenderError::Timeout(limit)
            })??,
            None => wait.await?,
        };

        tracing::debug!(
            "Renderer for question {} finished in {:.2}s with {}",
            job.id(),
            start.elapsed().as_secs_f32(),
            output.status
        );

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| format!("exit code {}", c))
                .unwrap_or_else(|| "signal".to_string());
            return Err(RenderError::ExitStatus {
                code,
                stderr: stderr_tail(&output.stderr),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl RenderUnit for CommandRenderer {
    async fn render(&self, job: &RenderJob) -> Result<Utf8PathBuf, RenderError> {
        if let Some(parent) = job.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = Self::partial_path(&job.output_path);
        remove_if_exists(&partial).await;

        if let Err(e) = self.run_program(job, &partial).await {
            remove_if_exists(&partial).await;
            return Err(e);
        }

        let written = tokio::fs::metadata(&partial)
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);
        if !written {
            remove_if_exists(&partial).await;
            return Err(RenderError::MissingOutput(partial));
        }

        tokio::fs::rename(&partial, &job.output_path).await?;
        Ok(job.output_path.clone())
    }
}

async fn remove_if_exists(path: &Utf8Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed stale partial render {}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path, e),
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }

    let mut cut = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    format!("...{}", &text[cut..])
}
