use crate::models::ConcatSettings;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Name of the ffmpeg concat-demuxer list written next to the clips
pub const CONCAT_LIST_NAME: &str = "to_concat.txt";

#[derive(Error, Debug)]
pub enum ConcatError {
    #[error("No clips to concatenate")]
    EmptyInput,

    #[error("Failed to write concat list {path}: {source}")]
    ListFile {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg exited with {code}: {stderr}")]
    Failed { code: String, stderr: String },
}

/// Merges an ordered list of clips into one video.
///
/// Input order must be preserved exactly. An empty input is an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Concatenator: Send + Sync {
    async fn concatenate(
        &self,
        clips: &[Utf8PathBuf],
        output: &Utf8Path,
    ) -> Result<Utf8PathBuf, ConcatError>;
}

/// Concatenator backed by the ffmpeg concat demuxer (stream copy, no re-encode)
#[derive(Debug, Clone)]
pub struct FfmpegConcatenator {
    ffmpeg: String,
    intro_clip: Option<Utf8PathBuf>,
}

impl FfmpegConcatenator {
    pub fn new(settings: &ConcatSettings) -> Self {
        Self {
            ffmpeg: settings.ffmpeg.clone(),
            intro_clip: settings.intro_clip.clone(),
        }
    }

    /// Full clip list: the intro clip (when configured and present) followed by `clips`
    pub fn playlist(&self, clips: &[Utf8PathBuf]) -> Vec<Utf8PathBuf> {
        let mut list = Vec::with_capacity(clips.len() + 1);
        match &self.intro_clip {
            Some(intro) if intro.is_file() => list.push(intro.clone()),
            Some(intro) => tracing::warn!("Intro clip {} not found, skipping it", intro),
            None => {}
        }
        list.extend(clips.iter().cloned());
        list
    }

    /// Render the concat-demuxer list file contents.
    ///
    /// Single quotes inside paths are escaped the way the demuxer expects (`'\''`).
    pub fn render_list(clips: &[Utf8PathBuf]) -> String {
        clips
            .iter()
            .map(|clip| {
                let absolute = clip
                    .canonicalize_utf8()
                    .unwrap_or_else(|_| clip.clone());
                format!("file '{}'\n", absolute.as_str().replace('\'', r"'\''"))
            })
            .collect()
    }

    fn build_command(&self, list_path: &Utf8Path, output: &Utf8Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args([
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "concat",
            "-safe",
            "0",
            "-i",
            list_path.as_str(),
            "-c",
            "copy",
            output.as_str(),
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Concatenator for FfmpegConcatenator {
    async fn concatenate(
        &self,
        clips: &[Utf8PathBuf],
        output: &Utf8Path,
    ) -> Result<Utf8PathBuf, ConcatError> {
        if clips.is_empty() {
            return Err(ConcatError::EmptyInput);
        }

        let playlist = self.playlist(clips);
        let list_dir = output.parent().unwrap_or(Utf8Path::new("."));
        let list_path = list_dir.join(CONCAT_LIST_NAME);

        tokio::fs::write(&list_path, Self::render_list(&playlist))
            .await
            .map_err(|source| ConcatError::ListFile {
                path: list_path.clone(),
                source,
            })?;

        tracing::info!(
            "Concatenating {} clips into {} ...",
            playlist.len(),
            output
        );

        let result = self
            .build_command(&list_path, output)
            .output()
            .await
            .map_err(|source| ConcatError::Spawn {
                program: self.ffmpeg.clone(),
                source,
            })?;

        if !result.status.success() {
            let code = result
                .status
                .code()
                .map(|c| format!("exit code {}", c))
                .unwrap_or_else(|| "signal".to_string());
            return Err(ConcatError::Failed {
                code,
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        tracing::info!("Final video saved to {}", output);
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_list_escapes_quotes() {
        let clips = vec![
            Utf8PathBuf::from("/videos/quiz_1.mp4"),
            Utf8PathBuf::from("/videos/it's/quiz_2.mp4"),
        ];
        let list = FfmpegConcatenator::render_list(&clips);
        let lines: Vec<&str> = list.lines().collect();

        assert_eq!(lines[0], "file '/videos/quiz_1.mp4'");
        assert_eq!(lines[1], r"file '/videos/it'\''s/quiz_2.mp4'");
    }

    #[test]
    fn test_playlist_prepends_existing_intro() {
        let temp_dir = TempDir::new().unwrap();
        let intro = Utf8PathBuf::try_from(temp_dir.path().join("intro.mp4")).unwrap();
        std::fs::write(&intro, b"intro").unwrap();

        let concat = FfmpegConcatenator::new(&ConcatSettings {
            ffmpeg: "ffmpeg".into(),
            intro_clip: Some(intro.clone()),
        });
        let playlist = concat.playlist(&[Utf8PathBuf::from("quiz_1.mp4")]);

        assert_eq!(playlist, vec![intro, Utf8PathBuf::from("quiz_1.mp4")]);
    }

    #[test]
    fn test_playlist_skips_missing_intro() {
        let concat = FfmpegConcatenator::new(&ConcatSettings {
            ffmpeg: "ffmpeg".into(),
            intro_clip: Some(Utf8PathBuf::from("/nope/intro.mp4")),
        });
        let playlist = concat.playlist(&[Utf8PathBuf::from("quiz_1.mp4")]);
        assert_eq!(playlist.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_fails() {
        let concat = FfmpegConcatenator::new(&ConcatSettings::default());
        let err = concat
            .concatenate(&[], Utf8Path::new("out/final.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConcatError::EmptyInput));
    }
}
