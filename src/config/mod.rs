use crate::models::Settings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Default settings file name, looked up in the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "quizreel.yaml";

/// Prefix for environment overrides, e.g. `QUIZREEL_JOBS=4` or
/// `QUIZREEL_RENDERER__PROGRAM=/opt/render`
pub const ENV_PREFIX: &str = "QUIZREEL";

/// Loads and saves the YAML settings file.
///
/// Layering, lowest precedence first: built-in defaults, the settings file,
/// `QUIZREEL_*` environment variables. Command-line flags are applied later by
/// [`crate::models::RunConfig::resolve`].
#[derive(Debug, Clone)]
pub struct ConfigManager {
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager for the given settings file.
    ///
    /// The file does not have to exist.
    pub fn new<P: AsRef<Utf8Path>>(settings_path: P) -> Self {
        Self {
            settings_path: settings_path.as_ref().to_path_buf(),
        }
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    /// Load settings from the file and environment.
    ///
    /// # Returns
    /// The merged Settings, or defaults when neither source sets anything
    pub fn load_settings(&self) -> Result<Settings> {
        self.load_with_env(None)
    }

    /// `env` replaces the process environment when given
    fn load_with_env(&self, env: Option<config::Map<String, String>>) -> Result<Settings> {
        if self.settings_path.exists() {
            tracing::info!("Loading settings from {}", self.settings_path);
        } else {
            tracing::debug!(
                "Settings file {} not found, using defaults and environment",
                self.settings_path
            );
        }

        let settings: Settings = config::Config::builder()
            .add_source(
                config::File::new(self.settings_path.as_str(), config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        Ok(settings)
    }

    /// Write settings as YAML, creating the parent directory if needed
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.settings_path.parent()
            && !parent.as_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory: {}", parent))?;
        }

        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new(DEFAULT_SETTINGS_FILE)
    }
}
