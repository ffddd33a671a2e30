//! Configuration file handling for veo-director.
//!
//! Loads configuration from `~/.config/veo-director/config.toml` or a custom path.
//! The API credential is never stored in the file; it comes from the `API_KEY`
//! environment variable (optionally loaded from `.env`).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::genai::AspectRatio;

/// The environment variable holding the API credential.
pub const API_KEY_ENV: &str = "API_KEY";

/// Default base URL for the generative API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model for prompt suggestions.
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

/// Default model for video generation.
pub const DEFAULT_VIDEO_MODEL: &str = "veo-2.0-generate-001";

/// Default interval between job status checks.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Fixed file name offered for downloads.
pub const DEFAULT_OUTPUT_FILENAME: &str = "ai-generated-video.mp4";

/// Configuration file structure for veo-director.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_video_model")]
    pub video_model: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            text_model: default_text_model(),
            video_model: default_video_model(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GenerationConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Upper bound on how long to wait for a job. Unset waits indefinitely.
    #[serde(default)]
    pub max_wait_secs: Option<u64>,
    #[serde(default)]
    pub aspect_ratio: Option<AspectRatio>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_secs: None,
            aspect_ratio: None,
        }
    }
}

impl GenerationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_output_filename")]
    pub filename: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            filename: default_output_filename(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_text_model() -> String {
    DEFAULT_TEXT_MODEL.to_string()
}

fn default_video_model() -> String {
    DEFAULT_VIDEO_MODEL.to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_output_filename() -> String {
    DEFAULT_OUTPUT_FILENAME.to_string()
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            Self::parse(&content).map_err(|e| ConfigError::Parse { path, source: e })
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Read the API credential from the environment.
///
/// Call after `.env` has been loaded. An unset or blank value is fatal.
pub fn api_key_from_env() -> Result<String, ConfigError> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(ConfigError::MissingCredential),
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("API_KEY environment variable is not set")]
    MissingCredential,

    #[error("Failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("veo-director").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/veo-director/config.toml")
        })
}

/// Default config file contents written by `config init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# veo-director configuration
# The API credential is read from the API_KEY environment variable (or .env).

[api]
base_url = "https://generativelanguage.googleapis.com"
text_model = "gemini-2.5-flash"
video_model = "veo-2.0-generate-001"

[generation]
# Seconds between job status checks
poll_interval_secs = 10
# Give up after this many seconds (unset = wait indefinitely)
# max_wait_secs = 900
# Default aspect ratio: "16:9" or "9:16"
# aspect_ratio = "16:9"

[output]
# File name used when saving a finished video
filename = "ai-generated-video.mp4"
"#;
