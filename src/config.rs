//! Configuration management for the voicescribe bot.
//!
//! Handles loading, saving, and providing defaults for the bot configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the config-file bot token.
pub const TOKEN_ENV_VAR: &str = "VOICESCRIBE_TOKEN";

/// Main configuration struct for the bot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub model: ModelConfig,
    pub media: MediaConfig,
    pub logging: LoggingConfig,
}

/// Telegram credentials and sender allow-list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API token. The VOICESCRIBE_TOKEN env var takes precedence.
    pub token: String,
    /// Usernames (without @) allowed to talk to the bot. Everyone else is
    /// ignored without a reply.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_users: Vec<String>,
}

impl TelegramConfig {
    /// Resolve the bot token, preferring the environment variable.
    pub fn resolved_token(&self) -> Result<String> {
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR)
            && !token.is_empty()
        {
            return Ok(token);
        }
        if self.token.is_empty() {
            anyhow::bail!(
                "No bot token configured: set {TOKEN_ENV_VAR} or [telegram] token in the config file"
            );
        }
        Ok(self.token.clone())
    }

    /// Check a sender's username against the allow-list.
    ///
    /// Senders without a username are never allowed.
    pub fn is_allowed(&self, username: Option<&str>) -> bool {
        match username {
            Some(name) => self.allowed_users.iter().any(|allowed| allowed == name),
            None => false,
        }
    }
}

/// Configuration for the speech recognition model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Speech recognition model to use.
    pub model: SpeechModel,
    /// Language to recognize, or "auto" for automatic detection.
    pub language: String,
    /// What the live status message shows while a job runs.
    pub progress: ProgressStyle,
}

impl ModelConfig {
    /// Language code for the engine, with "auto" mapped to autodetection.
    pub fn engine_language(&self) -> Option<String> {
        if self.language == "auto" {
            None
        } else {
            Some(self.language.clone())
        }
    }
}

/// Supported speech recognition models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SpeechModel {
    Tiny,
    TinyEn,
    Base,
    BaseEn,
    #[default]
    Small,
    SmallEn,
    Medium,
    MediumEn,
    LargeV3,
    LargeV3Turbo,
}

impl SpeechModel {
    /// All selectable models, in size order.
    pub fn all() -> &'static [SpeechModel] {
        &[
            SpeechModel::Tiny,
            SpeechModel::TinyEn,
            SpeechModel::Base,
            SpeechModel::BaseEn,
            SpeechModel::Small,
            SpeechModel::SmallEn,
            SpeechModel::Medium,
            SpeechModel::MediumEn,
            SpeechModel::LargeV3,
            SpeechModel::LargeV3Turbo,
        ]
    }

    /// User-facing model name, as accepted by the /model command and used in
    /// the result summary tag.
    pub fn name(self) -> &'static str {
        match self {
            SpeechModel::Tiny => "tiny",
            SpeechModel::TinyEn => "tiny-en",
            SpeechModel::Base => "base",
            SpeechModel::BaseEn => "base-en",
            SpeechModel::Small => "small",
            SpeechModel::SmallEn => "small-en",
            SpeechModel::Medium => "medium",
            SpeechModel::MediumEn => "medium-en",
            SpeechModel::LargeV3 => "large-v3",
            SpeechModel::LargeV3Turbo => "large-v3-turbo",
        }
    }

    /// Parse a user-supplied model name.
    pub fn parse(name: &str) -> Option<SpeechModel> {
        SpeechModel::all()
            .iter()
            .copied()
            .find(|model| model.name() == name)
    }
}

/// What the live status message shows while transcription runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStyle {
    /// Show the text of each decoded segment as it arrives.
    #[default]
    Segments,
    /// Show a percentage counter instead of segment text.
    Percent,
}

/// Filesystem locations for in-flight media.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Directory for per-job temporary files. Empty means the system temp dir.
    pub work_dir: String,
}

impl MediaConfig {
    /// Resolve the working directory for job temp dirs.
    pub fn resolved_work_dir(&self) -> PathBuf {
        if self.work_dir.is_empty() {
            std::env::temp_dir()
        } else {
            PathBuf::from(&self.work_dir)
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: LogLevel,
}

/// Log verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to a tracing filter directive string for this crate.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "voicescribe=error",
            LogLevel::Warn => "voicescribe=warn",
            LogLevel::Info => "voicescribe=info",
            LogLevel::Debug => "voicescribe=debug",
            LogLevel::Trace => "voicescribe=trace",
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: SpeechModel::default(),
            language: "auto".to_string(),
            progress: ProgressStyle::default(),
        }
    }
}

impl Config {
    /// Returns the default config directory path.
    /// `~/.config/voicescribe/` (or `$XDG_CONFIG_HOME/voicescribe/`)
    pub fn config_dir() -> Result<PathBuf> {
        crate::dirs::config_dir()
    }

    /// Returns the default config file path.
    /// `~/.config/voicescribe/config.toml`
    pub fn config_path() -> Result<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    /// Returns the default data directory path.
    /// `~/.local/share/voicescribe/` (or `$XDG_DATA_HOME/voicescribe/`)
    pub fn data_dir() -> Result<PathBuf> {
        crate::dirs::data_dir()
    }

    /// Returns the default models directory path.
    /// `~/.local/share/voicescribe/models/`
    pub fn models_dir() -> Result<PathBuf> {
        Self::data_dir().map(|p| p.join("models"))
    }

    /// Load configuration from the default path.
    /// Returns defaults if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    /// Returns defaults if the file doesn't exist.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file as TOML")
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
