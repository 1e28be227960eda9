use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::DEFAULT_MODEL_ID;

/// OpenRouter speaks the OpenAI chat-completion protocol
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root data directory (~/.local/share/wordmap)
    pub data_dir: PathBuf,
    /// Per-session upload directories live under here
    pub uploads_dir: PathBuf,
    /// Persisted user settings (JSON)
    pub settings_file: PathBuf,
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    /// Name of the environment variable holding the bearer token
    pub api_key_env: String,
    /// Model used when settings don't name one
    pub default_model: String,
    pub temperature: f32,
    pub top_p: f32,
    /// Pause between revealed characters
    pub reveal_delay: Duration,
    pub request_timeout: Duration,
}

impl Config {
    /// Configuration rooted at `data_dir` with default parameters
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            uploads_dir: data_dir.join("uploads"),
            settings_file: data_dir.join("settings.json"),
            data_dir,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            default_model: DEFAULT_MODEL_ID.to_string(),
            temperature: 0.7,
            top_p: 1.0,
            reveal_delay: Duration::from_millis(10),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Load configuration from the environment or use defaults
    pub fn load_or_default() -> Self {
        let data_dir = std::env::var_os("WORDMAP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("wordmap")
            });

        let mut config = Self::with_data_dir(data_dir);

        if let Ok(base_url) = std::env::var("WORDMAP_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(api_key_env) = std::env::var("WORDMAP_API_KEY_ENV") {
            config.api_key_env = api_key_env;
        }
        if let Ok(delay) = std::env::var("WORDMAP_REVEAL_DELAY_MS") {
            match delay.parse::<u64>() {
                Ok(ms) => config.reveal_delay = Duration::from_millis(ms),
                Err(_) => tracing::warn!("Ignoring invalid WORDMAP_REVEAL_DELAY_MS={}", delay),
            }
        }

        config
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.uploads_dir)?;
        Ok(())
    }
}

/// User settings that survive restarts. Chat history is not persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub selected_model: Option<String>,
}

impl Settings {
    /// Load settings, falling back to defaults if the file is missing or unreadable
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::try_load(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to load settings from {:?}: {:#}", path, e);
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read settings file")?;
        serde_json::from_str(&content).context("Failed to parse settings JSON")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, content).context("Failed to write settings file")?;
        Ok(())
    }

    /// The model to start a session with
    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.selected_model.as_deref().unwrap_or(default)
    }
}
