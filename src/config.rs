//! Configuration management for classifia-rs.
//!
//! Loads config from YAML files in standard locations. Every section is
//! optional; the Gemini endpoint and key default to the values baked in at
//! build time through `GEMINI_API_URL` and `GEMINI_API_KEY`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_url: String,
    pub api_key: String,
    /// Upper bound on one classification request. `0` disables the bound.
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_url: option_env!("GEMINI_API_URL").unwrap_or_default().into(),
            api_key: option_env!("GEMINI_API_KEY").unwrap_or_default().into(),
            timeout_secs: 30,
        }
    }
}

impl GeminiConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_requests: u32,
    pub cooldown_secs: u64,
    /// Start from the persisted request count instead of zero.
    pub restore_count: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            cooldown_secs: 10,
            restore_count: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub enabled: bool,
    /// espeak-compatible TTS command.
    pub command: String,
    pub language_prefix: String,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub speak_delay_ms: u64,
    pub welcome_delay_ms: u64,
    pub welcome_text: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "espeak-ng".into(),
            language_prefix: "fr".into(),
            poll_interval_ms: 100,
            poll_timeout_ms: 2000,
            speak_delay_ms: 150,
            welcome_delay_ms: 100,
            welcome_text: "Bienvenue sur ClassifIA !".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one file per stored key. Defaults to ~/.classifia.
    pub dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".classifia")
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub limits: LimitsConfig,
    pub voice: VoiceConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/classifia/config.yaml
    /// 3. /etc/classifia/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/classifia/config.yaml")),
                Some(PathBuf::from("/etc/classifia/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }
}
