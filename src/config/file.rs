//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-call/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{SttBackend, TtsBackend};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct CallConfigFile {
    /// Host widget configuration
    #[serde(default)]
    pub widget: WidgetFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for speech services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Host widget configuration
#[derive(Debug, Default, Deserialize)]
pub struct WidgetFileConfig {
    /// Remote assistant service URL
    pub api_endpoint: Option<String>,

    /// Bearer token attached to every request
    pub api_key: Option<String>,

    /// "light" or "dark"
    pub theme: Option<String>,

    /// Greeting shown before any interaction
    pub welcome_message: Option<String>,

    /// Delay before a stopped recognizer is restarted
    pub restart_delay_ms: Option<u64>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable voice calling
    pub enabled: Option<bool>,

    /// STT backend ("whisper" or "deepgram")
    pub stt_provider: Option<SttBackend>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS backend ("openai" or "elevenlabs")
    pub tts_provider: Option<TtsBackend>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `CallConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> CallConfigFile {
    config_file_path().map_or_else(CallConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Returns `CallConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file_from(path: &Path) -> CallConfigFile {
    if !path.exists() {
        return CallConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                CallConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            CallConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/beacon-call/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-call")
            .join("config.toml")
    })
}
