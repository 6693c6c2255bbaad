//! Configuration management for Beacon call
//!
//! Host configuration is read once at startup. Priority: environment >
//! TOML file > built-in default.

pub mod file;

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::{Error, Result};

/// Remote assistant service used when none is configured
pub const DEFAULT_API_ENDPOINT: &str = "https://api.beacon.omni.dev/v1/widget/chat";

/// Greeting rendered before any interaction
pub const DEFAULT_WELCOME_MESSAGE: &str =
    "Hi! Type a message below or start a call to talk with me.";

/// Delay before a stopped recognizer is started again
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(100);

/// Beacon call configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote assistant service URL
    pub api_endpoint: String,

    /// Bearer token; API-key mode is on exactly when this is set
    pub api_key: Option<SecretString>,

    /// Cosmetic theme for presenters
    pub theme: Theme,

    /// Greeting shown before any interaction (not part of history)
    pub welcome_message: String,

    /// Delay before a stopped recognizer is restarted
    pub restart_delay: Duration,

    /// Voice configuration
    pub voice: VoiceConfig,
}

/// Widget color theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    /// Parse a theme name, case-insensitively
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }
}

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttBackend {
    #[default]
    Whisper,
    Deepgram,
}

/// Text-to-speech backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsBackend {
    #[default]
    OpenAi,
    ElevenLabs,
}

/// Voice processing configuration
#[derive(Debug, Clone, Default)]
pub struct VoiceConfig {
    /// Enable voice calling
    pub enabled: bool,

    pub stt_provider: SttBackend,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    pub tts_provider: TtsBackend,

    /// TTS model (e.g. "tts-1", "eleven_monolingual_v1")
    pub tts_model: String,

    /// TTS voice identifier (voice id for `ElevenLabs`)
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    /// API keys for the speech services
    pub api_keys: ApiKeys,
}

/// API keys for speech services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper and TTS)
    pub openai: Option<SecretString>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<SecretString>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<SecretString>,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if the resolved endpoint is not a valid URL
    pub fn load(disable_voice: bool) -> Result<Self> {
        Self::resolve(file::load_config_file(), |key| std::env::var(key).ok(), disable_voice)
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the resolved endpoint is not a valid URL
    pub fn resolve(
        fc: file::CallConfigFile,
        env: impl Fn(&str) -> Option<String>,
        disable_voice: bool,
    ) -> Result<Self> {
        let api_endpoint = env("BEACON_CALL_API_ENDPOINT")
            .or(fc.widget.api_endpoint)
            .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string());
        validate_endpoint(&api_endpoint)?;

        let api_key = secret(env("BEACON_CALL_API_KEY").or(fc.widget.api_key));

        let theme = match env("BEACON_CALL_THEME").or(fc.widget.theme) {
            Some(value) => Theme::parse(&value).unwrap_or_else(|| {
                tracing::warn!(theme = %value, "unknown theme, using light");
                Theme::Light
            }),
            None => Theme::default(),
        };

        let welcome_message = env("BEACON_CALL_WELCOME")
            .or(fc.widget.welcome_message)
            .unwrap_or_else(|| DEFAULT_WELCOME_MESSAGE.to_string());

        let restart_delay = fc
            .widget
            .restart_delay_ms
            .map_or(DEFAULT_RESTART_DELAY, Duration::from_millis);

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            openai: secret(env("OPENAI_API_KEY").or(fc.api_keys.openai)),
            deepgram: secret(env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram)),
            elevenlabs: secret(env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs)),
        };

        // Voice config (env > toml > default)
        let voice_enabled = if disable_voice {
            false
        } else {
            fc.voice.enabled.unwrap_or(true)
        };
        let stt_provider = fc.voice.stt_provider.unwrap_or_default();
        let tts_provider = fc.voice.tts_provider.unwrap_or_default();
        let voice = VoiceConfig {
            enabled: voice_enabled,
            stt_provider,
            stt_model: env("BEACON_CALL_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| default_stt_model(stt_provider).to_string()),
            tts_provider,
            tts_model: env("BEACON_CALL_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| default_tts_model(tts_provider).to_string()),
            tts_voice: fc
                .voice
                .tts_voice
                .unwrap_or_else(|| default_tts_voice(tts_provider).to_string()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0).clamp(0.25, 4.0),
            api_keys,
        };

        if disable_voice {
            tracing::info!("voice explicitly disabled via --disable-voice");
        }

        Ok(Self {
            api_endpoint,
            api_key,
            theme,
            welcome_message,
            restart_delay,
            voice,
        })
    }

    /// Replace the endpoint (command-line override)
    ///
    /// # Errors
    ///
    /// Returns error if `endpoint` is not a valid http(s) URL
    pub fn with_endpoint(mut self, endpoint: String) -> Result<Self> {
        validate_endpoint(&endpoint)?;
        self.api_endpoint = endpoint;
        Ok(self)
    }

    /// Whether requests carry an `Authorization` header
    #[must_use]
    pub const fn api_key_mode(&self) -> bool {
        self.api_key.is_some()
    }
}

const fn default_stt_model(provider: SttBackend) -> &'static str {
    match provider {
        SttBackend::Whisper => "whisper-1",
        SttBackend::Deepgram => "nova-2",
    }
}

const fn default_tts_model(provider: TtsBackend) -> &'static str {
    match provider {
        TtsBackend::OpenAi => "tts-1",
        TtsBackend::ElevenLabs => "eleven_monolingual_v1",
    }
}

/// `OpenAI` takes a voice name, `ElevenLabs` a voice id (Rachel)
const fn default_tts_voice(provider: TtsBackend) -> &'static str {
    match provider {
        TtsBackend::OpenAi => "alloy",
        TtsBackend::ElevenLabs => "21m00Tcm4TlvDq8ikWAM",
    }
}

/// Empty strings count as absent
fn secret(value: Option<String>) -> Option<SecretString> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

fn validate_endpoint(endpoint: &str) -> Result<()> {
    let url = url::Url::parse(endpoint)
        .map_err(|e| Error::Config(format!("invalid api endpoint {endpoint:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "api endpoint must be http(s), got {}",
            url.scheme()
        )));
    }
    Ok(())
}
