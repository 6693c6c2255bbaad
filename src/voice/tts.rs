//! Text-to-speech (TTS) processing

use secrecy::{ExposeSecret, SecretString};

use crate::config::{TtsBackend, VoiceConfig};
use crate::{Error, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsBackend,
    base_url: String,
}

impl TextToSpeech {
    /// Create a new TTS instance using `OpenAI`
    #[must_use]
    pub fn new_openai(api_key: SecretString, voice: String, speed: f32, model: String) -> Self {
        Self {
            client: super::http_client(super::REQUEST_TIMEOUT),
            api_key,
            voice,
            speed,
            model,
            provider: TtsBackend::OpenAi,
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    /// Create a new TTS instance using `ElevenLabs`
    #[must_use]
    pub fn new_elevenlabs(api_key: SecretString, voice_id: String, model: String) -> Self {
        Self {
            client: super::http_client(super::REQUEST_TIMEOUT),
            api_key,
            voice: voice_id,
            speed: 1.0, // ElevenLabs doesn't use speed in the same way
            model,
            provider: TtsBackend::ElevenLabs,
            base_url: ELEVENLABS_BASE_URL.to_string(),
        }
    }

    /// Build the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if the backend's API key is missing
    pub fn from_config(voice: &VoiceConfig) -> Result<Self> {
        match voice.tts_provider {
            TtsBackend::OpenAi => voice
                .api_keys
                .openai
                .clone()
                .map(|key| {
                    Self::new_openai(
                        key,
                        voice.tts_voice.clone(),
                        voice.tts_speed,
                        voice.tts_model.clone(),
                    )
                })
                .ok_or_else(|| Error::Config("OpenAI API key required for TTS".to_string())),
            TtsBackend::ElevenLabs => voice
                .api_keys
                .elevenlabs
                .clone()
                .map(|key| {
                    Self::new_elevenlabs(key, voice.tts_voice.clone(), voice.tts_model.clone())
                })
                .ok_or_else(|| Error::Config("ElevenLabs API key required for TTS".to_string())),
        }
    }

    /// Point requests at another base URL (proxies, tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Replace the default per-request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.client = super::http_client(timeout);
        self
    }

    /// Synthesize text to MP3 audio bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        match self.provider {
            TtsBackend::OpenAi => self.synthesize_openai(text).await,
            TtsBackend::ElevenLabs => self.synthesize_elevenlabs(text).await,
        }
    }

    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&SpeechRequest {
                model: &self.model,
                input: text,
                voice: &self.voice,
                speed: self.speed,
            });
        self.fetch_audio(request).await
    }

    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let request = self
            .client
            .post(format!("{}/text-to-speech/{}", self.base_url, self.voice))
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&SpeechRequest {
                text,
                model_id: &self.model,
            });
        self.fetch_audio(request).await
    }

    /// Send one synthesis request and collect the MP3 body
    async fn fetch_audio(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>> {
        let backend = self.provider;
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(?backend, status = %status, "synthesis rejected");
            return Err(Error::Tts(format!("{backend:?} returned {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tracing::debug!(?backend, bytes = audio.len(), "speech synthesized");
        Ok(audio.to_vec())
    }
}
