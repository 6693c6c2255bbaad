//! Speech-to-text (STT) processing

use secrecy::{ExposeSecret, SecretString};

use crate::config::{SttBackend, VoiceConfig};
use crate::{Error, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEEPGRAM_BASE_URL: &str = "https://api.deepgram.com/v1";

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Transcribes speech to text
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    provider: SttBackend,
    base_url: String,
}

impl SpeechToText {
    /// Create a new STT instance using `OpenAI` Whisper
    #[must_use]
    pub fn new_whisper(api_key: SecretString, model: String) -> Self {
        Self {
            client: super::http_client(super::REQUEST_TIMEOUT),
            api_key,
            model,
            provider: SttBackend::Whisper,
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    /// Create a new STT instance using Deepgram
    #[must_use]
    pub fn new_deepgram(api_key: SecretString, model: String) -> Self {
        Self {
            client: super::http_client(super::REQUEST_TIMEOUT),
            api_key,
            model,
            provider: SttBackend::Deepgram,
            base_url: DEEPGRAM_BASE_URL.to_string(),
        }
    }

    /// Build the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if the backend's API key is missing
    pub fn from_config(voice: &VoiceConfig) -> Result<Self> {
        match voice.stt_provider {
            SttBackend::Whisper => voice
                .api_keys
                .openai
                .clone()
                .map(|key| Self::new_whisper(key, voice.stt_model.clone()))
                .ok_or_else(|| Error::Config("OpenAI API key required for Whisper".to_string())),
            SttBackend::Deepgram => voice
                .api_keys
                .deepgram
                .clone()
                .map(|key| Self::new_deepgram(key, voice.stt_model.clone()))
                .ok_or_else(|| Error::Config("Deepgram API key required".to_string())),
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

    /// Transcribe WAV audio to text
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        match self.provider {
            SttBackend::Whisper => self.transcribe_whisper(audio).await,
            SttBackend::Deepgram => self.transcribe_deepgram(audio).await,
        }
    }

    async fn transcribe_whisper(&self, audio: &[u8]) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Stt(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let request = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form);

        let result: WhisperResponse = self.exchange(request, audio.len()).await?;
        Ok(result.text)
    }

    async fn transcribe_deepgram(&self, audio: &[u8]) -> Result<String> {
        let request = self
            .client
            .post(format!("{}/listen", self.base_url))
            .query(&[("model", self.model.as_str()), ("punctuate", "true")])
            .header(
                "Authorization",
                format!("Token {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec());

        let result: DeepgramResponse = self.exchange(request, audio.len()).await?;
        Ok(result
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default())
    }

    /// Send one transcription request and decode the provider's JSON reply
    async fn exchange<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        audio_bytes: usize,
    ) -> Result<T> {
        let backend = self.provider;
        tracing::debug!(?backend, audio_bytes, "transcribing utterance");

        let response = request.send().await.map_err(|e| {
            tracing::warn!(?backend, error = %e, "transcription request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(?backend, status = %status, "transcription rejected");
            return Err(Error::Stt(format!("{backend:?} returned {status}: {body}")));
        }

        Ok(response.json().await?)
    }
}
