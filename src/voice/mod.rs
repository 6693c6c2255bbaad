//! Desktop voice capabilities
//!
//! cpal capture and playback, cloud STT/TTS, and the engines built on them.

mod capture;
mod playback;
mod recognizer;
mod segmenter;
mod speaker;
mod stt;
mod tts;

use std::sync::Arc;
use std::time::Duration;

pub use capture::{CpalMicrophone, SAMPLE_RATE, samples_to_wav};
pub use playback::{DecodedAudio, decode_mp3, play_blocking};
pub use recognizer::CloudRecognizer;
pub use segmenter::{SegmenterState, UtteranceSegmenter, rms};
pub use speaker::CloudSpeaker;
pub use stt::SpeechToText;
pub use tts::TextToSpeech;

use crate::config::VoiceConfig;
use crate::dispatch::RemoteService;
use crate::orchestrator::Capabilities;

/// Upper bound on one STT or TTS request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Build the host capabilities for this machine
///
/// A backend whose API key is missing is left out, which disables the
/// matching voice feature while chat keeps working.
#[must_use]
pub fn desktop_capabilities(voice: &VoiceConfig, remote: Arc<dyn RemoteService>) -> Capabilities {
    let mut capabilities = Capabilities::text_only(remote);
    if !voice.enabled {
        tracing::info!("voice disabled");
        return capabilities;
    }

    match SpeechToText::from_config(voice) {
        Ok(stt) => {
            tracing::info!(provider = ?voice.stt_provider, model = %voice.stt_model, "speech recognition enabled");
            capabilities.microphone = Some(Box::new(CpalMicrophone::new()));
            capabilities.recognition = Some(Box::new(CloudRecognizer::new(stt)));
        }
        Err(e) => tracing::warn!(error = %e, "speech recognition unavailable"),
    }

    match TextToSpeech::from_config(voice) {
        Ok(tts) => {
            tracing::info!(provider = ?voice.tts_provider, voice = %voice.tts_voice, "speech synthesis enabled");
            capabilities.synthesis = Some(Box::new(CloudSpeaker::new(tts)));
        }
        Err(e) => tracing::warn!(error = %e, "speech synthesis unavailable"),
    }

    capabilities
}
