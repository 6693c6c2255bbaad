//! Continuous cloud speech recognition
//!
//! Polls the microphone tap, cuts utterances with [`UtteranceSegmenter`] and
//! transcribes each one with [`SpeechToText`]. Runs as a tokio task per
//! recognition handle; stopping it or a failed transcription ends the task
//! with `Ended`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use super::capture::{SAMPLE_RATE, samples_to_wav};
use super::segmenter::UtteranceSegmenter;
use super::stt::SpeechToText;
use crate::capability::RecognitionEngine;
use crate::events::{RecognitionEmitter, RecognitionErrorKind};
use crate::microphone::AudioTap;
use crate::{Error, Result};

/// How often captured audio is drained from the tap
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// [`RecognitionEngine`] backed by a speech-to-text API
pub struct CloudRecognizer {
    stt: Arc<SpeechToText>,
    stop: Option<oneshot::Sender<()>>,
}

impl CloudRecognizer {
    #[must_use]
    pub fn new(stt: SpeechToText) -> Self {
        Self {
            stt: Arc::new(stt),
            stop: None,
        }
    }
}

impl RecognitionEngine for CloudRecognizer {
    fn start(&mut self, mic: &AudioTap, events: RecognitionEmitter) -> Result<()> {
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop = Some(stop_tx);

        // Audio captured while not listening (assistant speech included) is stale
        mic.clear();

        tokio::spawn(listen(Arc::clone(&self.stt), mic.clone(), events, stop_rx));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // The task may already have ended on its own
            let _ = stop.send(());
        }
    }
}

async fn listen(
    stt: Arc<SpeechToText>,
    tap: AudioTap,
    events: RecognitionEmitter,
    mut stop: oneshot::Receiver<()>,
) {
    let id = events.id().0;
    tracing::debug!(id, "recognizer listening");

    let mut segmenter = UtteranceSegmenter::new();
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let Some(utterance) = segmenter.process(&tap.take()) else {
                    continue;
                };
                match transcribe(&stt, &utterance).await {
                    Ok(text) if text.trim().is_empty() => {
                        tracing::trace!(id, "empty transcript");
                    }
                    Ok(text) => events.transcript(text),
                    Err(e) => {
                        tracing::warn!(id, error = %e, "transcription failed");
                        events.error(error_kind(&e));
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!(id, "recognizer ended");
    events.ended();
}

async fn transcribe(stt: &SpeechToText, samples: &[f32]) -> Result<String> {
    let wav = samples_to_wav(samples, SAMPLE_RATE)?;
    stt.transcribe(&wav).await
}

fn error_kind(error: &Error) -> RecognitionErrorKind {
    match error {
        Error::PermissionDenied => RecognitionErrorKind::PermissionDenied,
        Error::Audio(_) => RecognitionErrorKind::AudioCapture,
        _ => RecognitionErrorKind::Network,
    }
}
