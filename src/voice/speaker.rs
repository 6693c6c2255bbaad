//! Cloud speech synthesis with local playback

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;

use super::playback::{decode_mp3, play_blocking};
use super::tts::TextToSpeech;
use crate::capability::SynthesisEngine;
use crate::events::SynthesisEmitter;
use crate::{Error, Result};

struct Playback {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// [`SynthesisEngine`] backed by a text-to-speech API
pub struct CloudSpeaker {
    tts: Arc<TextToSpeech>,
    current: Option<Playback>,
}

impl CloudSpeaker {
    #[must_use]
    pub fn new(tts: TextToSpeech) -> Self {
        Self {
            tts: Arc::new(tts),
            current: None,
        }
    }
}

impl SynthesisEngine for CloudSpeaker {
    fn speak(&mut self, text: &str, events: SynthesisEmitter) -> Result<()> {
        self.cancel();

        let stop = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(utter(
            Arc::clone(&self.tts),
            text.to_string(),
            Arc::clone(&stop),
            events,
        ));
        self.current = Some(Playback { stop, task });
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(playback) = self.current.take() {
            playback.stop.store(true, Ordering::Relaxed);
            playback.task.abort();
        }
    }
}

async fn utter(tts: Arc<TextToSpeech>, text: String, stop: Arc<AtomicBool>, events: SynthesisEmitter) {
    let id = events.id().0;
    match synthesize_and_play(&tts, &text, &stop).await {
        Ok(()) if stop.load(Ordering::Relaxed) => tracing::trace!(id, "utterance cancelled"),
        Ok(()) => events.finished(),
        Err(e) => {
            tracing::warn!(id, error = %e, "utterance failed");
            events.failed(e.to_string());
        }
    }
}

async fn synthesize_and_play(tts: &TextToSpeech, text: &str, stop: &Arc<AtomicBool>) -> Result<()> {
    let mp3 = tts.synthesize(text).await?;
    if stop.load(Ordering::Relaxed) {
        return Ok(());
    }

    let audio = decode_mp3(&mp3)?;
    let stop = Arc::clone(stop);
    tokio::task::spawn_blocking(move || play_blocking(audio, &stop))
        .await
        .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
}
