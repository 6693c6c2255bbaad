//! Synthesis controller
//!
//! Wraps the text-to-speech engine and keeps it mutually exclusive with
//! recognition: recognition is stopped and suspended before playback
//! begins, and every utterance ends by clearing the suspension, on success
//! or failure. An engine that never reports back is timed out by a watchdog
//! posted through the same event queue.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::capability::SynthesisEngine;
use crate::events::{EngineEvent, EventSink, SynthesisEvent, UtteranceId};
use crate::recognition::RecognitionController;
use crate::session::{CallSession, CallStatus};
use crate::{Error, Result};

/// Grace period on top of the expected speaking time
const SPEECH_DEADLINE_MARGIN: Duration = Duration::from_secs(15);

/// Generous upper bound on speaking time per character, synthesis included
const SPEECH_TIME_PER_CHAR: Duration = Duration::from_millis(80);

/// How long an utterance of `text` may take before it is abandoned
#[must_use]
pub fn speech_deadline(text: &str) -> Duration {
    let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
    SPEECH_DEADLINE_MARGIN.saturating_add(SPEECH_TIME_PER_CHAR.saturating_mul(chars))
}

/// Owns playback and the resume-after-speech decision
pub struct SynthesisController {
    engine: Option<Box<dyn SynthesisEngine>>,
    events: EventSink,
    next_id: u64,
    current: Option<UtteranceId>,
    watchdog: Option<JoinHandle<()>>,
    resume_listening: bool,
}

impl SynthesisController {
    /// Create a controller; `engine` is `None` when the host has no synthesizer
    #[must_use]
    pub fn new(engine: Option<Box<dyn SynthesisEngine>>, events: EventSink) -> Self {
        Self {
            engine,
            events,
            next_id: 0,
            current: None,
            watchdog: None,
            resume_listening: false,
        }
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.current.is_some()
    }

    /// Speak `text`, replacing whatever is playing
    ///
    /// Recognition is stopped and `suspended_for_tts` set before the engine
    /// is asked to play, so nothing it captures from here on is dispatched.
    ///
    /// # Errors
    ///
    /// `EngineUnavailable` without a synthesizer (recognition is left
    /// untouched), or the engine's error if playback could not begin, in
    /// which case the suspension has already been undone
    pub fn speak(
        &mut self,
        session: &mut CallSession,
        recognition: &mut RecognitionController,
        text: &str,
    ) -> Result<UtteranceId> {
        if self.engine.is_none() {
            return Err(Error::EngineUnavailable("synthesis"));
        }

        // Last write wins
        self.cancel_current();

        if !session.suspended_for_tts {
            self.resume_listening = session.should_keep_listening;
        }
        recognition.stop();
        session.suspended_for_tts = true;
        if session.is_in_call() {
            session.status = CallStatus::Speaking;
        }

        self.next_id += 1;
        let id = UtteranceId(self.next_id);
        let emitter = self.events.synthesis(id);
        let started = match self.engine.as_mut() {
            Some(engine) => engine.speak(text, emitter),
            None => Err(Error::EngineUnavailable("synthesis")),
        };

        match started {
            Ok(()) => {
                self.current = Some(id);
                self.arm_watchdog(id, speech_deadline(text));
                tracing::debug!(id = id.0, chars = text.len(), "speech started");
                Ok(id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech could not start");
                self.complete(session, recognition);
                Err(e)
            }
        }
    }

    /// Handle a completion or failure; returns false for cancelled utterances
    pub fn on_event(
        &mut self,
        session: &mut CallSession,
        recognition: &mut RecognitionController,
        id: UtteranceId,
        event: &SynthesisEvent,
    ) -> bool {
        if self.current != Some(id) {
            tracing::debug!(id = id.0, "event from cancelled utterance, ignoring");
            return false;
        }

        match event {
            SynthesisEvent::Finished => tracing::debug!(id = id.0, "speech finished"),
            SynthesisEvent::Failed(reason) => {
                tracing::warn!(id = id.0, reason = %reason, "speech failed, resuming as if finished");
            }
            SynthesisEvent::TimedOut => {
                tracing::warn!(id = id.0, "speech never completed, abandoning it");
                if let Some(engine) = self.engine.as_mut() {
                    engine.cancel();
                }
            }
        }
        self.complete(session, recognition);
        true
    }

    /// Set whether listening resumes once the current speech ends
    pub const fn set_resume_after_speech(&mut self, resume: bool) {
        self.resume_listening = resume;
    }

    /// Stop playback and clear the suspension without resuming
    pub fn cancel(&mut self, session: &mut CallSession) {
        self.cancel_current();
        self.resume_listening = false;
        session.suspended_for_tts = false;
    }

    fn cancel_current(&mut self) {
        self.disarm_watchdog();
        if let Some(id) = self.current.take() {
            if let Some(engine) = self.engine.as_mut() {
                engine.cancel();
            }
            tracing::debug!(id = id.0, "speech cancelled");
        }
    }

    /// Post `TimedOut` for `id` unless the utterance settles first
    fn arm_watchdog(&mut self, id: UtteranceId, deadline: Duration) {
        self.disarm_watchdog();
        let events = self.events.clone();
        self.watchdog = Some(tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            events.emit(EngineEvent::Synthesis {
                id,
                event: SynthesisEvent::TimedOut,
            });
        }));
    }

    fn disarm_watchdog(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
    }

    /// Clear the suspension and hand listening back to recognition
    fn complete(&mut self, session: &mut CallSession, recognition: &mut RecognitionController) {
        self.disarm_watchdog();
        self.current = None;
        session.suspended_for_tts = false;
        let resume_listening = std::mem::take(&mut self.resume_listening);

        if !session.is_in_call() {
            return;
        }
        session.status = CallStatus::Suspended;

        if resume_listening || session.persistent_call_mode {
            session.should_keep_listening = true;
            recognition.schedule_restart(session.call_epoch);
        }
    }
}
