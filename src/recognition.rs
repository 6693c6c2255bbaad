//! Recognition controller
//!
//! Wraps the speech-to-text engine. Owns the single live recognition
//! handle, the restart policy applied when the engine stops, and the
//! anti-feedback guard that drops transcripts captured while the assistant
//! is speaking.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::capability::RecognitionEngine;
use crate::events::{EngineEvent, EventSink, RecognitionErrorKind, RecognitionId};
use crate::microphone::AudioTap;
use crate::session::{CallSession, CallStatus, MicPermission};
use crate::{Error, Result};

/// Status shown when the recognizer reports a microphone denial
pub const MIC_DENIED_STATUS: &str = "Microphone access was denied. You can keep chatting by typing.";

/// Status shown once transient errors keep recurring
pub const RECOGNITION_TROUBLE_STATUS: &str = "Having trouble hearing you. Still listening...";

/// Consecutive transient errors before the trouble status is shown
const TROUBLE_THRESHOLD: u32 = 3;

/// What the controller did with an `Ended` event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndedOutcome {
    /// Event belonged to a replaced handle
    Stale,
    /// Speech playback owns the resume
    Suspended,
    /// A delayed restart was scheduled
    RestartScheduled,
    /// In call, but the operator does not want to listen
    Paused,
    /// No call; show the idle state
    Idle,
}

#[derive(Debug, Clone, Copy)]
struct ActiveRecognition {
    id: RecognitionId,
    stopping: bool,
}

/// Owns recognition start/stop/restart and the suspension guard
pub struct RecognitionController {
    engine: Option<Box<dyn RecognitionEngine>>,
    events: EventSink,
    restart_delay: Duration,
    next_id: u64,
    active: Option<ActiveRecognition>,
    pending_restart: Option<JoinHandle<()>>,
    consecutive_errors: u32,
}

impl RecognitionController {
    /// Create a controller; `engine` is `None` when the host has no recognizer
    #[must_use]
    pub fn new(
        engine: Option<Box<dyn RecognitionEngine>>,
        events: EventSink,
        restart_delay: Duration,
    ) -> Self {
        Self {
            engine,
            events,
            restart_delay,
            next_id: 0,
            active: None,
            pending_restart: None,
            consecutive_errors: 0,
        }
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    /// Capturing right now (a handle exists and no stop was requested)
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.active.is_some_and(|a| !a.stopping)
    }

    /// A handle exists, possibly waiting for its `Ended`
    #[must_use]
    pub const fn has_handle(&self) -> bool {
        self.active.is_some()
    }

    /// Begin continuous capture on the cached microphone
    ///
    /// Starting while a handle still exists is a no-op: a live handle keeps
    /// listening, a stopping one hands over through its `Ended`.
    ///
    /// # Errors
    ///
    /// `EngineUnavailable` if the host has no recognizer, `PermissionDenied`
    /// if the microphone was never granted, or the engine's start error
    pub fn start(&mut self, session: &mut CallSession, mic: Option<&AudioTap>) -> Result<()> {
        let Some(engine) = self.engine.as_mut() else {
            return Err(Error::EngineUnavailable("recognition"));
        };
        let Some(mic) = mic.filter(|_| session.mic_permission == MicPermission::Granted) else {
            return Err(Error::PermissionDenied);
        };

        if let Some(active) = self.active {
            if !active.stopping {
                session.status = CallStatus::Listening;
            }
            tracing::debug!(id = active.id.0, stopping = active.stopping, "recognition handle exists, not starting");
            return Ok(());
        }

        self.next_id += 1;
        let id = RecognitionId(self.next_id);
        engine.start(mic, self.events.recognition(id))?;

        self.active = Some(ActiveRecognition { id, stopping: false });
        session.status = CallStatus::Listening;
        tracing::info!(id = id.0, "recognition started");
        Ok(())
    }

    /// Request cessation; returns whether a stop was actually issued
    pub fn stop(&mut self) -> bool {
        match (self.active.as_mut(), self.engine.as_mut()) {
            (Some(active), Some(engine)) if !active.stopping => {
                active.stopping = true;
                engine.stop();
                tracing::debug!(id = active.id.0, "recognition stop requested");
                true
            }
            _ => false,
        }
    }

    /// Filter a finalized transcript; `Some` means forward it for dispatch
    #[must_use]
    pub fn on_transcript(
        &mut self,
        session: &CallSession,
        id: RecognitionId,
        text: &str,
    ) -> Option<String> {
        if !self.is_current(id) {
            tracing::debug!(id = id.0, "transcript from replaced handle, dropping");
            return None;
        }
        if session.suspended_for_tts {
            tracing::debug!(transcript = %text, "transcript captured during speech, discarding");
            return None;
        }

        self.consecutive_errors = 0;
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(text.to_string())
    }

    /// Apply the restart policy after the engine stopped
    pub fn on_ended(&mut self, session: &CallSession, id: RecognitionId) -> EndedOutcome {
        if !self.is_current(id) {
            tracing::debug!(id = id.0, "end from replaced handle, ignoring");
            return EndedOutcome::Stale;
        }
        self.active = None;
        tracing::debug!(id = id.0, "recognition ended");

        if session.suspended_for_tts {
            return EndedOutcome::Suspended;
        }
        if session.is_in_call() && session.should_keep_listening {
            self.schedule_restart(session.call_epoch);
            return EndedOutcome::RestartScheduled;
        }
        if session.is_in_call() {
            EndedOutcome::Paused
        } else {
            EndedOutcome::Idle
        }
    }

    /// Handle an engine error; returns a status line to surface, if any
    ///
    /// A permission denial stops all further restarts. Anything else is
    /// transient and recovered by the `Ended` that follows.
    pub fn on_error(
        &mut self,
        session: &mut CallSession,
        id: RecognitionId,
        kind: &RecognitionErrorKind,
    ) -> Option<&'static str> {
        if !self.is_current(id) {
            return None;
        }

        if *kind == RecognitionErrorKind::PermissionDenied {
            tracing::warn!("recognition reported microphone denial, disabling restarts");
            session.should_keep_listening = false;
            session.mic_permission = MicPermission::Denied;
            return Some(MIC_DENIED_STATUS);
        }

        self.consecutive_errors += 1;
        tracing::warn!(
            error = %kind,
            consecutive = self.consecutive_errors,
            "transient recognition error"
        );
        (self.consecutive_errors >= TROUBLE_THRESHOLD).then_some(RECOGNITION_TROUBLE_STATUS)
    }

    /// Post a `RestartDue` for `epoch` after the restart delay
    ///
    /// Restarts are never performed inline: restarting from inside the
    /// engine's own end callback makes some engines stop again immediately.
    pub fn schedule_restart(&mut self, epoch: u64) {
        if let Some(previous) = self.pending_restart.take() {
            previous.abort();
        }

        let events = self.events.clone();
        let delay = self.restart_delay;
        self.pending_restart = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            events.emit(EngineEvent::RestartDue { epoch });
        }));
        tracing::trace!(epoch, delay_ms = delay.as_millis(), "recognition restart scheduled");
    }

    /// Abort a scheduled restart (teardown only; ending a call relies on the
    /// fire-time check instead)
    pub fn cancel_pending_restart(&mut self) {
        if let Some(pending) = self.pending_restart.take() {
            pending.abort();
        }
    }

    fn is_current(&self, id: RecognitionId) -> bool {
        self.active.is_some_and(|a| a.id == id)
    }
}
