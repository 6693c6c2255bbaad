//! Call orchestration
//!
//! [`CallOrchestrator`] is the state machine tying the microphone,
//! recognition, synthesis and dispatch together. It owns the
//! [`CallSession`] and is the only thing that mutates it. Operator
//! [`Command`]s and engine [`EngineEvent`]s are handled one at a time with
//! `&mut self`, so every handler runs to completion before the next event
//! is looked at. Nothing here returns an error to the host: failures end
//! up as status lines or apologies on the [`Presenter`].

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::capability::{MicrophoneProvider, RecognitionEngine, SynthesisEngine};
use crate::config::Config;
use crate::dispatch::{DispatchError, MessageDispatcher, RemoteService};
use crate::events::{Command, EngineEvent, EventSink, RecognitionErrorKind, RecognitionEvent, RecognitionId};
use crate::history::{ConversationHistory, Turn};
use crate::microphone::MicrophoneManager;
use crate::presenter::{Indicator, Presenter};
use crate::recognition::{EndedOutcome, MIC_DENIED_STATUS, RecognitionController};
use crate::session::{CallSession, CallStatus, MicPermission};
use crate::synthesis::SynthesisController;
use crate::Error;

/// Shown when the host cannot do voice at all
pub const VOICE_UNAVAILABLE_STATUS: &str =
    "Voice calling isn't available here. You can still chat by typing.";

/// Shown when the microphone could not be opened for a reason other than a denial
pub const MIC_UNAVAILABLE_STATUS: &str = "Couldn't open the microphone. Please try again.";

/// Shown when a restart or resume could not start the recognizer
pub const LISTEN_FAILED_STATUS: &str = "Listening stopped. Toggle recording to try again.";

pub const CONNECTING_STATUS: &str = "Connecting...";
pub const LISTENING_STATUS: &str = "Listening...";
pub const PAUSED_STATUS: &str = "Paused";
pub const CALL_ENDED_STATUS: &str = "Call ended";

/// Host capabilities handed to the orchestrator; absent ones disable voice
pub struct Capabilities {
    pub microphone: Option<Box<dyn MicrophoneProvider>>,
    pub recognition: Option<Box<dyn RecognitionEngine>>,
    pub synthesis: Option<Box<dyn SynthesisEngine>>,
    pub remote: Arc<dyn RemoteService>,
}

impl Capabilities {
    /// Text-only capabilities
    #[must_use]
    pub fn text_only(remote: Arc<dyn RemoteService>) -> Self {
        Self {
            microphone: None,
            recognition: None,
            synthesis: None,
            remote,
        }
    }
}

/// Voice call state machine, one per widget instance
pub struct CallOrchestrator {
    session: CallSession,
    history: ConversationHistory,
    microphone: Option<MicrophoneManager>,
    recognition: RecognitionController,
    synthesis: SynthesisController,
    dispatcher: MessageDispatcher,
    presenter: Box<dyn Presenter>,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    indicator: Option<Indicator>,
    torn_down: bool,
}

impl CallOrchestrator {
    /// Build the widget engine and render the welcome message
    #[must_use]
    pub fn new(config: &Config, capabilities: Capabilities, presenter: Box<dyn Presenter>) -> Self {
        let (sink, events) = EventSink::channel();
        let session_id = format!("web_{}", uuid::Uuid::new_v4().simple());

        let mut orchestrator = Self {
            session: CallSession::new(),
            history: ConversationHistory::new(),
            microphone: capabilities.microphone.map(MicrophoneManager::new),
            recognition: RecognitionController::new(
                capabilities.recognition,
                sink.clone(),
                config.restart_delay,
            ),
            synthesis: SynthesisController::new(capabilities.synthesis, sink.clone()),
            dispatcher: MessageDispatcher::new(capabilities.remote, session_id, sink),
            presenter,
            events,
            indicator: None,
            torn_down: false,
        };

        tracing::info!(
            session_id = %orchestrator.dispatcher.session_id(),
            voice = orchestrator.voice_available(),
            speech = orchestrator.synthesis.is_available(),
            "widget ready"
        );

        // The greeting is display-only and never replayed to the service
        orchestrator
            .presenter
            .render_turn(&Turn::assistant(config.welcome_message.clone()));
        if !orchestrator.voice_available() {
            orchestrator.presenter.set_status(VOICE_UNAVAILABLE_STATUS);
        }
        orchestrator.sync_indicator();
        orchestrator
    }

    /// Process commands and engine events until shutdown
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => break,
                },
                Some(event) = self.events.recv() => self.handle_event(event),
            }
        }
        self.shutdown();
    }

    /// Apply one operator command; returns false once the widget is torn down
    pub async fn handle_command(&mut self, command: Command) -> bool {
        tracing::debug!(?command, "command");
        match command {
            Command::StartCall => self.start_call().await,
            Command::EndCall => self.end_call(),
            Command::ToggleRecording => self.toggle_recording(),
            Command::TogglePersistentMode => self.toggle_persistent_mode(),
            Command::SendText(text) => self.send_text(&text),
            Command::Shutdown => self.shutdown(),
        }
        !self.torn_down
    }

    /// Wait for the next engine event and handle it; false if the queue closed
    pub async fn pump(&mut self) -> bool {
        match self.events.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Handle every event already queued, without waiting; returns how many
    pub fn pump_ready(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Apply one engine event
    pub fn handle_event(&mut self, event: EngineEvent) {
        if self.torn_down {
            tracing::trace!(?event, "event after teardown, dropping");
            return;
        }

        match event {
            EngineEvent::Recognition { id, event } => self.on_recognition(id, event),
            EngineEvent::Synthesis { id, event } => {
                if self.synthesis.on_event(&mut self.session, &mut self.recognition, id, &event)
                    && self.session.is_in_call()
                {
                    let status = if self.session.should_keep_listening {
                        LISTENING_STATUS
                    } else {
                        PAUSED_STATUS
                    };
                    self.presenter.set_status(status);
                }
            }
            EngineEvent::RestartDue { epoch } => self.on_restart_due(epoch),
            EngineEvent::DispatchFinished(result) => self.on_dispatch_finished(result),
        }
        self.sync_indicator();
    }

    /// Begin a voice call
    ///
    /// Valid from `Idle` or `Ended`. The microphone is requested on the
    /// first call only; later calls reuse the cached stream.
    pub async fn start_call(&mut self) {
        if self.torn_down {
            return;
        }
        if self.session.is_in_call() || self.session.status == CallStatus::Connecting {
            tracing::debug!(status = ?self.session.status, "call already active");
            return;
        }
        if !self.voice_available() {
            self.presenter.set_status(VOICE_UNAVAILABLE_STATUS);
            return;
        }

        let previous = self.session.status;
        self.session.call_epoch += 1;
        self.session.status = CallStatus::Connecting;
        self.session.should_keep_listening = true;
        self.presenter.set_status(CONNECTING_STATUS);
        self.sync_indicator();
        tracing::info!(epoch = self.session.call_epoch, "starting call");

        let acquired = match self.microphone.as_mut() {
            Some(microphone) => microphone.acquire().await,
            None => Err(Error::EngineUnavailable("microphone")),
        };
        let mic = match acquired {
            Ok(mic) => mic,
            Err(e) => {
                self.session.should_keep_listening = false;
                self.session.status = previous;
                let status = if matches!(e, Error::PermissionDenied) {
                    self.session.mic_permission = MicPermission::Denied;
                    MIC_DENIED_STATUS
                } else {
                    MIC_UNAVAILABLE_STATUS
                };
                tracing::warn!(error = %e, "call could not start");
                self.presenter.set_status(status);
                self.sync_indicator();
                return;
            }
        };
        self.session.mic_permission = MicPermission::Granted;

        match self.recognition.start(&mut self.session, Some(&mic)) {
            Ok(()) => {
                if !self.recognition.is_listening() {
                    // The previous call's handle is still stopping; its end
                    // schedules the restart for this call
                    self.session.status = CallStatus::Suspended;
                }
                self.presenter.set_status(LISTENING_STATUS);
            }
            Err(e) => {
                tracing::warn!(error = %e, "recognition failed to start");
                self.session.should_keep_listening = false;
                self.session.status = previous;
                self.presenter.set_status(LISTEN_FAILED_STATUS);
            }
        }
        self.sync_indicator();
    }

    /// End the active call; calling it again has no further effect
    pub fn end_call(&mut self) {
        if !self.session.is_in_call() {
            tracing::debug!(status = ?self.session.status, "no active call to end");
            return;
        }

        self.session.should_keep_listening = false;
        self.recognition.stop();
        self.synthesis.cancel(&mut self.session);
        self.session.status = CallStatus::Ended;
        tracing::info!(epoch = self.session.call_epoch, "call ended");

        self.presenter.set_status(CALL_ENDED_STATUS);
        self.sync_indicator();
    }

    /// Pause or resume capture without ending the call
    pub fn toggle_recording(&mut self) {
        if !self.session.is_in_call() {
            tracing::debug!("toggle recording outside a call, ignoring");
            return;
        }

        if self.session.should_keep_listening {
            self.session.should_keep_listening = false;
            if self.session.suspended_for_tts {
                self.synthesis.set_resume_after_speech(false);
            } else {
                self.recognition.stop();
                self.session.status = CallStatus::Suspended;
            }
            self.presenter.set_status(PAUSED_STATUS);
        } else {
            self.session.should_keep_listening = true;
            if self.session.suspended_for_tts {
                self.synthesis.set_resume_after_speech(true);
            } else {
                self.resume_listening();
            }
        }
        tracing::debug!(listening = self.session.should_keep_listening, "recording toggled");
        self.sync_indicator();
    }

    /// Flip the sticky auto-relisten flag
    pub fn toggle_persistent_mode(&mut self) {
        self.session.persistent_call_mode = !self.session.persistent_call_mode;
        tracing::info!(enabled = self.session.persistent_call_mode, "persistent call mode");
        self.presenter.set_persistent_mode(self.session.persistent_call_mode);
    }

    /// Submit a typed chat message
    pub fn send_text(&mut self, text: &str) {
        if self.torn_down {
            return;
        }
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.submit(text);
    }

    /// Tear the widget down: end the call, stop speech, release the microphone
    pub fn shutdown(&mut self) {
        if self.torn_down {
            return;
        }
        self.end_call();
        self.synthesis.cancel(&mut self.session);
        self.recognition.stop();
        self.recognition.cancel_pending_restart();
        if let Some(microphone) = self.microphone.as_mut() {
            microphone.release();
        }
        self.torn_down = true;
        tracing::info!(turns = self.history.len(), "widget torn down");
    }

    #[must_use]
    pub const fn session(&self) -> &CallSession {
        &self.session
    }

    #[must_use]
    pub const fn history(&self) -> &ConversationHistory {
        &self.history
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        self.dispatcher.session_id()
    }

    /// Recognition is capturing right now
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.recognition.is_listening()
    }

    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.synthesis.is_speaking()
    }

    #[must_use]
    pub const fn is_dispatching(&self) -> bool {
        self.dispatcher.is_in_flight()
    }

    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Microphone and recognizer are both present
    #[must_use]
    pub const fn voice_available(&self) -> bool {
        self.microphone.is_some() && self.recognition.is_available()
    }

    fn on_recognition(&mut self, id: RecognitionId, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Transcript(text) => {
                let Some(text) = self.recognition.on_transcript(&self.session, id, &text) else {
                    return;
                };
                if self.session.is_in_call() {
                    tracing::debug!(transcript = %text, "transcript");
                    self.submit(&text);
                } else {
                    tracing::debug!("transcript after call ended, dropping");
                }
            }
            RecognitionEvent::Error(kind) => {
                if let Some(status) = self.recognition.on_error(&mut self.session, id, &kind) {
                    if kind == RecognitionErrorKind::PermissionDenied {
                        if let Some(microphone) = self.microphone.as_mut() {
                            microphone.mark_denied();
                        }
                    }
                    self.presenter.set_status(status);
                }
            }
            RecognitionEvent::Ended => {
                let outcome = self.recognition.on_ended(&self.session, id);
                tracing::trace!(?outcome, "recognition end handled");
                if matches!(outcome, EndedOutcome::RestartScheduled | EndedOutcome::Paused)
                    && self.session.status == CallStatus::Listening
                {
                    self.session.status = CallStatus::Suspended;
                }
            }
        }
    }

    fn on_restart_due(&mut self, epoch: u64) {
        if !self.session.restart_allowed(epoch) {
            tracing::trace!(
                epoch,
                current = self.session.call_epoch,
                "restart no longer wanted, skipping"
            );
            return;
        }
        self.resume_listening();
    }

    fn resume_listening(&mut self) {
        let mic = self.microphone.as_ref().and_then(MicrophoneManager::cached);
        match self.recognition.start(&mut self.session, mic.as_ref()) {
            Ok(()) => {}
            Err(Error::PermissionDenied) => {
                self.session.should_keep_listening = false;
                self.presenter.set_status(MIC_DENIED_STATUS);
            }
            Err(e) => {
                tracing::warn!(error = %e, "recognition restart failed");
                self.session.should_keep_listening = false;
                self.session.status = CallStatus::Suspended;
                self.presenter.set_status(LISTEN_FAILED_STATUS);
            }
        }
    }

    fn submit(&mut self, text: &str) {
        let history = &mut self.history;
        let presenter = &mut self.presenter;
        let sent = self.dispatcher.send(text, || {
            let turn = Turn::user(text);
            presenter.render_turn(&turn);
            history.push(turn);
            history.snapshot()
        });
        if let Err(e) = sent {
            tracing::debug!(error = %e, "message not sent");
            self.presenter.set_status(e.apology());
            return;
        }
        self.presenter.set_loading(true);
    }

    fn on_dispatch_finished(&mut self, result: Result<String, DispatchError>) {
        self.dispatcher.complete();
        self.presenter.set_loading(false);

        let spoken = match result {
            Ok(reply) => {
                let turn = Turn::assistant(reply);
                self.presenter.render_turn(&turn);
                let spoken = turn.content.clone();
                self.history.push(turn);
                spoken
            }
            Err(e) => {
                tracing::warn!(kind = ?e.kind, error = %e, "dispatch failed");
                self.presenter.render_apology(e.apology());
                e.apology().to_string()
            }
        };

        if self.session.is_in_call() && !spoken.trim().is_empty() {
            self.speak(&spoken);
        }
    }

    fn speak(&mut self, text: &str) {
        match self.synthesis.speak(&mut self.session, &mut self.recognition, text) {
            Ok(_) => {}
            Err(Error::EngineUnavailable(_)) => {
                tracing::debug!("no synthesizer, reply shown as text only");
            }
            Err(e) => tracing::warn!(error = %e, "reply could not be spoken"),
        }
    }

    fn sync_indicator(&mut self) {
        let indicator = Indicator::from(self.session.status);
        if self.indicator != Some(indicator) {
            self.indicator = Some(indicator);
            self.presenter.set_indicator(indicator);
        }
    }
}
