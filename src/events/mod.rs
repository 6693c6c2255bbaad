//! Engine events and operator commands
//!
//! Host capabilities never call back into the orchestrator directly. They
//! post [`EngineEvent`]s onto a single queue through an [`EventSink`], and the
//! orchestrator handles them one at a time. Each recognition start and each
//! utterance gets its own id so late events from a replaced handle can be
//! told apart from current ones.

use std::fmt;

use tokio::sync::mpsc;

use crate::dispatch::DispatchError;

/// Identifies one recognition handle (one `start()` of the engine)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecognitionId(pub u64);

/// Identifies one synthesis utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtteranceId(pub u64);

/// Error kinds reported by a recognition engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Microphone access refused; no further restarts are attempted
    PermissionDenied,
    /// Transcription backend unreachable or failing
    Network,
    /// Audio capture failed
    AudioCapture,
    /// No speech was detected before the engine gave up
    NoSpeech,
    /// Anything else the engine reports
    Other(String),
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::Network => f.write_str("network"),
            Self::AudioCapture => f.write_str("audio capture"),
            Self::NoSpeech => f.write_str("no speech"),
            Self::Other(msg) => write!(f, "other: {msg}"),
        }
    }
}

/// Callback contract of a recognition engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// One utterance was finalized
    Transcript(String),
    /// The engine reported an error; an `Ended` follows
    Error(RecognitionErrorKind),
    /// The engine stopped, for whatever reason
    Ended,
}

/// Callback contract of a synthesis engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Finished,
    Failed(String),
    /// The engine never reported back within the utterance's deadline
    TimedOut,
}

/// Everything that re-enters the orchestrator asynchronously
#[derive(Debug)]
pub enum EngineEvent {
    Recognition {
        id: RecognitionId,
        event: RecognitionEvent,
    },
    Synthesis {
        id: UtteranceId,
        event: SynthesisEvent,
    },
    /// A delayed recognition restart came due
    RestartDue { epoch: u64 },
    /// The in-flight remote request completed
    DispatchFinished(Result<String, DispatchError>),
}

/// Operator input from the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartCall,
    EndCall,
    /// Pause or resume capture without ending the call
    ToggleRecording,
    TogglePersistentMode,
    /// Typed chat message
    SendText(String),
    /// Tear the widget down
    Shutdown,
}

/// Sending half of the engine event queue
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSink {
    /// Create a sink and the receiver the orchestrator drains
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Post an event; events posted after teardown are dropped
    pub fn emit(&self, event: EngineEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::trace!(event = ?e.0, "event queue closed, dropping event");
        }
    }

    /// Emitter bound to one recognition handle
    #[must_use]
    pub fn recognition(&self, id: RecognitionId) -> RecognitionEmitter {
        RecognitionEmitter {
            id,
            sink: self.clone(),
        }
    }

    /// Emitter bound to one utterance
    #[must_use]
    pub fn synthesis(&self, id: UtteranceId) -> SynthesisEmitter {
        SynthesisEmitter {
            id,
            sink: self.clone(),
        }
    }
}

/// Handed to a recognition engine on `start()`; tags every event with the handle id
#[derive(Debug, Clone)]
pub struct RecognitionEmitter {
    id: RecognitionId,
    sink: EventSink,
}

impl RecognitionEmitter {
    #[must_use]
    pub const fn id(&self) -> RecognitionId {
        self.id
    }

    pub fn transcript(&self, text: impl Into<String>) {
        self.emit(RecognitionEvent::Transcript(text.into()));
    }

    pub fn error(&self, kind: RecognitionErrorKind) {
        self.emit(RecognitionEvent::Error(kind));
    }

    pub fn ended(&self) {
        self.emit(RecognitionEvent::Ended);
    }

    fn emit(&self, event: RecognitionEvent) {
        self.sink.emit(EngineEvent::Recognition { id: self.id, event });
    }
}

/// Handed to a synthesis engine on `speak()`; tags every event with the utterance id
#[derive(Debug, Clone)]
pub struct SynthesisEmitter {
    id: UtteranceId,
    sink: EventSink,
}

impl SynthesisEmitter {
    #[must_use]
    pub const fn id(&self) -> UtteranceId {
        self.id
    }

    pub fn finished(&self) {
        self.emit(SynthesisEvent::Finished);
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.emit(SynthesisEvent::Failed(reason.into()));
    }

    fn emit(&self, event: SynthesisEvent) {
        self.sink.emit(EngineEvent::Synthesis { id: self.id, event });
    }
}
