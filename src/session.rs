//! Call session state
//!
//! The single mutable record of a widget's call state. Only
//! [`CallOrchestrator`](crate::orchestrator::CallOrchestrator) mutates it;
//! everything else receives a shared reference.

/// Lifecycle status of the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallStatus {
    /// No call has been started yet
    #[default]
    Idle,
    /// Call requested, waiting on the microphone and recognizer
    Connecting,
    /// In call, recognition capturing
    Listening,
    /// In call, assistant speech playing
    Speaking,
    /// In call, capture paused (operator toggle or awaiting restart)
    Suspended,
    /// Call finished
    Ended,
}

impl CallStatus {
    /// Whether this status belongs to an active call
    #[must_use]
    pub const fn is_in_call(self) -> bool {
        matches!(self, Self::Listening | Self::Speaking | Self::Suspended)
    }
}

/// Microphone permission as observed by the widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MicPermission {
    #[default]
    NotRequested,
    Granted,
    Denied,
}

/// Central call state, one per widget instance
#[derive(Debug, Clone, Default)]
pub struct CallSession {
    pub status: CallStatus,

    /// Operator intent to keep the microphone active across recognizer restarts
    pub should_keep_listening: bool,

    /// Recognition intentionally paused while assistant speech plays
    pub suspended_for_tts: bool,

    /// Sticky flag: re-arm listening after every assistant reply
    pub persistent_call_mode: bool,

    pub mic_permission: MicPermission,

    /// Incremented on every call start; scheduled restarts carry the value
    /// they were scheduled under and are dropped if it has moved on
    pub call_epoch: u64,
}

impl CallSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn is_in_call(&self) -> bool {
        self.status.is_in_call()
    }

    /// Whether a restart scheduled under `epoch` may still fire
    #[must_use]
    pub const fn restart_allowed(&self, epoch: u64) -> bool {
        epoch == self.call_epoch
            && self.is_in_call()
            && self.should_keep_listening
            && !self.suspended_for_tts
    }
}
