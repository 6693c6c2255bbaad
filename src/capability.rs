//! Host capability contracts
//!
//! The engine is written against these traits only. The desktop host
//! implements them in [`crate::voice`]; tests substitute doubles.
//! Completion of `start`/`stop`/`speak`/`cancel` is reported asynchronously
//! through the emitter handed to the engine, never by the return value.

use async_trait::async_trait;

use crate::Result;
use crate::events::{RecognitionEmitter, SynthesisEmitter};
use crate::microphone::{AudioTap, MicrophoneHandle};

/// Permission-gated microphone stream acquisition
#[async_trait(?Send)]
pub trait MicrophoneProvider {
    /// Ask the host for a capture stream
    ///
    /// # Errors
    ///
    /// `Error::PermissionDenied` when the host refuses access, any other
    /// error when the device cannot be opened
    async fn request_access(&mut self) -> Result<MicrophoneHandle>;
}

/// Continuous speech-to-text capability
pub trait RecognitionEngine {
    /// Begin continuous capture on `mic`, reporting through `events`
    ///
    /// The engine emits one `Transcript` per finalized utterance and exactly
    /// one `Ended` when it stops for any reason.
    ///
    /// # Errors
    ///
    /// Returns error if capture cannot begin at all
    fn start(&mut self, mic: &AudioTap, events: RecognitionEmitter) -> Result<()>;

    /// Request cessation; `Ended` follows asynchronously
    fn stop(&mut self);
}

/// Utterance playback capability
pub trait SynthesisEngine {
    /// Begin speaking `text`, reporting `Finished` or `Failed` through `events`
    ///
    /// # Errors
    ///
    /// Returns error if playback cannot begin at all
    fn speak(&mut self, text: &str, events: SynthesisEmitter) -> Result<()>;

    /// Drop the playing or queued utterance; its events may be skipped
    fn cancel(&mut self);
}
