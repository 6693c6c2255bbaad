//! Error types for Beacon call

use thiserror::Error;

/// Result type alias for Beacon call operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the call engine and its host adapters
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone access was refused by the host
    #[error("microphone permission denied")]
    PermissionDenied,

    /// A speech capability is not present on this host
    #[error("{0} engine unavailable")]
    EngineUnavailable(&'static str),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
