//! Beacon Call - voice call engine for the Beacon chat widget
//!
//! This library provides the orchestration core behind the widget's typed
//! chat and live voice calling:
//! - Microphone acquisition (requested once, cached, released on teardown)
//! - Continuous recognition with delayed restarts and an anti-feedback guard
//! - Reply playback kept mutually exclusive with recognition
//! - Serialized message exchange with the remote assistant service
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Presenter                         │
//! │        Terminal  │  (any other skin)                 │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Command        ▲ notifications
//! ┌────────────────────▼────────────────┴───────────────┐
//! │                CallOrchestrator                      │
//! │  Microphone │ Recognition │ Synthesis │ Dispatcher  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ EngineEvent queue
//! ┌────────────────────▼────────────────────────────────┐
//! │              Host capabilities (voice)               │
//! │    cpal capture │ STT │ TTS │ cpal playback │ HTTP   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod capability;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod history;
pub mod microphone;
pub mod orchestrator;
pub mod presenter;
pub mod recognition;
pub mod session;
pub mod synthesis;
pub mod voice;

pub use config::{Config, Theme};
pub use dispatch::{DispatchError, DispatchErrorKind, HttpRemoteService, MessageDispatcher, RemoteService};
pub use error::{Error, Result};
pub use events::{Command, EngineEvent, EventSink};
pub use history::{ConversationHistory, Role, Turn};
pub use microphone::{AudioTap, MicrophoneManager};
pub use orchestrator::{CallOrchestrator, Capabilities};
pub use presenter::{Indicator, Presenter, TerminalPresenter};
pub use session::{CallSession, CallStatus, MicPermission};
