//! Shared test utilities
//!
//! Doubles for every host capability plus a widget harness wiring them
//! into a [`CallOrchestrator`]. Each double hands back a control sharing its
//! state, so tests can drive engine callbacks and inspect calls.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use beacon_call::capability::{MicrophoneProvider, RecognitionEngine, SynthesisEngine};
use beacon_call::config::file::CallConfigFile;
use beacon_call::dispatch::{DispatchError, DispatchRequest, RemoteService};
use beacon_call::events::{RecognitionEmitter, RecognitionErrorKind, SynthesisEmitter};
use beacon_call::microphone::{CaptureStream, MicrophoneHandle};
use beacon_call::{
    AudioTap, CallOrchestrator, Capabilities, Config, Error, Indicator, Presenter, Result, Turn,
};

/// Configuration with defaults only
#[must_use]
pub fn test_config() -> Config {
    Config::resolve(CallConfigFile::default(), |_| None, false).expect("default config")
}

// Microphone

#[derive(Default)]
struct MicState {
    requests: AtomicUsize,
    stops: AtomicUsize,
    deny: AtomicBool,
}

/// Test-side control for [`MockMicrophone`]
#[derive(Clone, Default)]
pub struct MicControl(Arc<MicState>);

impl MicControl {
    pub fn requests(&self) -> usize {
        self.0.requests.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.0.stops.load(Ordering::SeqCst)
    }

    pub fn deny(&self) {
        self.0.deny.store(true, Ordering::SeqCst);
    }
}

pub struct MockMicrophone(MicControl);

struct MockStream(MicControl);

impl CaptureStream for MockStream {
    fn stop(&mut self) {
        self.0.0.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait(?Send)]
impl MicrophoneProvider for MockMicrophone {
    async fn request_access(&mut self) -> Result<MicrophoneHandle> {
        self.0.0.requests.fetch_add(1, Ordering::SeqCst);
        if self.0.0.deny.load(Ordering::SeqCst) {
            return Err(Error::PermissionDenied);
        }
        Ok(MicrophoneHandle::new(
            AudioTap::new(),
            Box::new(MockStream(self.0.clone())),
        ))
    }
}

// Recognition

#[derive(Default)]
struct RecognitionState {
    starts: usize,
    stops: usize,
    capturing: bool,
    manual_end: bool,
    emitter: Option<RecognitionEmitter>,
}

/// Test-side control for [`MockRecognition`]; drives the engine's callbacks
#[derive(Clone, Default)]
pub struct RecognitionControl(Arc<Mutex<RecognitionState>>);

impl RecognitionControl {
    pub fn starts(&self) -> usize {
        self.0.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.0.lock().unwrap().stops
    }

    /// Started and not asked to stop
    pub fn capturing(&self) -> bool {
        self.0.lock().unwrap().capturing
    }

    /// Keep the handle alive after `stop()` until [`Self::ended`] is called
    pub fn set_manual_end(&self) {
        self.0.lock().unwrap().manual_end = true;
    }

    fn emitter(&self) -> RecognitionEmitter {
        self.0
            .lock()
            .unwrap()
            .emitter
            .clone()
            .expect("recognition never started")
    }

    pub fn transcript(&self, text: &str) {
        self.emitter().transcript(text);
    }

    pub fn error(&self, kind: RecognitionErrorKind) {
        self.emitter().error(kind);
    }

    /// Engine stopped on its own (or after a manual-end stop)
    pub fn ended(&self) {
        self.0.lock().unwrap().capturing = false;
        self.emitter().ended();
    }
}

pub struct MockRecognition(RecognitionControl);

impl RecognitionEngine for MockRecognition {
    fn start(&mut self, _mic: &AudioTap, events: RecognitionEmitter) -> Result<()> {
        let mut state = self.0.0.lock().unwrap();
        assert!(!state.capturing, "recognition started twice");
        state.starts += 1;
        state.capturing = true;
        state.emitter = Some(events);
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.0.0.lock().unwrap();
        state.stops += 1;
        state.capturing = false;
        if !state.manual_end {
            if let Some(emitter) = &state.emitter {
                emitter.ended();
            }
        }
    }
}

// Synthesis

#[derive(Default)]
struct SynthesisState {
    spoken: Vec<String>,
    cancels: usize,
    playing: bool,
    emitter: Option<SynthesisEmitter>,
}

/// Test-side control for [`MockSynthesis`]
#[derive(Clone, Default)]
pub struct SynthesisControl(Arc<Mutex<SynthesisState>>);

impl SynthesisControl {
    pub fn spoken(&self) -> Vec<String> {
        self.0.lock().unwrap().spoken.clone()
    }

    pub fn cancels(&self) -> usize {
        self.0.lock().unwrap().cancels
    }

    pub fn playing(&self) -> bool {
        self.0.lock().unwrap().playing
    }

    fn take_emitter(&self) -> SynthesisEmitter {
        let mut state = self.0.lock().unwrap();
        state.playing = false;
        state.emitter.take().expect("nothing is being spoken")
    }

    pub fn finish(&self) {
        self.take_emitter().finished();
    }

    pub fn fail(&self, reason: &str) {
        self.take_emitter().failed(reason);
    }
}

pub struct MockSynthesis(SynthesisControl);

impl SynthesisEngine for MockSynthesis {
    fn speak(&mut self, text: &str, events: SynthesisEmitter) -> Result<()> {
        let mut state = self.0.0.lock().unwrap();
        state.spoken.push(text.to_string());
        state.playing = true;
        state.emitter = Some(events);
        Ok(())
    }

    fn cancel(&mut self) {
        let mut state = self.0.0.lock().unwrap();
        state.cancels += 1;
        state.playing = false;
        state.emitter = None;
    }
}

// Remote service

/// Scripted remote service recording every request
#[derive(Default)]
pub struct MockRemote {
    responses: Mutex<VecDeque<std::result::Result<String, DispatchError>>>,
    requests: Mutex<Vec<DispatchRequest>>,
    gate: Option<Arc<Notify>>,
}

impl MockRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every response until the returned gate is notified
    #[must_use]
    pub fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let remote = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (remote, gate)
    }

    pub fn reply(&self, text: &str) {
        self.responses.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn fail(&self, error: DispatchError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<DispatchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteService for MockRemote {
    async fn send(&self, request: &DispatchRequest) -> std::result::Result<String, DispatchError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("reply to {}", request.message)))
    }
}

// Presenter

#[derive(Debug, Default)]
pub struct PresenterLog {
    pub turns: Vec<Turn>,
    pub apologies: Vec<String>,
    pub statuses: Vec<String>,
    pub indicators: Vec<Indicator>,
    pub loading: Vec<bool>,
    pub persistent: Vec<bool>,
}

/// Presenter that records every notification
#[derive(Clone, Default)]
pub struct RecordingPresenter(Arc<Mutex<PresenterLog>>);

impl RecordingPresenter {
    pub fn log(&self) -> std::sync::MutexGuard<'_, PresenterLog> {
        self.0.lock().unwrap()
    }

    pub fn last_status(&self) -> Option<String> {
        self.log().statuses.last().cloned()
    }

    pub fn last_indicator(&self) -> Option<Indicator> {
        self.log().indicators.last().copied()
    }
}

impl Presenter for RecordingPresenter {
    fn render_turn(&mut self, turn: &Turn) {
        self.log().turns.push(turn.clone());
    }

    fn render_apology(&mut self, text: &str) {
        self.log().apologies.push(text.to_string());
    }

    fn set_status(&mut self, text: &str) {
        self.log().statuses.push(text.to_string());
    }

    fn set_indicator(&mut self, indicator: Indicator) {
        self.log().indicators.push(indicator);
    }

    fn set_loading(&mut self, loading: bool) {
        self.log().loading.push(loading);
    }

    fn set_persistent_mode(&mut self, enabled: bool) {
        self.log().persistent.push(enabled);
    }
}

// Harness

/// A widget wired to doubles for every capability
pub struct Widget {
    pub orchestrator: CallOrchestrator,
    pub mic: MicControl,
    pub recognition: RecognitionControl,
    pub synthesis: SynthesisControl,
    pub remote: Arc<MockRemote>,
    pub presenter: RecordingPresenter,
}

impl Widget {
    #[must_use]
    pub fn new() -> Self {
        Self::with_remote(MockRemote::new())
    }

    #[must_use]
    pub fn with_remote(remote: MockRemote) -> Self {
        let mic = MicControl::default();
        let recognition = RecognitionControl::default();
        let synthesis = SynthesisControl::default();
        let remote = Arc::new(remote);
        let presenter = RecordingPresenter::default();

        let capabilities = Capabilities {
            microphone: Some(Box::new(MockMicrophone(mic.clone()))),
            recognition: Some(Box::new(MockRecognition(recognition.clone()))),
            synthesis: Some(Box::new(MockSynthesis(synthesis.clone()))),
            remote: Arc::clone(&remote) as Arc<dyn RemoteService>,
        };
        let orchestrator =
            CallOrchestrator::new(&test_config(), capabilities, Box::new(presenter.clone()));

        Self {
            orchestrator,
            mic,
            recognition,
            synthesis,
            remote,
            presenter,
        }
    }

    /// Handle queued events until the queue is momentarily empty
    pub fn settle(&mut self) {
        self.orchestrator.pump_ready();
        self.assert_exclusive();
    }

    /// Wait for and handle exactly one event
    pub async fn next(&mut self) {
        assert!(self.orchestrator.pump().await, "event queue closed");
        self.assert_exclusive();
    }

    /// Capture and playback are never active together
    pub fn assert_exclusive(&self) {
        assert!(
            !(self.recognition.capturing() && self.synthesis.playing()),
            "recognition and synthesis active at the same time"
        );
        assert!(
            !(self.orchestrator.is_capturing() && self.orchestrator.is_speaking()),
            "orchestrator reports capture during speech"
        );
    }

    /// Say `text` into the live call and handle the reply
    pub async fn exchange(&mut self, text: &str) {
        self.recognition.transcript(text);
        self.settle();
        self.next().await;
    }
}
