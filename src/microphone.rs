//! Microphone acquisition
//!
//! The capture stream is requested once per widget lifetime and cached.
//! Recognition engines only ever see an [`AudioTap`], a shared reference to
//! the capture buffer; stopping the stream is reserved to [`MicrophoneManager`].

use std::sync::{Arc, Mutex};

use crate::capability::MicrophoneProvider;
use crate::session::MicPermission;
use crate::{Error, Result};

/// Shared view of the samples a live capture stream has produced
#[derive(Debug, Clone, Default)]
pub struct AudioTap {
    buffer: Arc<Mutex<Vec<f32>>>,
}

impl AudioTap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append captured samples (called from the capture callback)
    pub fn push(&self, samples: &[f32]) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.extend_from_slice(samples);
        }
    }

    /// Get captured samples and clear the buffer
    #[must_use]
    pub fn take(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Drop everything captured so far
    pub fn clear(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    /// Whether two taps share the same capture buffer
    #[must_use]
    pub fn same_source(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

/// A running capture stream that can be stopped
pub trait CaptureStream {
    /// Stop all tracks of the stream
    fn stop(&mut self);
}

/// Live audio capture handle returned by a [`MicrophoneProvider`]
pub struct MicrophoneHandle {
    tap: AudioTap,
    stream: Box<dyn CaptureStream>,
}

impl MicrophoneHandle {
    #[must_use]
    pub fn new(tap: AudioTap, stream: Box<dyn CaptureStream>) -> Self {
        Self { tap, stream }
    }

    #[must_use]
    pub const fn tap(&self) -> &AudioTap {
        &self.tap
    }

    /// Stop the stream and drop any buffered samples
    pub fn stop(mut self) {
        self.stream.stop();
        self.tap.clear();
    }
}

impl std::fmt::Debug for MicrophoneHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrophoneHandle").finish_non_exhaustive()
    }
}

/// Owns the single microphone handle of a widget
pub struct MicrophoneManager {
    provider: Box<dyn MicrophoneProvider>,
    handle: Option<MicrophoneHandle>,
    permission: MicPermission,
    released: bool,
}

impl MicrophoneManager {
    #[must_use]
    pub fn new(provider: Box<dyn MicrophoneProvider>) -> Self {
        Self {
            provider,
            handle: None,
            permission: MicPermission::NotRequested,
            released: false,
        }
    }

    /// Return the cached capture handle, requesting it on first use
    ///
    /// Later calls never prompt again: a cached handle is returned as is and
    /// a previous denial is returned as `PermissionDenied`.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` if access was refused, or the provider's
    /// error if the device could not be opened
    pub async fn acquire(&mut self) -> Result<AudioTap> {
        if let Some(handle) = &self.handle {
            return Ok(handle.tap().clone());
        }
        if self.permission == MicPermission::Denied {
            return Err(Error::PermissionDenied);
        }
        if self.released {
            return Err(Error::Audio("microphone already released".to_string()));
        }

        tracing::debug!("requesting microphone access");
        match self.provider.request_access().await {
            Ok(handle) => {
                let tap = handle.tap().clone();
                self.handle = Some(handle);
                self.permission = MicPermission::Granted;
                tracing::info!("microphone access granted");
                Ok(tap)
            }
            Err(Error::PermissionDenied) => {
                self.permission = MicPermission::Denied;
                tracing::warn!("microphone access denied");
                Err(Error::PermissionDenied)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to open microphone");
                Err(e)
            }
        }
    }

    /// Tap of the cached handle without requesting anything
    #[must_use]
    pub fn cached(&self) -> Option<AudioTap> {
        self.handle.as_ref().map(|h| h.tap().clone())
    }

    #[must_use]
    pub const fn permission(&self) -> MicPermission {
        self.permission
    }

    /// Record a denial reported after the stream was granted (by the recognizer)
    pub fn mark_denied(&mut self) {
        self.permission = MicPermission::Denied;
    }

    /// Stop the cached stream and forget it; no-op when nothing is cached
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop();
            self.released = true;
            tracing::debug!("microphone released");
        }
    }
}
