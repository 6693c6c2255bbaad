//! Microphone capture with cpal

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::capability::MicrophoneProvider;
use crate::microphone::{AudioTap, CaptureStream, MicrophoneHandle};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Opens the default input device on request
#[derive(Debug, Default)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn open() -> Result<MicrophoneHandle> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let config = input_config(&device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        let tap = AudioTap::new();
        let sink = tap.clone();
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| sink.push(data),
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::BackendSpecific { err } if is_refusal(&err.description) => {
                    Error::PermissionDenied
                }
                other => Error::Audio(other.to_string()),
            })?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        tracing::debug!("audio capture started");

        Ok(MicrophoneHandle::new(
            tap,
            Box::new(CpalStream {
                stream: Some(stream),
            }),
        ))
    }
}

#[async_trait(?Send)]
impl MicrophoneProvider for CpalMicrophone {
    async fn request_access(&mut self) -> Result<MicrophoneHandle> {
        Self::open()
    }
}

fn input_config(device: &cpal::Device) -> Result<StreamConfig> {
    let supported = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

    Ok(supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config())
}

/// Backends report a denied microphone as a generic backend error
fn is_refusal(description: &str) -> bool {
    let lower = description.to_lowercase();
    ["permission", "denied", "not authorized", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle))
}

struct CpalStream {
    stream: Option<Stream>,
}

impl CaptureStream for CpalStream {
    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::debug!(error = %e, "failed to pause capture stream");
            }
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
