//! # Audio Capture Module
//!
//! This module handles real-time audio capture using CPAL (Cross-Platform Audio Library).
//! Capture sits behind the [`AudioBackend`] trait so the tracker can be driven by
//! any block source; [`CpalBackend`] is the microphone implementation.
//!
//! ## Features
//! - Default or named input device selection
//! - Mono, fixed-size blocks regardless of the device's channel count and buffer size
//! - Integer and float sample formats converted to `f32`
//! - Driver errors split into transient glitches and fatal stream loss

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, StreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::{Sender, TrySendError};
use log::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::CaptureError;

/// Messages sent from the audio callback to the capture worker.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// `block_size` mono samples.
    Block(Vec<f32>),
    /// A transient driver problem; the session continues.
    Glitch(String),
    /// The stream is gone; the session must end.
    Failed(CaptureError),
}

/// What the tracker asks of an audio backend.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub sample_rate: u32,
    /// Samples per delivered block.
    pub block_size: usize,
    /// Channels delivered per block (the tracker always asks for mono).
    pub channels: u16,
    /// Device name, `None` for the default input.
    pub device: Option<String>,
}

impl InputSpec {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            block_size: config.window_step,
            channels: 1,
            device: config.device.clone(),
        }
    }
}

/// An open input stream. Dropping it closes the device.
pub trait CaptureStream {
    fn device_name(&self) -> &str;
}

/// Source of audio blocks.
///
/// `open` is called on the capture thread, and the returned stream is dropped on
/// that same thread, so streams do not need to be `Send`.
pub trait AudioBackend: Send + Sync {
    fn open(
        &self,
        spec: &InputSpec,
        events: Sender<CaptureEvent>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// Microphone capture through the default CPAL host.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalBackend;

struct CpalStream {
    stream: cpal::Stream,
    device: String,
}

impl CaptureStream for CpalStream {
    fn device_name(&self) -> &str {
        &self.device
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        // Pause before the stream is released.
        if let Err(e) = self.stream.pause() {
            warn!("error pausing input stream on '{}': {}", self.device, e);
        }
    }
}

impl AudioBackend for CpalBackend {
    /// Opens the input device and starts streaming blocks into `events`.
    ///
    /// This function:
    /// 1. Selects the requested (or default) input device
    /// 2. Picks a supported configuration at the requested sample rate
    /// 3. Sets up a callback that cuts the incoming audio into mono blocks
    fn open(
        &self,
        spec: &InputSpec,
        events: Sender<CaptureEvent>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let host = cpal::default_host();
        let device = select_device(&host, spec.device.as_deref())?;
        let name = device.name().unwrap_or_else(|_| "<unnamed device>".to_string());
        info!("Using audio input device: {}", name);

        let configs = device
            .supported_input_configs()
            .map_err(|e| CaptureError::UnsupportedConfig {
                device: name.clone(),
                reason: e.to_string(),
            })?
            .collect::<Vec<_>>();
        let supported = find_supported_config(configs, spec.sample_rate, spec.channels)
            .ok_or_else(|| CaptureError::UnsupportedConfig {
                device: name.clone(),
                reason: format!("no input format supports {} Hz", spec.sample_rate),
            })?;

        let sample_format = supported.sample_format();
        let config: StreamConfig = supported
            .with_sample_rate(cpal::SampleRate(spec.sample_rate))
            .into();
        info!(
            "Selected {} Hz, {} channel(s), {:?}",
            spec.sample_rate, config.channels, sample_format
        );

        let stream = match sample_format {
            SampleFormat::I8 => build_stream::<i8>(&device, &config, &name, spec.block_size, events),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, &name, spec.block_size, events),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, &name, spec.block_size, events),
            SampleFormat::U8 => build_stream::<u8>(&device, &config, &name, spec.block_size, events),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, &name, spec.block_size, events),
            SampleFormat::U32 => build_stream::<u32>(&device, &config, &name, spec.block_size, events),
            SampleFormat::F32 => build_stream::<f32>(&device, &config, &name, spec.block_size, events),
            SampleFormat::F64 => build_stream::<f64>(&device, &config, &name, spec.block_size, events),
            other => Err(CaptureError::UnsupportedConfig {
                device: name.clone(),
                reason: format!("unsupported sample format {:?}", other),
            }),
        }?;

        stream.play().map_err(|e| CaptureError::Start {
            device: name.clone(),
            message: e.to_string(),
        })?;

        Ok(Box::new(CpalStream {
            stream,
            device: name,
        }))
    }
}

fn select_device(host: &cpal::Host, wanted: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let Some(wanted) = wanted else {
        return host.default_input_device().ok_or(CaptureError::NoInputDevice);
    };

    let devices = host.input_devices().map_err(|e| CaptureError::DeviceQuery {
        message: e.to_string(),
    })?;
    for device in devices {
        if device.name().is_ok_and(|name| name == wanted) {
            return Ok(device);
        }
    }
    Err(CaptureError::DeviceNotFound {
        name: wanted.to_string(),
    })
}

/// Finds the best supported audio configuration for the target sample rate.
///
/// Only ranges containing `target_rate` qualify. Among those, the requested
/// channel count wins, then 32-bit float, then the fewest channels.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
    channels: u16,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .min_by_key(|c| {
            (
                c.channels() != channels,
                c.sample_format() != SampleFormat::F32,
                c.channels(),
            )
        })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    device_name: &str,
    block_size: usize,
    events: Sender<CaptureEvent>,
) -> Result<cpal::Stream, CaptureError>
where
    T: Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    let block_size = block_size.max(1);
    let error_events = events.clone();
    let error_device = device_name.to_string();

    // Mono samples not yet cut into a block.
    let mut pending: Vec<f32> = Vec::with_capacity(block_size * 2);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Keep the first channel of every frame.
                pending.extend(data.iter().step_by(channels).map(|&s| f32::from_sample(s)));

                // Cut as many full blocks as are available.
                while pending.len() >= block_size {
                    let block: Vec<f32> = pending.drain(..block_size).collect();
                    if let Err(TrySendError::Full(_)) = events.try_send(CaptureEvent::Block(block)) {
                        debug!("capture queue full, dropping block");
                    }
                }
            },
            move |err| {
                let message = err.to_string();
                match err {
                    cpal::StreamError::DeviceNotAvailable => {
                        // Blocks until the worker makes room or closes the queue.
                        let _ = error_events.send(CaptureEvent::Failed(CaptureError::StreamLost {
                            device: error_device.clone(),
                            message,
                        }));
                    }
                    _ => {
                        let _ = error_events.try_send(CaptureEvent::Glitch(message));
                    }
                }
            },
            None,
        )
        .map_err(|e| CaptureError::Open {
            device: device_name.to_string(),
            message: e.to_string(),
        })
}

/// Names of all input devices of the default host.
pub fn list_input_devices() -> Result<Vec<String>, CaptureError> {
    let host = cpal::default_host();
    let devices = host.input_devices().map_err(|e| CaptureError::DeviceQuery {
        message: e.to_string(),
    })?;
    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

pub fn default_input_device_name() -> Result<String, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::NoInputDevice)?;
    device.name().map_err(|e| CaptureError::DeviceQuery {
        message: e.to_string(),
    })
}
