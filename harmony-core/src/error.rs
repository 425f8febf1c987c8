//! # Error Types
//!
//! Errors surfaced by the pitch tracker. Lifecycle and device failures propagate
//! to the caller; computational failures inside the per-block pipeline never
//! leave the capture thread and degrade to silence instead.

use thiserror::Error;

/// Errors returned by the tracker's lifecycle surface (`new`, `start`, `stop`).
#[derive(Debug, Error)]
pub enum TrackerError {
    /// `start()` was called while a capture session is active.
    #[error("pitch tracker is already running")]
    AlreadyRunning,

    /// A lifecycle method was called from inside a listener on the capture thread.
    #[error("{operation}() called from the capture thread inside a listener")]
    ReentrantCall {
        /// Name of the offending operation.
        operation: &'static str,
    },

    /// The audio device could not be opened or the stream could not be started.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// The tracker configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failures of the audio capture subsystem.
///
/// Messages carry the device name and the backend's own description (which
/// includes the OS error where the host API reports one).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    #[error("no input device available")]
    NoInputDevice,

    #[error("input device '{name}' not found")]
    DeviceNotFound { name: String },

    #[error("failed to query audio devices: {message}")]
    DeviceQuery { message: String },

    #[error("input device '{device}' has no usable configuration: {reason}")]
    UnsupportedConfig { device: String, reason: String },

    #[error("failed to open input stream on '{device}': {message}")]
    Open { device: String, message: String },

    #[error("failed to start input stream on '{device}': {message}")]
    Start { device: String, message: String },

    /// The stream died mid-session (device unplugged, driver reset).
    #[error("input stream on '{device}' was lost: {message}")]
    StreamLost { device: String, message: String },

    #[error("failed to spawn capture thread: {message}")]
    Spawn { message: String },

    /// The capture worker exited before reporting whether the device opened.
    #[error("capture thread exited unexpectedly")]
    WorkerExited,
}

/// Configuration validation and loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors produced when mapping a frequency to a note.
#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum QuantizeError {
    /// Frequency was zero, negative, NaN or infinite.
    #[error("invalid frequency {0} Hz")]
    InvalidFrequency(f32),
}

/// Errors produced when parsing note names such as `"C#4"` or `"Bb3"`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NoteParseError {
    #[error("empty note name")]
    Empty,

    #[error("unknown pitch class '{0}'")]
    UnknownPitchClass(String),

    #[error("invalid octave in note '{0}'")]
    InvalidOctave(String),
}
