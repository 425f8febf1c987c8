//! Configuration parameters for the pitch tracker

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::pitch::DEFAULT_NUM_HARMONICS;
use crate::stabilizer::DEFAULT_STABILIZATION_WINDOW;
use crate::tuning::DEFAULT_CONCERT_PITCH_HZ;

/// Longest allowed wait between two checks of the stop request.
pub const MAX_POLL_INTERVAL_MS: u64 = 50;

/// Pitch tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Audio capture rate in Hz (default: 48000)
    pub sample_rate: u32,

    /// FFT window length in samples (default: 48000, one second)
    pub window_size: usize,

    /// Samples per capture block, the hop between two analyses (default: 12000)
    pub window_step: usize,

    /// Harmonic product spectrum iterations (default: 5)
    pub num_harmonics: usize,

    /// Minimum mean squared amplitude of the window to attempt detection (default: 1e-6)
    pub power_threshold: f32,

    /// Reference frequency of A4 in Hz (default: 440.0)
    pub concert_pitch_hz: f32,

    /// Fraction of an octave band's RMS below which bins are zeroed (default: 0.2)
    pub white_noise_threshold: f32,

    /// Consecutive agreeing estimates required for a stable note (default: 2)
    pub stabilization_window: usize,

    /// How often the capture worker checks for a stop request, in ms (default: 20)
    pub poll_interval_ms: u64,

    /// Blocks that may wait between the device callback and the worker (default: 8)
    pub queue_depth: usize,

    /// Input device name, `None` for the system default
    pub device: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            window_size: 48_000,
            window_step: 12_000,
            num_harmonics: DEFAULT_NUM_HARMONICS,
            power_threshold: 1e-6,
            concert_pitch_hz: DEFAULT_CONCERT_PITCH_HZ,
            white_noise_threshold: 0.2,
            stabilization_window: DEFAULT_STABILIZATION_WINDOW,
            poll_interval_ms: 20,
            queue_depth: 8,
            device: None,
        }
    }
}

impl TrackerConfig {
    /// Loads a configuration from a JSON file; missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Checks every parameter against the range the pipeline can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate", "must be greater than zero"));
        }
        if self.window_size < 2 {
            return Err(invalid("window_size", "must be at least 2 samples"));
        }
        if self.window_step == 0 || self.window_step > self.window_size {
            return Err(invalid(
                "window_step",
                format!("must be between 1 and window_size ({})", self.window_size),
            ));
        }
        if self.num_harmonics == 0 {
            return Err(invalid("num_harmonics", "must be at least 1"));
        }
        if !self.power_threshold.is_finite() || self.power_threshold < 0.0 {
            return Err(invalid("power_threshold", "must be a finite non-negative number"));
        }
        if !self.concert_pitch_hz.is_finite() || self.concert_pitch_hz <= 0.0 {
            return Err(invalid("concert_pitch_hz", "must be a finite positive frequency"));
        }
        if !self.white_noise_threshold.is_finite() || self.white_noise_threshold < 0.0 {
            return Err(invalid(
                "white_noise_threshold",
                "must be a finite non-negative number",
            ));
        }
        if self.stabilization_window == 0 {
            return Err(invalid("stabilization_window", "must be at least 1"));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(invalid(
                "poll_interval_ms",
                format!("must be between 1 and {}", MAX_POLL_INTERVAL_MS),
            ));
        }
        if self.queue_depth == 0 {
            return Err(invalid("queue_depth", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
