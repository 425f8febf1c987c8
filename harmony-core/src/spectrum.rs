//! # Spectral Frame Module
//!
//! Turns the current sample window into a cleaned magnitude spectrum ready for
//! harmonic analysis.
//!
//! ## Processing steps
//! 1. Signal power gate (silent windows are not analysed)
//! 2. Hann windowing to reduce spectral leakage
//! 3. Forward FFT, keeping the non-negative half of the spectrum
//! 4. Mains hum suppression below [`MAINS_HUM_CUTOFF_HZ`]
//! 5. Adaptive per-octave noise floor over [`OCTAVE_BANDS_HZ`]

use log::{trace, warn};
use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// Every bin below this frequency is zeroed.
pub const MAINS_HUM_CUTOFF_HZ: f32 = 62.0;

/// Edges of the octave bands used for the adaptive noise floor, in Hz.
pub const OCTAVE_BANDS_HZ: [f32; 10] = [
    50.0, 100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0, 6400.0, 12800.0, 25600.0,
];

/// Builds a symmetric Hann window of `len` samples.
///
/// The window tapers the signal to zero at both edges, which keeps a partial
/// period at the window boundary from smearing energy across the spectrum.
pub fn hann_window(len: usize) -> Vec<f32> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let n_minus_1 = (len - 1) as f64;
    (0..len)
        .map(|i| (0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n_minus_1).cos())) as f32)
        .collect()
}

/// Mean squared amplitude of `samples` (squared L2 norm divided by length).
pub fn signal_power(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (energy / samples.len() as f64) as f32
}

/// Windowed FFT front end with hum and noise suppression.
///
/// The FFT plan, the Hann window and all working buffers are allocated once so
/// that processing a frame on the capture thread does not allocate.
pub struct SpectralProcessor {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    delta_freq: f32,
    white_noise_threshold: f32,
    power_threshold: f32,
}

impl SpectralProcessor {
    /// Creates a processor for windows of `window_size` samples.
    ///
    /// # Arguments
    /// * `window_size` - Number of samples per analysed window (FFT length)
    /// * `sample_rate` - Sample rate in Hz
    /// * `white_noise_threshold` - Fraction of a band's RMS below which bins are zeroed
    /// * `power_threshold` - Minimum signal power for a window to be analysed
    pub fn new(
        window_size: usize,
        sample_rate: u32,
        white_noise_threshold: f32,
        power_threshold: f32,
    ) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];

        Self {
            fft,
            window: hann_window(window_size),
            buffer: vec![Complex::default(); window_size],
            scratch,
            magnitudes: vec![0.0; window_size / 2],
            delta_freq: sample_rate as f32 / window_size as f32,
            white_noise_threshold,
            power_threshold,
        }
    }

    /// Width of one frequency bin in Hz.
    pub fn delta_freq(&self) -> f32 {
        self.delta_freq
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    /// Computes the cleaned magnitude spectrum of `samples`.
    ///
    /// # Returns
    /// * `Some(spectrum)` - `window_size / 2` magnitudes, bin `i` at `i * delta_freq` Hz
    /// * `None` - The window is too quiet to analyse, or has the wrong length
    pub fn process(&mut self, samples: &[f32]) -> Option<&[f32]> {
        if samples.len() != self.window.len() {
            warn!(
                "spectral frame has {} samples, expected {}",
                samples.len(),
                self.window.len()
            );
            return None;
        }

        let power = signal_power(samples);
        if power < self.power_threshold {
            trace!("signal power {:.3e} below threshold, skipping frame", power);
            return None;
        }

        for ((slot, &sample), &weight) in self.buffer.iter_mut().zip(samples).zip(&self.window) {
            *slot = Complex::new(sample * weight, 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (magnitude, bin) in self.magnitudes.iter_mut().zip(&self.buffer) {
            *magnitude = bin.norm();
        }

        suppress_mains_hum(&mut self.magnitudes, self.delta_freq);
        apply_octave_noise_floor(
            &mut self.magnitudes,
            self.delta_freq,
            self.white_noise_threshold,
        );

        Some(&self.magnitudes)
    }
}

/// Zeroes every bin below [`MAINS_HUM_CUTOFF_HZ`].
fn suppress_mains_hum(spectrum: &mut [f32], delta_freq: f32) {
    let cutoff = ((MAINS_HUM_CUTOFF_HZ / delta_freq) as usize).min(spectrum.len());
    spectrum[..cutoff].fill(0.0);
}

/// Zeroes bins that do not rise above `threshold` times their octave band's RMS.
///
/// Loud bands tolerate more residual noise, quiet bands are squelched hard.
fn apply_octave_noise_floor(spectrum: &mut [f32], delta_freq: f32, threshold: f32) {
    for band in OCTAVE_BANDS_HZ.windows(2) {
        let start = (band[0] / delta_freq) as usize;
        let end = ((band[1] / delta_freq) as usize).min(spectrum.len());
        if start >= end {
            continue;
        }

        let bins = &mut spectrum[start..end];
        let energy: f64 = bins.iter().map(|&m| f64::from(m) * f64::from(m)).sum();
        let rms = (energy / bins.len() as f64).sqrt() as f32;
        let floor = threshold * rms;

        for magnitude in bins.iter_mut() {
            if *magnitude <= floor {
                *magnitude = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
            })
            .collect()
    }

    #[test]
    fn test_hann_window_shape() {
        let window = hann_window(9);
        assert_eq!(window.len(), 9);
        assert!(window[0].abs() < 1e-7);
        assert!(window[8].abs() < 1e-7);
        assert!((window[4] - 1.0).abs() < 1e-6);
        assert!((window[2] - window[6]).abs() < 1e-6);
    }

    #[test]
    fn test_signal_power() {
        assert_eq!(signal_power(&[]), 0.0);
        assert!((signal_power(&[0.5; 16]) - 0.25).abs() < 1e-7);
    }

    #[test]
    fn test_quiet_window_is_skipped() {
        let mut processor = SpectralProcessor::new(8000, 8000, 0.2, 1e-6);
        assert!(processor.process(&vec![0.0; 8000]).is_none());
        assert!(processor.process(&sine(440.0, 1e-4, 8000, 8000)).is_none());
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let mut processor = SpectralProcessor::new(1024, 8000, 0.2, 1e-6);
        assert!(processor.process(&sine(440.0, 0.5, 8000, 512)).is_none());
    }

    #[test]
    fn test_mains_hum_is_suppressed() {
        let mut processor = SpectralProcessor::new(8000, 8000, 0.2, 1e-6);
        assert_eq!(processor.delta_freq(), 1.0);
        let spectrum = processor
            .process(&sine(50.0, 0.5, 8000, 8000))
            .expect("a loud 50 Hz tone passes the power gate");
        assert_eq!(spectrum.len(), 4000);
        assert_eq!(spectrum[50], 0.0);
        assert!(spectrum[..62].iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_noise_floor_keeps_peak_and_clears_band() {
        let mut processor = SpectralProcessor::new(8000, 8000, 0.2, 1e-6);
        let spectrum = processor.process(&sine(440.0, 0.5, 8000, 8000)).unwrap();
        assert!(spectrum[440] > 100.0);
        assert_eq!(spectrum[700], 0.0);
        assert!(spectrum[1200] < 1.0);
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(440));
    }
}
