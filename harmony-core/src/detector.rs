//! Per-block note detection pipeline.
//!
//! window → spectrum → harmonic product spectrum → quantizer → stabilizer.
//! Nothing here fails: every computational problem turns the block into silence.

use log::trace;

use crate::config::TrackerConfig;
use crate::listener::NoteEvent;
use crate::pitch::HarmonicProductSpectrum;
use crate::spectrum::SpectralProcessor;
use crate::stabilizer::NoteStabilizer;
use crate::tuning::{NoteEstimate, NoteQuantizer};
use crate::window::SlidingWindow;

/// Owns all per-session analysis state. Lives on the capture thread.
pub struct NoteDetector {
    window: SlidingWindow,
    spectrum: SpectralProcessor,
    hps: HarmonicProductSpectrum,
    quantizer: NoteQuantizer,
    stabilizer: NoteStabilizer,
}

impl NoteDetector {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            window: SlidingWindow::new(config.window_size),
            spectrum: SpectralProcessor::new(
                config.window_size,
                config.sample_rate,
                config.white_noise_threshold,
                config.power_threshold,
            ),
            hps: HarmonicProductSpectrum::new(config.num_harmonics),
            quantizer: NoteQuantizer::new(config.concert_pitch_hz),
            stabilizer: NoteStabilizer::new(config.stabilization_window),
        }
    }

    /// Forgets the sample history and the stable note.
    pub fn reset(&mut self) {
        self.window.reset();
        self.stabilizer.reset();
    }

    /// Runs one block through the pipeline and returns the stable transition, if any.
    pub fn process_block(&mut self, block: &[f32]) -> Option<NoteEvent> {
        let estimate = self.estimate_block(block);
        self.stabilizer.push(estimate)
    }

    /// Appends `block` to the window and returns the raw (unstabilized) estimate.
    ///
    /// `None` means silence: an empty or corrupt block, a block of digital
    /// silence, a window below the power threshold, or no usable pitch.
    pub fn estimate_block(&mut self, block: &[f32]) -> Option<NoteEstimate> {
        if block.is_empty() || block.iter().any(|s| !s.is_finite()) {
            trace!("empty or non-finite block treated as silence");
            return None;
        }
        self.window.push(block);
        if block.iter().all(|&s| s == 0.0) {
            trace!("digital silence");
            return None;
        }

        let delta_freq = self.spectrum.delta_freq();
        let spectrum = self.spectrum.process(self.window.as_slice())?;
        let frequency = self.hps.estimate(spectrum, delta_freq)?;

        match self.quantizer.quantize(frequency) {
            Ok(estimate) => Some(estimate),
            Err(e) => {
                trace!("{}, treating block as silence", e);
                None
            }
        }
    }

    pub fn stabilizer(&self) -> &NoteStabilizer {
        &self.stabilizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> TrackerConfig {
        TrackerConfig {
            sample_rate: 8_000,
            window_size: 8_000,
            window_step: 2_000,
            ..Default::default()
        }
    }

    fn sine_blocks(freq: f32, config: &TrackerConfig, blocks: usize) -> Vec<Vec<f32>> {
        let samples: Vec<f32> = (0..config.window_step * blocks)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / config.sample_rate as f32).sin())
            .collect();
        samples.chunks(config.window_step).map(<[f32]>::to_vec).collect()
    }

    #[test]
    fn test_invalid_blocks_are_silence() {
        let mut detector = NoteDetector::new(&small_config());
        assert_eq!(detector.estimate_block(&[]), None);
        assert_eq!(detector.estimate_block(&[f32::NAN; 2_000]), None);
        assert_eq!(detector.estimate_block(&[0.0; 2_000]), None);
    }

    #[test]
    fn test_sine_settles_on_a4() {
        let config = small_config();
        let mut detector = NoteDetector::new(&config);
        let events: Vec<NoteEvent> = sine_blocks(440.0, &config, 4)
            .iter()
            .filter_map(|block| detector.process_block(block))
            .collect();
        let last = events.last().expect("a stable note once the window is primed");
        assert_eq!(last.label(), "A4");
        assert!((last.heard_frequency_hz() - 440.0).abs() < 2.0);
        assert_eq!(last.closest_pitch_hz(), 440.0);
    }

    #[test]
    fn test_reset_clears_history() {
        let config = small_config();
        let mut detector = NoteDetector::new(&config);
        for block in sine_blocks(440.0, &config, 4) {
            detector.process_block(&block);
        }
        assert!(detector.stabilizer().current().is_some());
        detector.reset();
        assert!(detector.stabilizer().current().is_none());
        assert_eq!(detector.estimate_block(&[0.0; 2_000]), None);
    }
}
