//! # Pitch Detection Module
//!
//! Fundamental frequency estimation with the Harmonic Product Spectrum (HPS).
//!
//! ## Features
//! - Spectrum interpolation for finer frequency resolution
//! - Harmonic reinforcement that resists octave errors
//! - Early exit when an extra harmonic would wipe out the product

use log::trace;

/// Default number of harmonic product iterations.
pub const DEFAULT_NUM_HARMONICS: usize = 5;

/// Harmonic Product Spectrum estimator.
///
/// The spectrum is multiplied by copies of itself compressed by 1, 2, .. `num_harmonics`.
/// Only a true fundamental has energy at every integer multiple, so its bin survives
/// the product while a single strong overtone does not.
pub struct HarmonicProductSpectrum {
    num_harmonics: usize,
    interpolated: Vec<f64>,
    product: Vec<f64>,
    next: Vec<f64>,
}

impl HarmonicProductSpectrum {
    pub fn new(num_harmonics: usize) -> Self {
        Self {
            num_harmonics: num_harmonics.max(1),
            interpolated: Vec::new(),
            product: Vec::new(),
            next: Vec::new(),
        }
    }

    pub fn num_harmonics(&self) -> usize {
        self.num_harmonics
    }

    /// Estimates the fundamental frequency of a cleaned magnitude spectrum.
    ///
    /// # Arguments
    /// * `spectrum` - Magnitude spectrum, bin `i` at `i * delta_freq` Hz
    /// * `delta_freq` - Width of one bin in Hz
    ///
    /// # Returns
    /// * `Some(frequency)` - Estimated fundamental in Hz
    /// * `None` - The spectrum carries no energy (nothing to estimate)
    pub fn estimate(&mut self, spectrum: &[f32], delta_freq: f32) -> Option<f32> {
        if spectrum.is_empty() {
            return None;
        }
        let factor = self.num_harmonics;

        // --- Step 1: Interpolate to `factor` points per bin ---
        interpolate(spectrum, factor, &mut self.interpolated);

        // --- Step 2: L2 normalisation ---
        let norm = self.interpolated.iter().map(|v| v * v).sum::<f64>().sqrt();
        if !(norm > 0.0 && norm.is_finite()) {
            return None;
        }
        for value in self.interpolated.iter_mut() {
            *value /= norm;
        }

        // --- Step 3: Multiply by the spectrum compressed by k ---
        let len = self.interpolated.len();
        self.product.clear();
        self.product.extend_from_slice(&self.interpolated);
        for k in 1..=factor {
            let product = &self.product;
            let interpolated = &self.interpolated;
            self.next.clear();
            self.next
                .extend((0..len.div_ceil(k)).map(|j| product[j] * interpolated[j * k]));

            if self.next.iter().all(|&v| v == 0.0) {
                trace!("harmonic product vanished at k={}, keeping previous", k);
                break;
            }
            std::mem::swap(&mut self.product, &mut self.next);
        }

        // --- Step 4: Peak bin back to Hz ---
        let (peak_index, peak) = argmax(&self.product)?;
        if peak <= 0.0 {
            return None;
        }
        Some((peak_index as f64 * f64::from(delta_freq) / factor as f64) as f32)
    }
}

/// Linearly interpolates `spectrum` onto a grid `factor` times finer.
///
/// Points past the last bin repeat the last magnitude.
fn interpolate(spectrum: &[f32], factor: usize, out: &mut Vec<f64>) {
    let last = spectrum.len() - 1;
    out.clear();
    out.extend((0..spectrum.len() * factor).map(|i| {
        let lo = i / factor;
        if lo >= last {
            return f64::from(spectrum[last]);
        }
        let frac = (i % factor) as f64 / factor as f64;
        f64::from(spectrum[lo]) * (1.0 - frac) + f64::from(spectrum[lo + 1]) * frac
    }));
}

/// Index and value of the first maximum.
fn argmax(values: &[f64]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((i, value)),
        }
    }
    best
}
