//! Sliding sample window fed by capture blocks.

/// The most recent `len` samples of the input, oldest first.
///
/// Starts zero-filled so the length is always exactly `len`.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    samples: Vec<f32>,
}

impl SlidingWindow {
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
        }
    }

    /// Discards the oldest `block.len()` samples and appends `block`.
    pub fn push(&mut self, block: &[f32]) {
        let len = self.samples.len();
        if block.len() >= len {
            self.samples.copy_from_slice(&block[block.len() - len..]);
            return;
        }
        self.samples.copy_within(block.len().., 0);
        self.samples[len - block.len()..].copy_from_slice(block);
    }

    /// Zero-fills the window.
    pub fn reset(&mut self) {
        self.samples.fill(0.0);
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
