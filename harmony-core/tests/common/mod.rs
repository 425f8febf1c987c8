//! Synthetic signals and in-memory audio backends shared by the integration tests.

#![allow(dead_code)]

use crossbeam_channel::Sender;
use harmony_core::{AudioBackend, CaptureError, CaptureEvent, CaptureStream, InputSpec, TrackerConfig};
use parking_lot::Mutex;
use std::f64::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One second of audio at 8 kHz, analysed every quarter second.
pub fn fast_config() -> TrackerConfig {
    TrackerConfig {
        sample_rate: 8_000,
        window_size: 8_000,
        window_step: 2_000,
        poll_interval_ms: 5,
        ..Default::default()
    }
}

pub fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
    harmonics(&[(freq, 0.5)], sample_rate, 0, len)
}

/// Sum of `(frequency, amplitude)` partials starting at sample `offset`.
///
/// Phase is computed in f64 so long-running streams stay in tune.
pub fn harmonics(partials: &[(f32, f32)], sample_rate: u32, offset: usize, len: usize) -> Vec<f32> {
    (offset..offset + len)
        .map(|i| {
            let t = i as f64 / f64::from(sample_rate);
            partials
                .iter()
                .map(|&(freq, amplitude)| {
                    let phase = 2.0 * PI * f64::from(freq) * t;
                    f64::from(amplitude) * phase.sin()
                })
                .sum::<f64>() as f32
        })
        .collect()
}

/// Consecutive phase-continuous sine blocks.
pub fn sine_blocks(freq: f32, config: &TrackerConfig, blocks: usize) -> Vec<Vec<f32>> {
    let samples = sine(freq, config.sample_rate, config.window_step * blocks);
    samples
        .chunks(config.window_step)
        .map(<[f32]>::to_vec)
        .collect()
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Counts open streams so tests can check that the device gets closed.
#[derive(Clone, Default)]
pub struct StreamCounter {
    opened: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl StreamCounter {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn track(&self) -> TestStream {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        TestStream {
            closed: Arc::new(AtomicBool::new(false)),
            live: Arc::clone(&self.live),
        }
    }
}

struct TestStream {
    closed: Arc<AtomicBool>,
    live: Arc<AtomicUsize>,
}

impl CaptureStream for TestStream {
    fn device_name(&self) -> &str {
        "test input"
    }
}

impl Drop for TestStream {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Endless phase-continuous tone whose frequency can change while running.
pub struct ToneBackend {
    frequency: Arc<Mutex<f32>>,
    pace: Duration,
    pub streams: StreamCounter,
}

impl ToneBackend {
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency: Arc::new(Mutex::new(frequency)),
            pace: Duration::from_millis(1),
            streams: StreamCounter::default(),
        }
    }

    pub fn set_frequency(&self, frequency: f32) {
        *self.frequency.lock() = frequency;
    }
}

impl AudioBackend for ToneBackend {
    fn open(
        &self,
        spec: &InputSpec,
        events: Sender<CaptureEvent>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let stream = self.streams.track();
        let closed = Arc::clone(&stream.closed);
        let frequency = Arc::clone(&self.frequency);
        let (sample_rate, block_size, pace) = (spec.sample_rate, spec.block_size, self.pace);

        thread::spawn(move || {
            let mut offset = 0;
            while !closed.load(Ordering::SeqCst) {
                let freq = *frequency.lock();
                let block = harmonics(&[(freq, 0.5)], sample_rate, offset, block_size);
                offset += block_size;
                if events.send(CaptureEvent::Block(block)).is_err() {
                    return;
                }
                thread::sleep(pace);
            }
        });
        Ok(Box::new(stream))
    }
}

/// Plays a fixed list of events, then either idles or hangs up.
pub struct ScriptedBackend {
    script: Vec<CaptureEvent>,
    hold_open: bool,
    pub streams: StreamCounter,
}

impl ScriptedBackend {
    /// Keeps the block channel open after the script until the stream closes.
    pub fn holding(script: Vec<CaptureEvent>) -> Self {
        Self {
            script,
            hold_open: true,
            streams: StreamCounter::default(),
        }
    }

    /// Drops the block channel once the script is played.
    pub fn hanging_up(script: Vec<CaptureEvent>) -> Self {
        Self {
            script,
            hold_open: false,
            streams: StreamCounter::default(),
        }
    }
}

impl AudioBackend for ScriptedBackend {
    fn open(
        &self,
        _spec: &InputSpec,
        events: Sender<CaptureEvent>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let stream = self.streams.track();
        let closed = Arc::clone(&stream.closed);
        let script = self.script.clone();
        let hold_open = self.hold_open;

        thread::spawn(move || {
            for event in script {
                if closed.load(Ordering::SeqCst) || events.send(event).is_err() {
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            while hold_open && !closed.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(2));
            }
        });
        Ok(Box::new(stream))
    }
}

/// A device that can never be opened.
pub struct FailingBackend(pub CaptureError);

impl AudioBackend for FailingBackend {
    fn open(
        &self,
        _spec: &InputSpec,
        _events: Sender<CaptureEvent>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        Err(self.0.clone())
    }
}

/// Mimics a driver whose stream joins its device thread on drop.
///
/// The device thread drops blocks when the queue is full, like a real data
/// callback, then reports the device as lost with a blocking send once the
/// queue is full.
pub struct DeviceThreadBackend {
    blocks: Vec<Vec<f32>>,
}

impl DeviceThreadBackend {
    pub fn new(blocks: Vec<Vec<f32>>) -> Self {
        Self { blocks }
    }
}

struct DeviceThreadStream {
    closed: Arc<AtomicBool>,
    device_thread: Option<JoinHandle<()>>,
}

impl CaptureStream for DeviceThreadStream {
    fn device_name(&self) -> &str {
        "device thread input"
    }
}

impl Drop for DeviceThreadStream {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.device_thread.take() {
            let _ = handle.join();
        }
    }
}

impl AudioBackend for DeviceThreadBackend {
    fn open(
        &self,
        _spec: &InputSpec,
        events: Sender<CaptureEvent>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let closed = Arc::new(AtomicBool::new(false));
        let blocks = self.blocks.clone();
        let device_closed = Arc::clone(&closed);

        let device_thread = thread::spawn(move || {
            for block in blocks {
                if device_closed.load(Ordering::SeqCst) {
                    return;
                }
                let _ = events.try_send(CaptureEvent::Block(block));
                thread::sleep(Duration::from_millis(5));
            }

            // The device goes away while the worker is behind.
            while !events.is_full() {
                if device_closed.load(Ordering::SeqCst) {
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = events.send(CaptureEvent::Failed(CaptureError::StreamLost {
                device: "device thread input".to_string(),
                message: "device unplugged".to_string(),
            }));
        });

        Ok(Box::new(DeviceThreadStream {
            closed,
            device_thread: Some(device_thread),
        }))
    }
}
