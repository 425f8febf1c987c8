//! # Pitch Tracker Engine
//!
//! Owns the capture lifecycle and runs the note detection pipeline on a
//! dedicated capture thread.
//!
//! ## Architecture
//! - **Caller thread**: `start()` / `stop()` / `subscribe()`
//! - **Capture thread**: opens the input stream, receives blocks over a bounded
//!   crossbeam channel, runs [`NoteDetector`] and notifies listeners
//! - **Shutdown**: a [`CancellationToken`] checked at least every `poll_interval_ms`
//!   and once more right before listeners run; `stop()` joins the thread, which
//!   closes the stream before exiting
//!
//! Once `stop()` returns, no listener is called again for that session.

use crossbeam_channel::{RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use crate::audio::{AudioBackend, CaptureEvent, CpalBackend, InputSpec};
use crate::config::TrackerConfig;
use crate::detector::NoteDetector;
use crate::error::{CaptureError, TrackerError};
use crate::listener::{ListenerId, ListenerRegistry, NoteListener};

/// Lifecycle of a [`PitchTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    /// The capture thread is opening the device.
    Starting,
    Running,
    /// A stop was requested and the capture thread is being joined.
    Stopping,
}

/// Shared stop flag handed to the capture loop.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// State visible to both the caller and the capture thread.
struct Shared {
    state: Mutex<EngineState>,
    capture_thread: Mutex<Option<ThreadId>>,
}

/// Capture thread management structure.
struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Real-time note tracker.
///
/// Each tracker owns an independent capture stream; two trackers never share
/// mutable state.
pub struct PitchTracker {
    config: TrackerConfig,
    backend: Arc<dyn AudioBackend>,
    listeners: Arc<ListenerRegistry>,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl PitchTracker {
    /// Creates a tracker that listens to a microphone through CPAL.
    pub fn new(config: TrackerConfig) -> Result<Self, TrackerError> {
        Self::with_backend(config, Arc::new(CpalBackend))
    }

    /// Creates a tracker fed by an arbitrary audio backend.
    pub fn with_backend(
        config: TrackerConfig,
        backend: Arc<dyn AudioBackend>,
    ) -> Result<Self, TrackerError> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            listeners: Arc::new(ListenerRegistry::default()),
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState::Stopped),
                capture_thread: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        *self.shared.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Registers a listener; the same `Arc` registered twice keeps one entry.
    pub fn subscribe(&self, listener: Arc<dyn NoteListener>) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Opens the input and starts the capture thread.
    ///
    /// Blocks until the device is open, so device failures surface here as
    /// [`TrackerError::Capture`]. Window and stabilizer state start fresh on
    /// every call.
    ///
    /// # Errors
    /// * `AlreadyRunning` - A session is active
    /// * `ReentrantCall` - Called from a listener on the capture thread
    /// * `Capture` - The device could not be opened or started
    pub fn start(&self) -> Result<(), TrackerError> {
        self.guard_reentry("start")?;
        let mut worker = self.worker.lock();

        if let Some(existing) = worker.take() {
            if self.state() != EngineState::Stopped {
                *worker = Some(existing);
                return Err(TrackerError::AlreadyRunning);
            }
            // The previous session ended on its own after a device failure.
            join_capture_thread(existing.handle);
        }

        self.set_state(EngineState::Starting);
        let token = CancellationToken::new();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let session = CaptureSession {
            config: self.config.clone(),
            backend: Arc::clone(&self.backend),
            listeners: Arc::clone(&self.listeners),
            shared: Arc::clone(&self.shared),
            token: token.clone(),
        };

        let handle = match thread::Builder::new()
            .name("harmony-capture".to_string())
            .spawn(move || session.run(ready_tx))
        {
            Ok(handle) => handle,
            Err(e) => {
                self.set_state(EngineState::Stopped);
                return Err(CaptureError::Spawn {
                    message: e.to_string(),
                }
                .into());
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *worker = Some(Worker { token, handle });
                info!("pitch tracker started");
                Ok(())
            }
            Ok(Err(e)) => {
                join_capture_thread(handle);
                self.set_state(EngineState::Stopped);
                Err(e.into())
            }
            Err(_) => {
                join_capture_thread(handle);
                self.set_state(EngineState::Stopped);
                Err(CaptureError::WorkerExited.into())
            }
        }
    }

    /// Stops capturing and waits for the capture thread to exit.
    ///
    /// A no-op when not running. At most one in-flight listener call may finish
    /// while this waits; none happen after it returns.
    pub fn stop(&self) -> Result<(), TrackerError> {
        self.guard_reentry("stop")?;
        let mut worker = self.worker.lock();
        let Some(active) = worker.take() else {
            debug!("stop() called while not running");
            return Ok(());
        };

        self.set_state(EngineState::Stopping);
        active.token.cancel();
        join_capture_thread(active.handle);
        self.set_state(EngineState::Stopped);
        info!("pitch tracker stopped");
        Ok(())
    }

    fn set_state(&self, state: EngineState) {
        *self.shared.state.lock() = state;
    }

    fn guard_reentry(&self, operation: &'static str) -> Result<(), TrackerError> {
        if *self.shared.capture_thread.lock() == Some(thread::current().id()) {
            return Err(TrackerError::ReentrantCall { operation });
        }
        Ok(())
    }
}

impl Drop for PitchTracker {
    fn drop(&mut self) {
        match self.stop() {
            Ok(()) => {}
            Err(TrackerError::ReentrantCall { .. }) => {
                // Dropped by a listener: the capture thread cannot join itself.
                if let Some(active) = self.worker.get_mut().take() {
                    active.token.cancel();
                }
            }
            Err(e) => warn!("failed to stop pitch tracker on drop: {}", e),
        }
    }
}

fn join_capture_thread(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("capture thread panicked");
    }
}

/// Everything the capture thread owns for one session.
struct CaptureSession {
    config: TrackerConfig,
    backend: Arc<dyn AudioBackend>,
    listeners: Arc<ListenerRegistry>,
    shared: Arc<Shared>,
    token: CancellationToken,
}

impl CaptureSession {
    fn run(self, ready: Sender<Result<(), CaptureError>>) {
        *self.shared.capture_thread.lock() = Some(thread::current().id());

        let mut detector = NoteDetector::new(&self.config);
        let spec = InputSpec::from_config(&self.config);
        let (events_tx, events_rx) = crossbeam_channel::bounded(self.config.queue_depth);

        let stream = match self.backend.open(&spec, events_tx) {
            Ok(stream) => stream,
            Err(e) => {
                error!("failed to start audio capture: {}", e);
                let _ = ready.send(Err(e));
                self.finish();
                return;
            }
        };
        let device = stream.device_name().to_string();

        *self.shared.state.lock() = EngineState::Running;
        let _ = ready.send(Ok(()));
        info!(
            "listening on '{}' ({} Hz, {} samples per block)",
            device, spec.sample_rate, spec.block_size
        );

        let poll_interval = self.config.poll_interval();
        let mut failure = None;
        while !self.token.is_cancelled() {
            match events_rx.recv_timeout(poll_interval) {
                Ok(CaptureEvent::Block(block)) => {
                    let Some(event) = detector.process_block(&block) else {
                        continue;
                    };
                    if self.token.is_cancelled() {
                        break;
                    }
                    debug!(
                        "stable note {} (heard {:.1} Hz, reference {:.1} Hz)",
                        event,
                        event.heard_frequency_hz(),
                        event.closest_pitch_hz()
                    );
                    self.listeners.notify(&event);
                }
                Ok(CaptureEvent::Glitch(message)) => {
                    warn!("input stream glitch on '{}', skipping: {}", device, message);
                }
                Ok(CaptureEvent::Failed(e)) => {
                    failure = Some(e);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    failure = Some(CaptureError::StreamLost {
                        device: device.clone(),
                        message: "audio source stopped delivering blocks".to_string(),
                    });
                    break;
                }
            }
        }

        // A device callback blocked on a full queue must be released before the
        // stream joins its thread.
        drop(events_rx);
        drop(stream);

        if let Some(e) = failure {
            error!("capture session ended: {}", e);
            *self.shared.state.lock() = EngineState::Stopped;
            if !self.token.is_cancelled() {
                self.listeners.notify_error(&e);
            }
        }
        self.finish();
    }

    fn finish(&self) {
        *self.shared.capture_thread.lock() = None;
    }
}
