// harmony-core/src/lib.rs

//! Real-time note tracking from a microphone.
//!
//! Audio blocks are gathered into a sliding window, cleaned up in the frequency
//! domain, and run through a harmonic product spectrum to find the fundamental.
//! The result is snapped to the nearest equal-tempered note, debounced, and
//! handed to registered listeners whenever the stable note changes.
//!
//! This crate is completely headless and contains no UI code.
//!
//! ```no_run
//! use harmony_core::{NoteEvent, PitchTracker, TrackerConfig};
//! use std::sync::Arc;
//!
//! let tracker = PitchTracker::new(TrackerConfig::default())?;
//! tracker.subscribe(Arc::new(|event: &NoteEvent| println!("{}", event)));
//! tracker.start()?;
//! // ...
//! tracker.stop()?;
//! # Ok::<(), harmony_core::TrackerError>(())
//! ```

pub mod audio;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod listener;
pub mod pitch;
pub mod recorder;
pub mod scenario;
pub mod spectrum;
pub mod stabilizer;
pub mod tuning;
pub mod window;

pub use audio::{
    AudioBackend, CaptureEvent, CaptureStream, CpalBackend, InputSpec, default_input_device_name,
    list_input_devices,
};
pub use config::TrackerConfig;
pub use detector::NoteDetector;
pub use engine::{CancellationToken, EngineState, PitchTracker};
pub use error::{CaptureError, ConfigError, NoteParseError, QuantizeError, TrackerError};
pub use listener::{ChannelListener, ListenerId, NoteEvent, NoteListener, SILENCE_LABEL, TrackerEvent};
pub use recorder::{NoteRecorder, RecordedNote, Score};
pub use scenario::{ScenarioChecker, ScenarioProgress};
pub use tuning::{Note, NoteEstimate, NoteQuantizer, PitchClass, calculate_cents_deviation};
