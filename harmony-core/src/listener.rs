//! # Listener Module
//!
//! Stabilized note transitions are fanned out to registered [`NoteListener`]s.
//!
//! Listeners are called synchronously on the capture thread, in registration
//! order. Code that touches UI state should hand the event over to its own
//! thread, for example through a [`ChannelListener`].

use crossbeam_channel::{Receiver, Sender};
use log::{error, trace};
use parking_lot::RwLock;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::CaptureError;
use crate::tuning::{Note, NoteEstimate};

/// Label carried by silence events.
pub const SILENCE_LABEL: &str = "-";

/// A transition of the stable note state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    /// The new stable note, or `None` for silence.
    pub estimate: Option<NoteEstimate>,
    /// When the transition was detected.
    pub at: Instant,
}

impl NoteEvent {
    pub fn new(estimate: Option<NoteEstimate>, at: Instant) -> Self {
        Self { estimate, at }
    }

    pub fn silence(at: Instant) -> Self {
        Self { estimate: None, at }
    }

    pub fn is_silence(&self) -> bool {
        self.estimate.is_none()
    }

    pub fn note(&self) -> Option<Note> {
        self.estimate.map(|estimate| estimate.note)
    }

    /// `"-"` for silence, otherwise the note name such as `"A#4"`.
    pub fn label(&self) -> String {
        match self.note() {
            Some(note) => note.to_string(),
            None => SILENCE_LABEL.to_string(),
        }
    }

    /// Frequency that was heard, 0.0 for silence.
    pub fn heard_frequency_hz(&self) -> f32 {
        self.estimate.map_or(0.0, |estimate| estimate.frequency_hz)
    }

    /// Reference pitch of the closest note, 0.0 for silence.
    pub fn closest_pitch_hz(&self) -> f32 {
        self.estimate.map_or(0.0, |estimate| estimate.reference_pitch_hz)
    }

    /// Deviation from the closest note in cents.
    pub fn cents(&self) -> Option<f32> {
        self.estimate.map(|estimate| estimate.cents())
    }

    /// How close the heard frequency is to the reference pitch, in percent.
    pub fn accuracy_percent(&self) -> Option<f32> {
        self.estimate.map(|estimate| {
            let reference = estimate.reference_pitch_hz;
            100.0 - 100.0 * ((reference - estimate.frequency_hz) / reference).abs()
        })
    }
}

impl fmt::Display for NoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.note() {
            Some(note) => write!(f, "{}", note),
            None => f.write_str(SILENCE_LABEL),
        }
    }
}

/// Observer of stabilized note transitions.
pub trait NoteListener: Send + Sync {
    /// Called on the capture thread for every stable transition, silence included.
    fn on_note_changed(&self, event: &NoteEvent);

    /// Called on the capture thread when the session ends because of a device failure.
    fn on_capture_error(&self, _error: &CaptureError) {}
}

impl<F> NoteListener for F
where
    F: Fn(&NoteEvent) + Send + Sync,
{
    fn on_note_changed(&self, event: &NoteEvent) {
        self(event)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Registered listeners in insertion order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    entries: RwLock<Vec<(ListenerId, Arc<dyn NoteListener>)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    /// Registers `listener`; registering the same `Arc` twice returns the existing id.
    pub(crate) fn subscribe(&self, listener: Arc<dyn NoteListener>) -> ListenerId {
        let mut entries = self.entries.write();
        if let Some((id, _)) = entries
            .iter()
            .find(|(_, existing)| std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(&listener)))
        {
            return *id;
        }
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entries.push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    // Listeners run outside the lock so they may (un)subscribe from the callback.
    fn snapshot(&self) -> Vec<Arc<dyn NoteListener>> {
        self.entries
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    pub(crate) fn notify(&self, event: &NoteEvent) {
        for listener in self.snapshot() {
            if catch_unwind(AssertUnwindSafe(|| listener.on_note_changed(event))).is_err() {
                error!("note listener panicked while handling {}", event);
            }
        }
    }

    pub(crate) fn notify_error(&self, capture_error: &CaptureError) {
        for listener in self.snapshot() {
            if catch_unwind(AssertUnwindSafe(|| listener.on_capture_error(capture_error))).is_err()
            {
                error!("note listener panicked while handling capture error");
            }
        }
    }
}

/// Message forwarded by a [`ChannelListener`].
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Note(NoteEvent),
    CaptureFailed(CaptureError),
}

/// Forwards tracker events to a channel so they can be consumed on another thread.
pub struct ChannelListener {
    sender: Sender<TrackerEvent>,
}

impl ChannelListener {
    /// Creates the listener and the receiving end of its channel.
    pub fn channel() -> (Arc<Self>, Receiver<TrackerEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Arc::new(Self { sender }), receiver)
    }

    fn forward(&self, event: TrackerEvent) {
        if self.sender.send(event).is_err() {
            trace!("tracker event receiver dropped");
        }
    }
}

impl NoteListener for ChannelListener {
    fn on_note_changed(&self, event: &NoteEvent) {
        self.forward(TrackerEvent::Note(*event));
    }

    fn on_capture_error(&self, error: &CaptureError) {
        self.forward(TrackerEvent::CaptureFailed(error.clone()));
    }
}
