//! # Note Stabilizer Module
//!
//! Debounces the raw per-block note estimates. A note (or silence) becomes the
//! stable state only after the last `K` estimates agree, and listeners hear
//! about it only when the stable state actually changes.

use std::time::Instant;

use crate::listener::NoteEvent;
use crate::tuning::{Note, NoteEstimate};

/// Default number of consecutive agreeing estimates.
pub const DEFAULT_STABILIZATION_WINDOW: usize = 2;

/// Fixed-capacity ring of the most recent raw readings (`None` is silence).
#[derive(Debug, Clone)]
pub struct NoteBuffer {
    slots: Vec<Option<Note>>,
    head: usize,
    filled: usize,
}

impl NoteBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            head: 0,
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Overwrites the oldest reading.
    pub fn push(&mut self, reading: Option<Note>) {
        let capacity = self.slots.len();
        self.slots[self.head] = reading;
        self.head = (self.head + 1) % capacity;
        self.filled = (self.filled + 1).min(capacity);
    }

    /// The most recently pushed reading, if any.
    pub fn newest(&self) -> Option<Option<Note>> {
        if self.filled == 0 {
            return None;
        }
        let capacity = self.slots.len();
        Some(self.slots[(self.head + capacity - 1) % capacity])
    }

    /// True once the buffer is full and every reading is the same.
    pub fn is_unanimous(&self) -> bool {
        self.filled == self.slots.len() && self.slots.iter().all(|slot| *slot == self.slots[0])
    }

    pub fn clear(&mut self) {
        self.slots.fill(None);
        self.head = 0;
        self.filled = 0;
    }
}

/// The note (or silence) most recently reported to listeners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentNoteState {
    pub note: Option<Note>,
    pub since: Instant,
}

/// Turns a stream of raw estimates into stable note transitions.
#[derive(Debug, Clone)]
pub struct NoteStabilizer {
    buffer: NoteBuffer,
    current: Option<CurrentNoteState>,
}

impl NoteStabilizer {
    pub fn new(window: usize) -> Self {
        Self {
            buffer: NoteBuffer::new(window),
            current: None,
        }
    }

    /// Feeds one block's estimate (`None` for silence).
    ///
    /// Returns an event when the buffer is unanimous and its reading differs
    /// from the current stable state. The first unanimous reading after a reset
    /// is always reported, silence included.
    pub fn push(&mut self, estimate: Option<NoteEstimate>) -> Option<NoteEvent> {
        let reading = estimate.map(|estimate| estimate.note);
        self.buffer.push(reading);

        if !self.buffer.is_unanimous() {
            return None;
        }
        if matches!(self.current, Some(current) if current.note == reading) {
            return None;
        }

        let now = Instant::now();
        self.current = Some(CurrentNoteState {
            note: reading,
            since: now,
        });
        Some(NoteEvent::new(estimate, now))
    }

    pub fn current(&self) -> Option<&CurrentNoteState> {
        self.current.as_ref()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.current = None;
    }
}
