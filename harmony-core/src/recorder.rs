//! Records stabilized notes and turns them into a playable score.

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::NoteParseError;
use crate::listener::{NoteEvent, NoteListener};
use crate::tuning::Note;

/// Separator between notes in a score's `play_notes`.
pub const NOTE_SEPARATOR: char = '-';

/// One recorded transition.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedNote {
    /// `None` for silence.
    pub note: Option<Note>,
    pub label: String,
    /// Time since the recording started.
    pub offset: Duration,
    pub frequency_hz: f32,
}

/// A lesson in the JSON shape used by the learning modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub name: String,
    pub description: String,
    /// Notes joined with `-`, e.g. `"C3-E3-G3"`.
    pub play_notes: String,
    #[serde(rename = "next possible", default)]
    pub next_possible: String,
}

impl Score {
    /// Parses `play_notes` into notes. An empty string yields no notes.
    pub fn notes(&self) -> Result<Vec<Note>, NoteParseError> {
        parse_play_notes(&self.play_notes)
    }
}

/// Splits `play_notes` into notes.
///
/// Only a separator that follows an octave digit ends a note, so negative
/// octaves such as `"A-1"` survive.
pub(crate) fn parse_play_notes(play_notes: &str) -> Result<Vec<Note>, NoteParseError> {
    if play_notes.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut notes = Vec::new();
    let mut start = 0;
    let mut previous = None;
    for (i, c) in play_notes.char_indices() {
        if c == NOTE_SEPARATOR && previous.is_some_and(|p: char| p.is_ascii_digit()) {
            notes.push(play_notes[start..i].parse()?);
            start = i + c.len_utf8();
        }
        if !c.is_whitespace() {
            previous = Some(c);
        }
    }
    notes.push(play_notes[start..].parse()?);
    Ok(notes)
}

struct Recording {
    started: Instant,
    entries: Vec<RecordedNote>,
}

/// Listener that keeps every stabilized transition of a session.
pub struct NoteRecorder {
    recording: Mutex<Recording>,
}

impl Default for NoteRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteRecorder {
    pub fn new() -> Self {
        Self {
            recording: Mutex::new(Recording {
                started: Instant::now(),
                entries: Vec::new(),
            }),
        }
    }

    /// Drops everything recorded so far and restarts the clock.
    pub fn restart(&self) {
        let mut recording = self.recording.lock();
        recording.started = Instant::now();
        recording.entries.clear();
    }

    pub fn entries(&self) -> Vec<RecordedNote> {
        self.recording.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.recording.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds a score from the recorded notes, silences left out and
    /// consecutive repeats collapsed.
    pub fn score(&self, name: impl Into<String>) -> Score {
        let recording = self.recording.lock();
        let mut notes: Vec<String> = Vec::new();
        for note in recording.entries.iter().filter_map(|entry| entry.note) {
            let label = note.to_string();
            if notes.last() != Some(&label) {
                notes.push(label);
            }
        }
        Score {
            name: name.into(),
            description: "recorded notes".to_string(),
            play_notes: notes.join("-"),
            next_possible: String::new(),
        }
    }
}

impl NoteListener for NoteRecorder {
    fn on_note_changed(&self, event: &NoteEvent) {
        let mut recording = self.recording.lock();
        let label = event.label();
        if recording.entries.last().is_some_and(|last| last.label == label) {
            return;
        }
        let offset = event.at.saturating_duration_since(recording.started);
        debug!("recorded {} at {:.2}s", label, offset.as_secs_f32());
        recording.entries.push(RecordedNote {
            note: event.note(),
            label,
            offset,
            frequency_hz: event.heard_frequency_hz(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::NoteQuantizer;

    fn event(name: &str) -> NoteEvent {
        if name == "-" {
            return NoteEvent::silence(Instant::now());
        }
        let note: Note = name.parse().unwrap();
        let estimate = NoteQuantizer::default().quantize(note.frequency(440.0)).ok();
        NoteEvent::new(estimate, Instant::now())
    }

    #[test]
    fn test_records_transitions_in_order() {
        let recorder = NoteRecorder::new();
        for name in ["-", "C4", "C4", "E4", "-", "G4"] {
            recorder.on_note_changed(&event(name));
        }
        let labels: Vec<String> = recorder.entries().into_iter().map(|e| e.label).collect();
        assert_eq!(labels, vec!["-", "C4", "E4", "-", "G4"]);

        let entries = recorder.entries();
        assert!(entries.windows(2).all(|pair| pair[0].offset <= pair[1].offset));
        assert_eq!(entries[0].frequency_hz, 0.0);
        assert!((entries[1].frequency_hz - 261.63).abs() < 0.01);
    }

    #[test]
    fn test_score_collapses_repeats_and_skips_silence() {
        let recorder = NoteRecorder::new();
        for name in ["C3", "-", "C3", "E3", "-", "G3", "G3"] {
            recorder.on_note_changed(&event(name));
        }
        let score = recorder.score("take one");
        assert_eq!(score.name, "take one");
        assert_eq!(score.description, "recorded notes");
        assert_eq!(score.play_notes, "C3-E3-G3");
        assert_eq!(score.notes().unwrap().len(), 3);
    }

    #[test]
    fn test_score_json_shape() {
        let score = Score {
            name: "C chord".to_string(),
            description: String::new(),
            play_notes: "C3-E3-G3".to_string(),
            next_possible: String::new(),
        };
        let json: serde_json::Value = serde_json::to_value(&score).unwrap();
        assert_eq!(json["play_notes"], "C3-E3-G3");
        assert_eq!(json["next possible"], "");

        let parsed: Score =
            serde_json::from_str(r#"{"name": "x", "description": "", "play_notes": "Bb2-D3"}"#).unwrap();
        assert_eq!(parsed.next_possible, "");
        assert_eq!(parsed.notes().unwrap()[0].to_string(), "A#2");
    }

    #[test]
    fn test_restart_clears() {
        let recorder = NoteRecorder::new();
        recorder.on_note_changed(&event("A4"));
        recorder.restart();
        assert!(recorder.is_empty());
        assert_eq!(recorder.score("empty").play_notes, "");
    }

    #[test]
    fn test_parse_play_notes_errors() {
        assert!(parse_play_notes("").unwrap().is_empty());
        assert!(parse_play_notes("C3-H3").is_err());
        assert!(parse_play_notes("C3-").is_err());
        assert_eq!(parse_play_notes("C3 - E3").unwrap().len(), 2);
    }

    #[test]
    fn test_negative_octaves_survive_a_score() {
        let recorder = NoteRecorder::new();
        for name in ["A-1", "C0", "B-1"] {
            recorder.on_note_changed(&event(name));
        }
        let score = recorder.score("low");
        assert_eq!(score.play_notes, "A-1-C0-B-1");

        let labels: Vec<String> = score.notes().unwrap().iter().map(Note::to_string).collect();
        assert_eq!(labels, vec!["A-1", "C0", "B-1"]);
    }
}
