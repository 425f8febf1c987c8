//! Lesson scenario checking.
//!
//! A [`ScenarioChecker`] listens to stable notes and walks through an expected
//! sequence, one step per matching note.

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info};
use parking_lot::Mutex;

use crate::error::NoteParseError;
use crate::listener::{NoteEvent, NoteListener};
use crate::recorder::parse_play_notes;
use crate::tuning::Note;

/// How far a scenario has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioProgress {
    pub matched: usize,
    pub total: usize,
}

impl ScenarioProgress {
    /// Matched steps as a whole percentage, 100 for an empty scenario.
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        (100 * self.matched / self.total) as u32
    }

    pub fn is_complete(&self) -> bool {
        self.matched >= self.total
    }
}

/// Listener that checks heard notes against an expected sequence.
///
/// Completion is signalled once through [`ScenarioChecker::completion`]; the
/// thread owning the tracker is expected to stop it.
pub struct ScenarioChecker {
    expected: Vec<Note>,
    matched: Mutex<usize>,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
}

impl ScenarioChecker {
    /// An empty sequence is complete from the start and signals at once.
    pub fn new(expected: Vec<Note>) -> Self {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let checker = Self {
            expected,
            matched: Mutex::new(0),
            done_tx,
            done_rx,
        };
        checker.signal_if_empty();
        checker
    }

    /// Builds a checker from a `play_notes` string such as `"C3-E3-Bb3"`.
    ///
    /// # Errors
    /// * `Empty` - The string holds no notes
    /// * any other `NoteParseError` - A note name is invalid
    pub fn from_play_notes(play_notes: &str) -> Result<Self, NoteParseError> {
        let expected = parse_play_notes(play_notes)?;
        if expected.is_empty() {
            return Err(NoteParseError::Empty);
        }
        Ok(Self::new(expected))
    }

    pub fn expected(&self) -> &[Note] {
        &self.expected
    }

    /// The note to play next, `None` once complete.
    pub fn next_expected(&self) -> Option<Note> {
        self.expected.get(*self.matched.lock()).copied()
    }

    pub fn progress(&self) -> ScenarioProgress {
        ScenarioProgress {
            matched: *self.matched.lock(),
            total: self.expected.len(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress().is_complete()
    }

    /// Receives one message when the last expected note is heard.
    pub fn completion(&self) -> Receiver<()> {
        self.done_rx.clone()
    }

    pub fn reset(&self) {
        *self.matched.lock() = 0;
        while self.done_rx.try_recv().is_ok() {}
        self.signal_if_empty();
    }

    fn signal_if_empty(&self) {
        if self.expected.is_empty() {
            let _ = self.done_tx.try_send(());
        }
    }
}

impl NoteListener for ScenarioChecker {
    fn on_note_changed(&self, event: &NoteEvent) {
        let Some(heard) = event.note() else {
            return;
        };
        let mut matched = self.matched.lock();
        let Some(expected) = self.expected.get(*matched) else {
            return;
        };
        debug!("expected {}, heard {}", expected, heard);
        if heard != *expected {
            return;
        }

        *matched += 1;
        let progress = ScenarioProgress {
            matched: *matched,
            total: self.expected.len(),
        };
        debug!("scenario at {}%", progress.percent());
        if progress.is_complete() {
            info!("scenario complete");
            let _ = self.done_tx.try_send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::NoteQuantizer;
    use std::time::Instant;

    fn event(name: &str) -> NoteEvent {
        if name == "-" {
            return NoteEvent::silence(Instant::now());
        }
        let note: Note = name.parse().unwrap();
        NoteEvent::new(
            NoteQuantizer::default().quantize(note.frequency(440.0)).ok(),
            Instant::now(),
        )
    }

    #[test]
    fn test_walks_through_sequence() {
        let checker = ScenarioChecker::from_play_notes("C3-E3-G3").unwrap();
        let done = checker.completion();

        for name in ["C3", "-", "D3", "E3"] {
            checker.on_note_changed(&event(name));
        }
        assert_eq!(checker.progress(), ScenarioProgress { matched: 2, total: 3 });
        assert_eq!(checker.progress().percent(), 66);
        assert_eq!(checker.next_expected().map(|n| n.to_string()), Some("G3".to_string()));
        assert!(done.try_recv().is_err());

        checker.on_note_changed(&event("G3"));
        assert!(checker.is_complete());
        assert!(done.try_recv().is_ok());

        // Further notes change nothing and do not signal again.
        checker.on_note_changed(&event("G3"));
        assert_eq!(checker.progress().matched, 3);
        assert!(done.try_recv().is_err());
    }

    #[test]
    fn test_flats_match_sharps() {
        let checker = ScenarioChecker::from_play_notes("Bb3-Eb4").unwrap();
        checker.on_note_changed(&event("A#3"));
        checker.on_note_changed(&event("D#4"));
        assert!(checker.is_complete());
    }

    #[test]
    fn test_octave_must_match() {
        let checker = ScenarioChecker::from_play_notes("A4").unwrap();
        checker.on_note_changed(&event("A3"));
        checker.on_note_changed(&event("A5"));
        assert_eq!(checker.progress().matched, 0);
    }

    #[test]
    fn test_reset_and_bad_input() {
        let checker = ScenarioChecker::from_play_notes("A4").unwrap();
        checker.on_note_changed(&event("A4"));
        checker.reset();
        assert_eq!(checker.progress().matched, 0);
        assert!(checker.completion().try_recv().is_err());

        assert!(ScenarioChecker::from_play_notes("A4-X9").is_err());
    }

    #[test]
    fn test_empty_sequence() {
        assert!(matches!(
            ScenarioChecker::from_play_notes(""),
            Err(NoteParseError::Empty)
        ));
        assert!(matches!(
            ScenarioChecker::from_play_notes("   "),
            Err(NoteParseError::Empty)
        ));

        let checker = ScenarioChecker::new(Vec::new());
        assert_eq!(checker.progress().percent(), 100);
        assert!(checker.is_complete());
        assert!(checker.completion().try_recv().is_ok());
        checker.reset();
        assert!(checker.completion().try_recv().is_ok());
    }

    #[test]
    fn test_negative_octave_lesson() {
        let checker = ScenarioChecker::from_play_notes("A-1-C0").unwrap();
        assert_eq!(checker.expected().len(), 2);
        checker.on_note_changed(&event("A-1"));
        checker.on_note_changed(&event("C0"));
        assert!(checker.is_complete());
    }
}
