//! # Musical Tuning Module
//!
//! Equal-tempered note arithmetic relative to a configurable concert pitch.
//!
//! ## Features
//! - Frequency to nearest note quantization (`NoteQuantizer`)
//! - Note name parsing with sharp and flat spellings
//! - Reference pitch and cent deviation calculations
//!
//! All offsets are counted in semitones from A4, which is why the chromatic
//! scale below starts at A: `CHROMATIC_SCALE[offset mod 12]` is the pitch class
//! and octaves roll over at C, nine semitones above A.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{NoteParseError, QuantizeError};

/// Default reference frequency for A4.
pub const DEFAULT_CONCERT_PITCH_HZ: f32 = 440.0;

/// One of the twelve equal-tempered pitch classes, sharp-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PitchClass {
    A,
    ASharp,
    B,
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
}

/// The chromatic scale ordered from A, indexed by semitone offset from A.
pub const CHROMATIC_SCALE: [PitchClass; 12] = [
    PitchClass::A,
    PitchClass::ASharp,
    PitchClass::B,
    PitchClass::C,
    PitchClass::CSharp,
    PitchClass::D,
    PitchClass::DSharp,
    PitchClass::E,
    PitchClass::F,
    PitchClass::FSharp,
    PitchClass::G,
    PitchClass::GSharp,
];

/// Static map for pitch class name lookups, including flat spellings.
static PITCH_CLASS_NAMES: Lazy<BTreeMap<&'static str, PitchClass>> = Lazy::new(|| {
    let mut names: BTreeMap<&'static str, PitchClass> = CHROMATIC_SCALE
        .iter()
        .map(|&pitch_class| (pitch_class.name(), pitch_class))
        .collect();
    for (flat, pitch_class) in [
        ("Bb", PitchClass::ASharp),
        ("Db", PitchClass::CSharp),
        ("Eb", PitchClass::DSharp),
        ("Gb", PitchClass::FSharp),
        ("Ab", PitchClass::GSharp),
        ("Cb", PitchClass::B),
        ("Fb", PitchClass::E),
        ("E#", PitchClass::F),
        ("B#", PitchClass::C),
    ] {
        names.insert(flat, pitch_class);
    }
    names
});

impl PitchClass {
    /// Sharp-based name, e.g. `"C#"`.
    pub fn name(self) -> &'static str {
        match self {
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
        }
    }

    /// Pitch class lying `semitones` above (or below) A.
    pub fn from_offset(semitones: i32) -> Self {
        CHROMATIC_SCALE[semitones.rem_euclid(12) as usize]
    }

    /// Position of this pitch class in [`CHROMATIC_SCALE`].
    pub fn offset_from_a(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = NoteParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PITCH_CLASS_NAMES
            .get(s)
            .copied()
            .ok_or_else(|| NoteParseError::UnknownPitchClass(s.to_string()))
    }
}

/// A pitch class in a specific octave (scientific pitch notation, C starts an octave).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Note {
    pub pitch_class: PitchClass,
    pub octave: i32,
}

impl Note {
    pub fn new(pitch_class: PitchClass, octave: i32) -> Self {
        Self {
            pitch_class,
            octave,
        }
    }

    /// Builds the note lying `semitones` away from A4.
    pub fn from_semitones_from_a4(semitones: i32) -> Self {
        Self {
            pitch_class: PitchClass::from_offset(semitones),
            octave: 4 + (semitones + 9).div_euclid(12),
        }
    }

    /// Signed distance from A4 in semitones.
    pub fn semitones_from_a4(&self) -> i32 {
        // A is 9 semitones above the C that starts its octave.
        let from_c = (self.pitch_class.offset_from_a() + 9) % 12;
        (self.octave - 4) * 12 + from_c - 9
    }

    /// Equal-tempered frequency of this note for the given concert pitch.
    pub fn frequency(&self, concert_pitch_hz: f32) -> f32 {
        reference_frequency(self.semitones_from_a4(), concert_pitch_hz)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class, self.octave)
    }
}

impl FromStr for Note {
    type Err = NoteParseError;

    /// Parses names such as `"A4"`, `"C#3"`, `"Db5"` or `"A-1"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(NoteParseError::Empty);
        }
        let split = s
            .find(|c: char| c.is_ascii_digit() || c == '-')
            .ok_or_else(|| NoteParseError::InvalidOctave(s.to_string()))?;
        let (name, octave) = s.split_at(split);
        let pitch_class = name.parse::<PitchClass>()?;
        let octave = octave
            .parse::<i32>()
            .map_err(|_| NoteParseError::InvalidOctave(s.to_string()))?;
        Ok(Self::new(pitch_class, octave))
    }
}

/// A detected frequency together with the note it was quantized to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEstimate {
    pub note: Note,
    /// Frequency that was actually heard, in Hz.
    pub frequency_hz: f32,
    /// Exact equal-tempered frequency of `note`, in Hz.
    pub reference_pitch_hz: f32,
}

impl NoteEstimate {
    /// Deviation of the heard frequency from the reference pitch.
    pub fn cents(&self) -> f32 {
        calculate_cents_deviation(self.frequency_hz, self.reference_pitch_hz)
    }
}

/// Maps frequencies to the nearest equal-tempered note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteQuantizer {
    concert_pitch_hz: f32,
}

impl Default for NoteQuantizer {
    fn default() -> Self {
        Self::new(DEFAULT_CONCERT_PITCH_HZ)
    }
}

impl NoteQuantizer {
    pub fn new(concert_pitch_hz: f32) -> Self {
        Self { concert_pitch_hz }
    }

    pub fn concert_pitch_hz(&self) -> f32 {
        self.concert_pitch_hz
    }

    /// Finds the closest musical note to a given frequency.
    ///
    /// # Arguments
    /// * `frequency_hz` - Input frequency in Hz
    ///
    /// # Returns
    /// * `Ok(estimate)` - Nearest note, the heard frequency and the note's reference pitch
    /// * `Err(QuantizeError::InvalidFrequency)` - Frequency is not a positive finite number
    pub fn quantize(&self, frequency_hz: f32) -> Result<NoteEstimate, QuantizeError> {
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return Err(QuantizeError::InvalidFrequency(frequency_hz));
        }
        let semitones =
            (12.0 * (f64::from(frequency_hz) / f64::from(self.concert_pitch_hz)).log2()).round();
        if !semitones.is_finite() {
            return Err(QuantizeError::InvalidFrequency(frequency_hz));
        }
        let semitones = semitones as i32;

        Ok(NoteEstimate {
            note: Note::from_semitones_from_a4(semitones),
            frequency_hz,
            reference_pitch_hz: reference_frequency(semitones, self.concert_pitch_hz),
        })
    }
}

/// Frequency of the note `semitones` away from A4: `f = a4 * 2^(n/12)`.
pub fn reference_frequency(semitones: i32, concert_pitch_hz: f32) -> f32 {
    (f64::from(concert_pitch_hz) * 2f64.powf(f64::from(semitones) / 12.0)) as f32
}

/// Calculates the deviation from a target frequency in cents.
///
/// Cents are a logarithmic unit of pitch measurement where:
/// - 100 cents = 1 semitone
/// - 1200 cents = 1 octave
/// - Positive values indicate sharpness, negative values indicate flatness
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}
