//! # Musical Tuning Module
//!
//! This module provides the pure frequency/note arithmetic for the tuner.
//! It maps detected frequencies onto the 12-tone equal-tempered scale,
//! computes each note's standard-tuned frequency, and measures how far a
//! detected frequency sits from that target in cents.
//!
//! ## Features
//! - Frequency to note-index mapping around a configurable reference pitch
//! - Equal temperament standard-frequency calculations
//! - Cent deviation measurements for tuning accuracy
//! - Note naming and octave math that stay correct for negative indices
//!
//! All operations are deterministic, side-effect-free `f64` arithmetic;
//! nothing here is cached or shared.

use crate::{NoteError, NoteEvent};

/// Names of the twelve semitones within an octave, starting at C.
///
/// The labels use Unicode sharps, exactly as they are shown to the user.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C♯", "D", "D♯", "E", "F", "F♯", "G", "G♯", "A", "A♯", "B",
];

/// Note index assigned to the reference pitch (concert A, i.e. A4).
pub const REFERENCE_NOTE: i32 = 69;

/// Semitones per octave in the equal-tempered scale.
pub const SEMITONES_PER_OCTAVE: i32 = 12;

/// Pure frequency/note converter around a fixed reference pitch.
///
/// The reference pitch is the frequency assigned to note index 69 and is
/// immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteMapper {
    reference_pitch: f64,
}

impl Default for NoteMapper {
    fn default() -> Self {
        Self {
            reference_pitch: 440.0,
        }
    }
}

impl NoteMapper {
    /// Creates a mapper with the given reference pitch (A4) in Hz.
    ///
    /// # Errors
    /// * `InvalidConfiguration` - if the reference pitch is not positive
    ///   and finite. The log/ratio math is undefined there, so this fails
    ///   fast instead of producing garbage notes later.
    pub fn new(reference_pitch: f64) -> Result<Self, NoteError> {
        if !reference_pitch.is_finite() || reference_pitch <= 0.0 {
            return Err(NoteError::InvalidConfiguration(reference_pitch));
        }
        Ok(Self { reference_pitch })
    }

    /// The frequency assigned to note index 69, in Hz.
    pub fn reference_pitch(&self) -> f64 {
        self.reference_pitch
    }

    /// Maps a frequency to the nearest note index.
    ///
    /// Computes `round(12 * log2(frequency / reference)) + 69`. The result
    /// is unbounded: sub-audible input yields negative indices. Exact
    /// quarter-tone ties round away from zero (`f64::round`).
    ///
    /// # Arguments
    /// * `frequency` - Detected frequency in Hz, must be positive
    ///
    /// # Errors
    /// * `InvalidSample` - if the frequency is zero, negative or non-finite
    pub fn map_frequency(&self, frequency: f64) -> Result<i32, NoteError> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(NoteError::InvalidSample(frequency));
        }
        let semitones =
            SEMITONES_PER_OCTAVE as f64 * (frequency / self.reference_pitch).log2();
        Ok(semitones.round() as i32 + REFERENCE_NOTE)
    }

    /// Returns the standard-tuned frequency of a note index, in Hz.
    ///
    /// `reference * 2^((note - 69) / 12)` - the exact inverse of the
    /// pre-rounding form of [`Self::map_frequency`].
    pub fn standard_frequency(&self, note: i32) -> f64 {
        self.reference_pitch
            * 2.0_f64.powf((note - REFERENCE_NOTE) as f64 / SEMITONES_PER_OCTAVE as f64)
    }

    /// Measures how far a frequency sits from a note's standard frequency,
    /// in cents (100 cents = one semitone, positive = sharp).
    ///
    /// The deviation is floored, not rounded: a detected frequency a hair
    /// below the target reads -1, never rounds up to 0. Only the exact
    /// standard frequency itself reads 0. Callers display the value as-is.
    ///
    /// # Errors
    /// * `InvalidSample` - if the frequency is zero, negative or non-finite
    pub fn cents_deviation(&self, frequency: f64, note: i32) -> Result<i32, NoteError> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(NoteError::InvalidSample(frequency));
        }
        let cents = 1200.0 * (frequency / self.standard_frequency(note)).log2();
        Ok(cents.floor() as i32)
    }

    /// Resolves a frequency into a complete [`NoteEvent`].
    ///
    /// # Errors
    /// * `InvalidSample` - if the frequency is zero, negative or non-finite
    pub fn resolve(&self, frequency: f64) -> Result<NoteEvent, NoteError> {
        let note = self.map_frequency(frequency)?;
        Ok(NoteEvent {
            name: note_name(note),
            value: note,
            cents: self.cents_deviation(frequency, note)?,
            octave: octave(note),
            frequency,
        })
    }
}

/// Returns the semitone label of a note index.
///
/// Uses floor modulo (`rem_euclid`), so negative indices still land on the
/// right label (note -3 is an A, two octaves below A0).
pub fn note_name(note: i32) -> &'static str {
    NOTE_NAMES[note.rem_euclid(SEMITONES_PER_OCTAVE) as usize]
}

/// Returns the octave of a note index (A4 = 69 is octave 4).
///
/// Uses floor division (`div_euclid`), so negative indices get correct
/// octaves instead of the truncation-toward-zero off-by-one.
pub fn octave(note: i32) -> i32 {
    note.div_euclid(SEMITONES_PER_OCTAVE) - 1
}
