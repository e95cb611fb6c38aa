// notetune-core/src/lib.rs

//! The core logic for the note tuner.
//! This crate is responsible for audio capture, pitch estimation,
//! note resolution and note-stream stabilization. It is completely
//! headless and contains no terminal or GUI code.

pub mod audio;
pub mod pitch;
pub mod stabilizer;
pub mod tuning;

use std::fmt;

use thiserror::Error;

/// Errors produced by the core.
///
/// Everything else irregular (no pitch, low amplitude, too-soon sample) is a
/// normal, silently-discarded condition and never surfaces as an error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NoteError {
    /// The reference pitch handed to a constructor was not a positive,
    /// finite frequency. Fatal at construction time.
    #[error("invalid configuration: reference pitch must be positive, got {0} Hz")]
    InvalidConfiguration(f64),
    /// A non-positive frequency reached the note arithmetic directly.
    /// The stabilizer filters these out, so a direct caller hitting this
    /// has a bug upstream, not a runtime condition to recover from.
    #[error("invalid sample: frequency must be positive, got {0} Hz")]
    InvalidSample(f64),
}

/// A resolved, stable note detection.
// This derive is necessary for the struct to cross the channel to a frontend.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    /// Semitone label, one of the twelve names in [`tuning::NOTE_NAMES`].
    pub name: &'static str,
    /// Note index: semitone distance from C-1, with concert A at 69.
    pub value: i32,
    /// Deviation from the note's standard-tuned frequency, in cents.
    pub cents: i32,
    /// Octave number (A4 is octave 4).
    pub octave: i32,
    /// The raw detected frequency in Hz.
    pub frequency: f64,
}

impl fmt::Display for NoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} {:+} cents ({:.2} Hz)",
            self.name, self.octave, self.cents, self.frequency
        )
    }
}
