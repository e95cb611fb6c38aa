//! # Note Stabilization Module
//!
//! Turns the noisy, per-frame stream of pitch estimates into a low-noise
//! stream of note-detection events. Per-frame estimates on real audio
//! jitter by fractions of a semitone near note boundaries, so the
//! stabilizer tracks the currently-forming note separately from the
//! decision to report it: a note change is a state transition, and only a
//! note that has held long enough is emitted downstream.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{NoteError, NoteEvent, tuning::NoteMapper};

/// Tuning knobs for the stabilizer, accepted at construction.
///
/// The defaults (all time thresholds at 0) make the stabilizer a pure
/// pass-through: every above-gate sample with a detected pitch emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Frequency of the reference note (concert A / note 69), in Hz.
    pub reference_pitch: f64,
    /// RMS amplitude below which a frame is treated as silence/noise.
    pub noise_gate_threshold: f32,
    /// Minimum time between two emitted events, in ms. 0 disables the gate.
    pub detection_cooldown_ms: u64,
    /// Minimum time a note must hold before it is reported, in ms.
    /// 0 disables the gate.
    pub note_switch_threshold_ms: u64,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            reference_pitch: 440.0,
            noise_gate_threshold: 0.05,
            detection_cooldown_ms: 0,
            note_switch_threshold_ms: 0,
        }
    }
}

/// Mutable detection state, owned by exactly one [`NoteStabilizer`].
///
/// Invariant: `current_note_start` is `Some` iff `current_note` is `Some`,
/// and is reset to the sample's timestamp whenever the note changes.
#[derive(Debug, Clone, Default, PartialEq)]
struct StabilizerState {
    current_note: Option<i32>,
    current_note_start: Option<u64>,
    last_emission: Option<u64>,
}

/// Stateful filter from `(amplitude, frequency, timestamp)` samples to
/// stable [`NoteEvent`]s.
///
/// `process` is a plain synchronous state transition; callers feed it one
/// sample per audio frame, strictly ordered by timestamp, from a single
/// logical thread. There are no internal timers - the cooldown and hold
/// gates are data-driven comparisons against the sample timestamps.
#[derive(Debug)]
pub struct NoteStabilizer {
    mapper: NoteMapper,
    config: StabilizerConfig,
    state: StabilizerState,
}

impl NoteStabilizer {
    /// Creates a stabilizer with no current note.
    ///
    /// # Errors
    /// * `InvalidConfiguration` - if the configured reference pitch is not
    ///   positive and finite
    pub fn new(config: StabilizerConfig) -> Result<Self, NoteError> {
        let mapper = NoteMapper::new(config.reference_pitch)?;
        Ok(Self {
            mapper,
            config,
            state: StabilizerState::default(),
        })
    }

    /// The mapper this stabilizer resolves notes with.
    pub fn mapper(&self) -> &NoteMapper {
        &self.mapper
    }

    /// The note currently being tracked, emitted or not.
    pub fn current_note(&self) -> Option<i32> {
        self.state.current_note
    }

    /// Forgets the current note and all timing state.
    pub fn reset(&mut self) {
        self.state = StabilizerState::default();
    }

    /// Feeds one audio-frame sample through the gate chain.
    ///
    /// Returns the emitted event, or `None` when the sample was discarded
    /// (noise floor, cooldown, no pitch, or a note that has not settled).
    ///
    /// # Arguments
    /// * `amplitude_rms` - RMS of the raw frame (see [`crate::audio::rms`])
    /// * `frequency` - the pitch estimate for the frame, if any
    /// * `timestamp_ms` - sample time in milliseconds, monotonically
    ///   non-decreasing across calls
    pub fn process(
        &mut self,
        amplitude_rms: f32,
        frequency: Option<f64>,
        timestamp_ms: u64,
    ) -> Option<NoteEvent> {
        // 1. Noise gate: below the threshold the frame is silence, whatever
        //    the pitch detector thought it heard. No state change.
        if amplitude_rms < self.config.noise_gate_threshold {
            return None;
        }

        // 2. Cooldown since the last emission.
        if let Some(last) = self.state.last_emission {
            if timestamp_ms.saturating_sub(last) < self.config.detection_cooldown_ms {
                return None;
            }
        }

        // 3. No discernible fundamental this frame. Non-positive values
        //    count as "no pitch" here so they never reach the mapper.
        let frequency = match frequency {
            Some(f) if f.is_finite() && f > 0.0 => f,
            _ => return None,
        };

        // 4. Map to the nearest note. Cannot fail past the guard above.
        let note = self.mapper.map_frequency(frequency).ok()?;

        // 5. A different note starts the hold clock over. This is a state
        //    transition, not an emission.
        if self.state.current_note != Some(note) {
            self.state.current_note = Some(note);
            self.state.current_note_start = Some(timestamp_ms);
        }

        // 6. Hold-time gate: the note has not settled yet.
        if let Some(start) = self.state.current_note_start {
            if timestamp_ms.saturating_sub(start) < self.config.note_switch_threshold_ms {
                return None;
            }
        }

        // 7. Emit.
        let event = self.mapper.resolve(frequency).ok()?;
        self.state.last_emission = Some(timestamp_ms);
        debug!(
            "[STABILIZER] {} at {} ms ({} Hz)",
            event, timestamp_ms, frequency
        );
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stabilizer(config: StabilizerConfig) -> NoteStabilizer {
        NoteStabilizer::new(config).unwrap()
    }

    const A4: f64 = 440.0;
    const A_SHARP4: f64 = 466.16;

    #[test]
    fn default_config_is_pass_through() {
        let mut s = stabilizer(StabilizerConfig::default());
        for t in [0, 10, 20, 30] {
            let event = s.process(0.5, Some(A4), t).expect("sample should emit");
            assert_eq!(event.value, 69);
            assert_eq!(event.name, "A");
        }
    }

    #[test]
    fn noise_gate_discards_without_touching_state() {
        let mut s = stabilizer(StabilizerConfig {
            note_switch_threshold_ms: 100,
            ..StabilizerConfig::default()
        });
        assert_eq!(s.process(0.01, Some(A4), 0), None);
        assert_eq!(s.current_note(), None);
        // If the gated sample had started the hold clock at t=0, this
        // sample at t=200 would already be settled and emit. It must not.
        assert_eq!(s.process(0.5, Some(A4), 200), None);
        assert_eq!(s.current_note(), Some(69));
    }

    #[test]
    fn no_pitch_and_bad_frequencies_are_discarded() {
        let mut s = stabilizer(StabilizerConfig::default());
        assert_eq!(s.process(0.5, None, 0), None);
        assert_eq!(s.process(0.5, Some(0.0), 10), None);
        assert_eq!(s.process(0.5, Some(-440.0), 20), None);
        assert_eq!(s.process(0.5, Some(f64::NAN), 30), None);
        assert_eq!(s.current_note(), None);
    }

    #[test]
    fn cooldown_suppresses_the_second_detection() {
        let mut s = stabilizer(StabilizerConfig {
            detection_cooldown_ms: 50,
            ..StabilizerConfig::default()
        });
        assert!(s.process(0.5, Some(A4), 1000).is_some());
        assert_eq!(s.process(0.5, Some(A4), 1010), None);
        assert!(s.process(0.5, Some(A4), 1050).is_some());
    }

    #[test]
    fn flicker_between_adjacent_notes_never_emits() {
        let mut s = stabilizer(StabilizerConfig {
            note_switch_threshold_ms: 100,
            ..StabilizerConfig::default()
        });
        // Alternating faster than the hold time restarts the clock on
        // every sample, so nothing ever settles.
        let mut t = 0;
        for _ in 0..20 {
            assert_eq!(s.process(0.5, Some(A4), t), None);
            t += 50;
            assert_eq!(s.process(0.5, Some(A_SHARP4), t), None);
            t += 50;
        }
    }

    #[test]
    fn a_held_note_emits_once_it_settles() {
        let mut s = stabilizer(StabilizerConfig {
            note_switch_threshold_ms: 100,
            ..StabilizerConfig::default()
        });
        assert_eq!(s.process(0.5, Some(A4), 0), None);
        assert_eq!(s.process(0.5, Some(A4), 60), None);
        let event = s.process(0.5, Some(A4), 120).expect("held note settles");
        assert_eq!(event.value, 69);
        // Back to flickering: no further emissions.
        assert_eq!(s.process(0.5, Some(A_SHARP4), 150), None);
        assert_eq!(s.process(0.5, Some(A4), 180), None);
        assert_eq!(s.process(0.5, Some(A_SHARP4), 210), None);
    }

    #[test]
    fn reset_forgets_the_forming_note() {
        let mut s = stabilizer(StabilizerConfig {
            note_switch_threshold_ms: 100,
            ..StabilizerConfig::default()
        });
        assert_eq!(s.process(0.5, Some(A4), 0), None);
        assert_eq!(s.current_note(), Some(69));
        s.reset();
        assert_eq!(s.current_note(), None);
        // The hold clock starts over after the reset.
        assert_eq!(s.process(0.5, Some(A4), 150), None);
    }

    #[test]
    fn invalid_reference_pitch_fails_at_construction() {
        let config = StabilizerConfig {
            reference_pitch: 0.0,
            ..StabilizerConfig::default()
        };
        assert_eq!(
            NoteStabilizer::new(config).unwrap_err(),
            NoteError::InvalidConfiguration(0.0)
        );
    }

    #[test]
    fn config_defaults_match_the_documented_values() {
        let config = StabilizerConfig::default();
        assert_eq!(config.reference_pitch, 440.0);
        assert_eq!(config.noise_gate_threshold, 0.05);
        assert_eq!(config.detection_cooldown_ms, 0);
        assert_eq!(config.note_switch_threshold_ms, 0);
    }

    #[test]
    fn partial_config_json_falls_back_to_defaults() {
        let config: StabilizerConfig =
            serde_json::from_str(r#"{ "note_switch_threshold_ms": 250 }"#).unwrap();
        assert_eq!(config.note_switch_threshold_ms, 250);
        assert_eq!(config.reference_pitch, 440.0);
        assert_eq!(config.noise_gate_threshold, 0.05);
    }
}
