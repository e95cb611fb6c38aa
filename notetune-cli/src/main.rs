//! # notetune - terminal note detector
//!
//! Thin frontend over `notetune-core`: captures microphone audio on a
//! CPAL stream, runs each frame through the YIN estimator and the note
//! stabilizer, and prints every stable note detection to stdout.
//!
//! The detection thresholds come from command-line flags or, when
//! `--config` is given, from a JSON file with the same field names as
//! [`StabilizerConfig`].

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use log::info;
use notetune_core::audio;
use notetune_core::pitch::{PitchEstimator, YinEstimator};
use notetune_core::stabilizer::{NoteStabilizer, StabilizerConfig};

/// Detect and print stable musical notes from the default microphone.
#[derive(Debug, Parser)]
#[command(name = "notetune", version, about)]
struct Args {
    /// Frequency of A4 in Hz
    #[arg(long, default_value_t = 440.0)]
    reference_pitch: f64,

    /// RMS amplitude below which frames count as silence
    #[arg(long, default_value_t = 0.05)]
    noise_gate: f32,

    /// Minimum time between reported notes, in ms (0 = report every frame)
    #[arg(long, default_value_t = 0)]
    cooldown_ms: u64,

    /// Minimum time a note must hold before it is reported, in ms
    #[arg(long, default_value_t = 0)]
    hold_ms: u64,

    /// JSON config file; overrides the threshold flags entirely
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn stabilizer_config(&self) -> Result<StabilizerConfig> {
        if let Some(path) = &self.config {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let config = serde_json::from_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            return Ok(config);
        }
        Ok(StabilizerConfig {
            reference_pitch: self.reference_pitch,
            noise_gate_threshold: self.noise_gate,
            detection_cooldown_ms: self.cooldown_ms,
            note_switch_threshold_ms: self.hold_ms,
        })
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.stabilizer_config()?;

    let mut stabilizer = NoteStabilizer::new(config.clone())?;

    // Bounded so a stalled terminal backpressures into frame drops inside
    // the capture callback instead of growing without limit.
    let (sender, receiver) = bounded::<Vec<f32>>(8);
    let (_stream, sample_rate) = audio::start_capture(sender)?;
    let mut estimator = YinEstimator::new(sample_rate, audio::BUFFER_SIZE);

    info!(
        "listening: reference {} Hz, gate {}, cooldown {} ms, hold {} ms",
        config.reference_pitch,
        config.noise_gate_threshold,
        config.detection_cooldown_ms,
        config.note_switch_threshold_ms
    );
    println!(
        "Listening on the default input device (A4 = {} Hz). Ctrl-C to quit.",
        config.reference_pitch
    );

    let started = Instant::now();
    for frame in receiver.iter() {
        let amplitude = audio::rms(&frame);
        let frequency = estimator.estimate(&frame);
        let timestamp = started.elapsed().as_millis() as u64;
        if let Some(event) = stabilizer.process(amplitude, frequency, timestamp) {
            println!("{event}");
        }
    }

    Ok(())
}
