//! # Audio Capture Module
//!
//! Real-time microphone capture using CPAL. Frames of `BUFFER_SIZE` mono
//! f32 samples are assembled inside the stream callback and handed to the
//! analysis side through a crossbeam channel, together with the RMS
//! summary the stabilizer's noise gate consumes.

use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use log::{info, warn};

/// Samples per analysis frame.
///
/// 4096 samples give the pitch estimator enough periods of the lowest
/// guitar strings to lock on (~93 ms at 44.1 kHz).
pub const BUFFER_SIZE: usize = 4096;

/// Preferred capture rate in Hz.
const TARGET_SAMPLE_RATE: u32 = 44100;

/// Root-mean-square amplitude of a frame: `sqrt(mean(sample²))`.
///
/// This is the signal-presence summary the stabilizer gates on. An empty
/// frame reads 0.
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|&s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

/// Opens the default input device and streams analysis frames into
/// `sender` until the returned stream is dropped.
///
/// Frames are always exactly `BUFFER_SIZE` samples: callback deliveries
/// are accumulated and re-framed, since the device rarely honors the block
/// size exactly. When the channel is full the frame is dropped rather than
/// blocking the audio thread.
///
/// # Returns
/// * `Ok((stream, sample_rate))` - keep the stream alive for as long as
///   capture should run
/// * `Err(e)` - no usable input device or stream setup failure
pub fn start_capture(sender: Sender<Vec<f32>>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!("Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let sample_rate = supported_config
        .min_sample_rate()
        .max(cpal::SampleRate(TARGET_SAMPLE_RATE))
        .min(supported_config.max_sample_rate());
    let config = supported_config.with_sample_rate(sample_rate);

    let sample_rate_val = config.sample_rate().0;
    let config: cpal::StreamConfig = config.into();

    info!("Selected sample rate: {} Hz", sample_rate_val);

    let err_fn = |err| warn!("An error occurred on the audio stream: {}", err);

    // Accumulates callback deliveries until a full frame is available.
    let mut pending = Vec::with_capacity(BUFFER_SIZE * 2);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            pending.extend_from_slice(data);

            while pending.len() >= BUFFER_SIZE {
                let frame = pending[..BUFFER_SIZE].to_vec();

                // A full channel means the consumer is behind; drop the
                // frame instead of stalling the device callback.
                let _ = sender.try_send(frame);

                pending.drain(..BUFFER_SIZE);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate_val))
}

/// Picks the mono f32 input configuration closest to the target rate.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1 && c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i32 - target_rate as i32).abs();
            let max_diff = (c.max_sample_rate().0 as i32 - target_rate as i32).abs();
            min_diff.min(max_diff)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_a_known_frame() {
        let value = rms(&[0.6, -0.8]);
        assert!((value - 0.5_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn rms_of_silence_and_emptiness_is_zero() {
        assert_eq!(rms(&[0.0; 512]), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn rms_of_a_full_scale_square_wave_is_one() {
        let frame: Vec<f32> = (0..64).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert_eq!(rms(&frame), 1.0);
    }
}
