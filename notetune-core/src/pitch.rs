//! # Pitch Estimation Module
//!
//! This module defines the capability interface the stabilizer consumes a
//! pitch detector through, and a YIN implementation of it. Any estimator
//! that can turn a raw sample frame into a positive fundamental frequency
//! (or decline) is compatible.
//!
//! ## Features
//! - One-operation `PitchEstimator` trait over detector implementations
//! - YIN detection with an FFT-based difference function
//! - Clarity checking to reject noise
//! - Parabolic interpolation for sub-sample accuracy

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

/// Margin above the global minimum used to pick the first significant dip.
/// Taking the first dip rather than the global minimum prevents the
/// estimator from locking onto a subharmonic an octave down.
const DIP_MARGIN: f32 = 0.05;

/// A clear tone dips well below this in the normalized difference buffer;
/// anything shallower is treated as noise.
const CLARITY_THRESHOLD: f32 = 0.1;

/// Estimates below this are outside the audible range and discarded.
const MIN_FREQUENCY: f32 = 20.0;

/// Capability interface over pitch-detector implementations.
///
/// One operation: turn a raw audio frame into a fundamental-frequency
/// estimate in Hz, or `None` when the frame has no discernible pitch.
/// Takes `&mut self` so implementations may keep scratch buffers.
pub trait PitchEstimator {
    fn estimate(&mut self, frame: &[f32]) -> Option<f64>;
}

/// YIN pitch detector for fixed-size frames.
///
/// The difference function is computed through FFT autocorrelation instead
/// of the O(N·τ) nested loop; the transforms are planned once at
/// construction for the configured frame size.
pub struct YinEstimator {
    sample_rate: u32,
    frame_size: usize,
    fft_len: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl YinEstimator {
    /// Creates an estimator for frames of exactly `frame_size` samples
    /// captured at `sample_rate` Hz.
    pub fn new(sample_rate: u32, frame_size: usize) -> Self {
        let fft_len = (frame_size * 2).next_power_of_two();
        let mut planner = FftPlanner::new();
        Self {
            sample_rate,
            frame_size,
            fft_len,
            fft: planner.plan_fft_forward(fft_len),
            ifft: planner.plan_fft_inverse(fft_len),
            scratch: vec![Complex { re: 0.0, im: 0.0 }; fft_len],
        }
    }

    /// YIN difference function d(τ) for τ in [0, max_tau], via
    /// autocorrelation: d(τ) = Σ x_j² + Σ x_{j+τ}² - 2·r(τ).
    fn difference(&mut self, frame: &[f32], max_tau: usize) -> Vec<f32> {
        let n = frame.len();

        for slot in self.scratch.iter_mut() {
            *slot = Complex { re: 0.0, im: 0.0 };
        }
        for (slot, &sample) in self.scratch.iter_mut().zip(frame) {
            slot.re = sample;
        }

        self.fft.process(&mut self.scratch);
        for bin in self.scratch.iter_mut() {
            *bin = Complex {
                re: bin.norm_sqr(),
                im: 0.0,
            };
        }
        self.ifft.process(&mut self.scratch);
        // rustfft leaves the inverse transform unscaled.
        let scale = 1.0 / self.fft_len as f32;

        let mut prefix_sq = vec![0.0_f32; n + 1];
        for (i, &sample) in frame.iter().enumerate() {
            prefix_sq[i + 1] = prefix_sq[i] + sample * sample;
        }

        let mut diff = vec![0.0_f32; max_tau + 1];
        for (tau, value) in diff.iter_mut().enumerate().skip(1) {
            let head = prefix_sq[n - tau];
            let tail = prefix_sq[n] - prefix_sq[tau];
            let autocorr = self.scratch[tau].re * scale;
            *value = head + tail - 2.0 * autocorr;
        }
        diff
    }
}

impl PitchEstimator for YinEstimator {
    fn estimate(&mut self, frame: &[f32]) -> Option<f64> {
        if frame.len() != self.frame_size || self.frame_size < 8 {
            return None;
        }
        let max_tau = self.frame_size / 2;

        // --- Step 0: remove DC offset; a frame with no energy left has
        //     no pitch, and skipping it keeps the lag math exact ---
        let mut frame = frame.to_vec();
        remove_dc_offset(&mut frame);
        let energy: f32 = frame.iter().map(|&s| s * s).sum();
        if energy <= f32::EPSILON {
            return None;
        }

        // --- Step 1 & 2: difference function (FFT autocorrelation) ---
        let diff = self.difference(&frame, max_tau);

        // --- Step 3: cumulative mean normalized difference ---
        let cmnd = cumulative_mean_normalized(&diff);

        // --- Step 4: first significant dip, to avoid octave errors ---
        let min_val = cmnd
            .iter()
            .skip(1)
            .cloned()
            .fold(f32::INFINITY, f32::min);
        let threshold = min_val + DIP_MARGIN;

        let mut period = 0;
        for tau in 2..cmnd.len() {
            if cmnd[tau] < threshold && cmnd[tau] < cmnd[tau - 1] {
                period = tau;
                break;
            }
        }

        // --- Step 5: clarity check to reject noise ---
        if period == 0 || cmnd[period] > CLARITY_THRESHOLD {
            return None;
        }
        if period + 1 >= cmnd.len() {
            return None;
        }

        // --- Step 6: parabolic interpolation for sub-sample accuracy ---
        let refined = parabolic_refine(&cmnd, period);

        let frequency = self.sample_rate as f32 / refined;
        if frequency.is_finite() && frequency > MIN_FREQUENCY {
            Some(frequency as f64)
        } else {
            None
        }
    }
}

/// Centers a frame around zero. A DC component looks like an infinitely
/// long period to the difference function.
fn remove_dc_offset(frame: &mut [f32]) {
    if frame.is_empty() {
        return;
    }
    let avg = frame.iter().sum::<f32>() / frame.len() as f32;
    if avg.abs() > 1e-6 {
        for sample in frame.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Cumulative mean normalized difference d'(τ); d'(0) is defined as 1.
fn cumulative_mean_normalized(diff: &[f32]) -> Vec<f32> {
    let mut cmnd = vec![1.0_f32; diff.len()];
    let mut running_sum = 0.0;
    for tau in 1..diff.len() {
        running_sum += diff[tau];
        if running_sum != 0.0 {
            cmnd[tau] = diff[tau] * tau as f32 / running_sum;
        }
    }
    cmnd
}

/// Fits a parabola through the dip at `tau` and returns the refined lag.
fn parabolic_refine(cmnd: &[f32], tau: usize) -> f32 {
    let y1 = cmnd[tau - 1];
    let y2 = cmnd[tau];
    let y3 = cmnd[tau + 1];
    let denominator = y1 - 2.0 * y2 + y3;
    if denominator.abs() < 1e-12 {
        return tau as f32;
    }
    tau as f32 + (y1 - y3) / (2.0 * denominator)
}
