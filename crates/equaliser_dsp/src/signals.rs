//! Synthetic Test Signals
//!
//! Interleaved generators for offline runs and tests. The same value is
//! written to every channel of a frame.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_SINE_AMPLITUDE: f32 = 0.5;
pub const DEFAULT_NOISE_AMPLITUDE: f32 = 0.2;
pub const DEFAULT_SWEEP_AMPLITUDE: f32 = 0.5;

/// Whole frames in `duration_s`; a partial trailing frame is dropped
fn frame_count(duration_s: f64, sample_rate: f64) -> usize {
    if duration_s <= 0.0 || sample_rate <= 0.0 {
        return 0;
    }
    (duration_s * sample_rate).trunc() as usize
}

fn interleave(frames: impl Iterator<Item = f32>, channels: usize) -> Vec<f32> {
    frames
        .flat_map(|s| std::iter::repeat(s).take(channels))
        .collect()
}

/// Constant-frequency sine
pub fn sine_wave(
    frequency_hz: f64,
    duration_s: f64,
    sample_rate: f64,
    amplitude: f32,
    channels: usize,
) -> Vec<f32> {
    let n = frame_count(duration_s, sample_rate);
    let step = 2.0 * PI * frequency_hz / sample_rate;
    interleave(
        (0..n).map(|i| amplitude * (step * i as f64).sin() as f32),
        channels,
    )
}

/// Uniform white noise in [-amplitude, amplitude], reproducible from `seed`
pub fn white_noise(
    duration_s: f64,
    sample_rate: f64,
    amplitude: f32,
    channels: usize,
    seed: u64,
) -> Vec<f32> {
    let n = frame_count(duration_s, sample_rate);
    let mut rng = StdRng::seed_from_u64(seed);
    interleave(
        (0..n).map(|_| amplitude * rng.random_range(-1.0_f32..=1.0)),
        channels,
    )
}

/// Linear chirp from `start_hz` to `end_hz` over `duration_s`
pub fn sweep(
    start_hz: f64,
    end_hz: f64,
    duration_s: f64,
    sample_rate: f64,
    amplitude: f32,
    channels: usize,
) -> Vec<f32> {
    let n = frame_count(duration_s, sample_rate);
    let rate = (end_hz - start_hz) / (2.0 * duration_s);
    interleave(
        (0..n).map(|i| {
            let t = i as f64 / sample_rate;
            let phase = 2.0 * PI * (start_hz * t + rate * t * t);
            amplitude * phase.sin() as f32
        }),
        channels,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::{peak, rms};

    #[test]
    fn test_sine_layout_and_level() {
        let signal = sine_wave(1000.0, 0.5, 48000.0, 0.5, 2);
        assert_eq!(signal.len(), 48000);
        assert!(signal.chunks_exact(2).all(|f| f[0] == f[1]));
        assert!((rms(&signal) - 0.5 / 2.0_f64.sqrt()).abs() < 1e-3);
    }

    #[test]
    fn test_noise_is_seeded_and_bounded() {
        let a = white_noise(0.1, 48000.0, 0.2, 2, 42);
        let b = white_noise(0.1, 48000.0, 0.2, 2, 42);
        let c = white_noise(0.1, 48000.0, 0.2, 2, 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 9600);
        assert!(a.chunks_exact(2).all(|f| f[0] == f[1]));
        assert!(peak(&a) <= 0.2 + 1e-6);
    }

    #[test]
    fn test_sweep_bounded_and_nonzero() {
        let signal = sweep(20.0, 20000.0, 1.0, 48000.0, 0.5, 1);
        assert_eq!(signal.len(), 48000);
        assert!(peak(&signal) <= 0.5 + 1e-6);
        assert!(rms(&signal) > 0.3);
    }

    #[test]
    fn test_partial_frame_is_dropped() {
        // 10.7 frames long
        let signal = sine_wave(1000.0, 10.7 / 48000.0, 48000.0, 0.5, 2);
        assert_eq!(signal.len(), 20);
        assert_eq!(white_noise(10.7 / 48000.0, 48000.0, 0.2, 1, 1).len(), 10);
    }

    #[test]
    fn test_empty_duration() {
        assert!(sine_wave(1000.0, 0.0, 48000.0, 0.5, 2).is_empty());
    }
}
