//! Activation chime
//!
//! A short sine sweep 880 → 1760 → 880 Hz over 300 ms with an exponential
//! gain decay from 0.3 to 0.01, played when the wake word is heard.

use std::f32::consts::TAU;

/// Sample rate the chime is rendered at
pub const CHIME_SAMPLE_RATE: u32 = 24000;

const DURATION_SECS: f32 = 0.3;
const BASE_HZ: f32 = 880.0;
const PEAK_HZ: f32 = 1760.0;
const START_GAIN: f32 = 0.3;
const END_GAIN: f32 = 0.01;

/// Exponential interpolation between two positive values
fn exp_ramp(from: f32, to: f32, progress: f32) -> f32 {
    from * (to / from).powf(progress.clamp(0.0, 1.0))
}

/// Instantaneous frequency at `t` seconds
fn frequency_at(t: f32) -> f32 {
    if t < 0.1 {
        exp_ramp(BASE_HZ, PEAK_HZ, t / 0.1)
    } else if t < 0.2 {
        exp_ramp(PEAK_HZ, BASE_HZ, (t - 0.1) / 0.1)
    } else {
        BASE_HZ
    }
}

/// Render the chime as mono samples
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn activation_chime(sample_rate: u32) -> Vec<f32> {
    let rate = sample_rate as f32;
    let total = (rate * DURATION_SECS) as usize;
    let mut phase = 0.0_f32;

    (0..total)
        .map(|i| {
            let t = i as f32 / rate;
            let gain = exp_ramp(START_GAIN, END_GAIN, t / DURATION_SECS);
            let sample = phase.sin() * gain;
            phase = (phase + TAU * frequency_at(t) / rate) % TAU;
            sample
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        assert_eq!(activation_chime(CHIME_SAMPLE_RATE).len(), 7200);
        assert_eq!(activation_chime(16000).len(), 4800);
    }

    #[test]
    fn test_envelope_decays() {
        let samples = activation_chime(CHIME_SAMPLE_RATE);
        let peak = |s: &[f32]| s.iter().fold(0.0f32, |m, x| m.max(x.abs()));

        assert!(peak(&samples) <= START_GAIN + f32::EPSILON);
        assert!(peak(&samples[..720]) > 0.2);
        assert!(peak(&samples[samples.len() - 240..]) < 0.02);
    }

    #[test]
    fn test_sweep_shape() {
        assert!((frequency_at(0.0) - 880.0).abs() < 0.01);
        assert!((frequency_at(0.0999) - 1760.0).abs() < 2.0);
        assert!((frequency_at(0.2) - 880.0).abs() < 0.01);
        assert!(frequency_at(0.05) > 880.0 && frequency_at(0.05) < 1760.0);
    }
}
