//! Voice intensity signal for the visual pulse

use std::sync::Arc;

use tokio::sync::watch;

/// Synthetic [0, 1] level published to presentation layers
///
/// Not a measured amplitude: capture derives it from interim transcript
/// length and synthesis from random jitter while speaking.
#[derive(Clone)]
pub struct VoiceMeter {
    tx: Arc<watch::Sender<f32>>,
}

impl Default for VoiceMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceMeter {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0.0);
        Self { tx: Arc::new(tx) }
    }

    /// Publish a new level, clamped to [0, 1]
    pub fn set(&self, level: f32) {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        self.tx.send_replace(level);
    }

    pub fn reset(&self) {
        self.set(0.0);
    }

    /// Current level
    #[must_use]
    pub fn level(&self) -> f32 {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<f32> {
        self.tx.subscribe()
    }
}

/// Level estimate from an interim transcript: `min(1, chars / 30)`
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn interim_level(transcript: &str) -> f32 {
    (transcript.chars().count() as f32 / 30.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interim_level() {
        assert!(interim_level("").abs() < f32::EPSILON);
        assert!((interim_level("abcdefghijklmno") - 0.5).abs() < 1e-6);
        assert!((interim_level(&"x".repeat(90)) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_set_clamps() {
        let meter = VoiceMeter::new();
        let rx = meter.subscribe();

        meter.set(3.0);
        assert!((*rx.borrow() - 1.0).abs() < f32::EPSILON);

        meter.set(-1.0);
        assert!(meter.level().abs() < f32::EPSILON);

        meter.set(f32::NAN);
        assert!(meter.level().abs() < f32::EPSILON);
    }
}
