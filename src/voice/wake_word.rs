//! Wake word gate
//!
//! A final transcript activates the assistant when its lowercase form
//! contains the configured wake word. Plain substring containment: no
//! word boundaries, no fuzzy matching.

use crate::{Error, Result};

/// Case-insensitive substring matcher for the wake word
#[derive(Debug, Clone)]
pub struct WakeWordGate {
    wake_word: String,
}

impl WakeWordGate {
    /// Create a gate for `wake_word`
    ///
    /// # Errors
    ///
    /// Returns error if the wake word is blank
    pub fn new(wake_word: &str) -> Result<Self> {
        let normalized = wake_word.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(Error::Config("wake word must not be empty".to_string()));
        }

        tracing::debug!(wake_word = %normalized, "wake word gate initialized");
        Ok(Self {
            wake_word: normalized,
        })
    }

    /// Check whether a final transcript contains the wake word
    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        let hit = transcript.to_lowercase().contains(&self.wake_word);
        if hit {
            tracing::info!(wake_word = %self.wake_word, transcript, "wake word detected");
        }
        hit
    }

    #[must_use]
    pub fn wake_word(&self) -> &str {
        &self.wake_word
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_containment() {
        let gate = WakeWordGate::new("Jarvis").unwrap();

        assert!(gate.matches("ei jarvis"));
        assert!(gate.matches("EI JARVIS, tudo bem?"));
        assert!(!gate.matches("olá mundo"));
        assert!(!gate.matches("jar vis"));
    }

    #[test]
    fn test_no_word_boundary() {
        let gate = WakeWordGate::new("jarvis").unwrap();
        assert!(gate.matches("starjarvisx"));
    }

    #[test]
    fn test_blank_rejected() {
        assert!(WakeWordGate::new("   ").is_err());
    }
}
