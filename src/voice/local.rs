//! On-device speech synthesis
//!
//! The platform synthesizer is modelled as an utterance player: it speaks
//! one utterance at a time and reports `Started`, `Boundary`, `Ended` or
//! `Failed` events. The shipped backend drives `espeak-ng`.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::{Error, Result};

/// espeak-ng defaults that `rate` and `pitch` scale
const ESPEAK_BASE_WPM: f32 = 175.0;
const ESPEAK_BASE_PITCH: f32 = 50.0;

/// Voice gender as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceGender {
    Male,
    Female,
    Unknown,
}

/// A voice the engine can speak with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceDescriptor {
    pub name: String,
    /// Language tag, e.g. "pt-br"
    pub language: String,
    pub gender: VoiceGender,
}

/// One request to the synthesizer
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub language: String,
    /// Relative speaking rate, 1.0 = engine default
    pub rate: f32,
    /// Relative pitch, 1.0 = engine default
    pub pitch: f32,
    pub voice: Option<VoiceDescriptor>,
}

/// Progress of an utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Started,
    /// A word or sentence boundary was reached
    Boundary,
    Ended,
    Failed(String),
}

/// Platform speech synthesizer
pub trait UtterancePlayer: Send + Sync {
    /// Voices available to the engine
    fn voices(&self) -> Vec<VoiceDescriptor>;

    /// Start speaking; events arrive on the returned channel
    fn speak(&self, utterance: Utterance) -> mpsc::UnboundedReceiver<SynthesisEvent>;
}

/// Pick the preferred male-sounding voice for `language`, if one exists
#[must_use]
pub fn preferred_voice<'a>(voices: &'a [VoiceDescriptor], language: &str) -> Option<&'a VoiceDescriptor> {
    let primary = language
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase();

    voices.iter().find(|v| {
        v.language.to_lowercase().starts_with(&primary)
            && (v.name.to_lowercase().contains("male")
                || v.name.contains("Daniel")
                || v.name.contains("Google")
                || v.gender == VoiceGender::Male)
    })
}

/// Split text into sentences, each spoken as its own boundary
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?' | ';') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Parse the table printed by `espeak-ng --voices`
#[must_use]
pub fn parse_voice_list(output: &str) -> Vec<VoiceDescriptor> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return None;
            }
            let gender = match cols[2].rsplit('/').next() {
                Some("M") => VoiceGender::Male,
                Some("F") => VoiceGender::Female,
                _ => VoiceGender::Unknown,
            };
            Some(VoiceDescriptor {
                name: cols[3].to_string(),
                language: cols[1].to_string(),
                gender,
            })
        })
        .collect()
}

/// `espeak-ng` child-process synthesizer
pub struct EspeakPlayer {
    binary: PathBuf,
    voices: Vec<VoiceDescriptor>,
}

impl EspeakPlayer {
    /// Find espeak on `PATH` and enumerate its voices for `language`
    ///
    /// # Errors
    ///
    /// Returns `CapabilityUnavailable` if no espeak binary is installed
    pub fn locate(language: &str) -> Result<Self> {
        let binary = which::which("espeak-ng")
            .or_else(|_| which::which("espeak"))
            .map_err(|_| {
                Error::CapabilityUnavailable("espeak-ng not found on PATH".to_string())
            })?;

        let primary = language.split(['-', '_']).next().unwrap_or_default();
        let voices = std::process::Command::new(&binary)
            .arg(format!("--voices={primary}"))
            .output()
            .map(|out| parse_voice_list(&String::from_utf8_lossy(&out.stdout)))
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to enumerate espeak voices");
                Vec::new()
            });

        tracing::debug!(
            binary = %binary.display(),
            voices = voices.len(),
            "on-device synthesizer located"
        );
        Ok(Self { binary, voices })
    }
}

impl UtterancePlayer for EspeakPlayer {
    fn voices(&self) -> Vec<VoiceDescriptor> {
        self.voices.clone()
    }

    fn speak(&self, utterance: Utterance) -> mpsc::UnboundedReceiver<SynthesisEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let binary = self.binary.clone();

        tokio::spawn(async move {
            let voice = utterance
                .voice
                .as_ref()
                .map_or_else(|| utterance.language.to_lowercase(), |v| v.language.clone());
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let wpm = (ESPEAK_BASE_WPM * utterance.rate).round().max(80.0) as u32;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let pitch = (ESPEAK_BASE_PITCH * utterance.pitch).round().clamp(0.0, 99.0) as u32;

            let _ = tx.send(SynthesisEvent::Started);

            for sentence in split_sentences(&utterance.text) {
                let _ = tx.send(SynthesisEvent::Boundary);

                let status = tokio::process::Command::new(&binary)
                    .arg("-v")
                    .arg(&voice)
                    .arg("-s")
                    .arg(wpm.to_string())
                    .arg("-p")
                    .arg(pitch.to_string())
                    .arg("--")
                    .arg(&sentence)
                    .kill_on_drop(true)
                    .status()
                    .await;

                match status {
                    Ok(s) if s.success() => {}
                    Ok(s) => {
                        let _ = tx.send(SynthesisEvent::Failed(format!("espeak exited with {s}")));
                        return;
                    }
                    Err(e) => {
                        let _ = tx.send(SynthesisEvent::Failed(e.to_string()));
                        return;
                    }
                }
            }

            let _ = tx.send(SynthesisEvent::Ended);
        });

        rx
    }
}
