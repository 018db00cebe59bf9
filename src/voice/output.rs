//! Speech output service
//!
//! Speaks replies through the cloud voice when one is configured and falls
//! back to the on-device synthesizer on any cloud failure. While speaking
//! it drives the voice meter; when done it always resets it to zero.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use super::local::{SynthesisEvent, Utterance, UtterancePlayer, preferred_voice};
use super::meter::VoiceMeter;
use super::playback::AudioSink;
use super::tts::CloudVoice;
use crate::{Error, Result};

/// Cadence of the visual pulse during cloud playback
pub const PULSE_INTERVAL: Duration = Duration::from_millis(120);

/// On-device speaking rate and pitch, relative to engine defaults
const LOCAL_RATE: f32 = 0.9;
const LOCAL_PITCH: f32 = 0.8;

/// Which path produced the audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechBackend {
    Cloud,
    Local,
    /// Nothing to say
    Skipped,
}

/// Converts reply text into audible speech
pub struct SpeechOutput {
    cloud: Option<CloudVoice>,
    sink: Option<Arc<dyn AudioSink>>,
    local: Option<Arc<dyn UtterancePlayer>>,
    language: String,
    meter: VoiceMeter,
}

impl SpeechOutput {
    #[must_use]
    pub fn new(language: impl Into<String>, meter: VoiceMeter) -> Self {
        Self {
            cloud: None,
            sink: None,
            local: None,
            language: language.into(),
            meter,
        }
    }

    /// Use a cloud voice as the primary backend
    #[must_use]
    pub fn with_cloud(mut self, cloud: CloudVoice) -> Self {
        self.cloud = Some(cloud);
        self
    }

    /// Speakers the cloud audio is played on
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// On-device fallback synthesizer
    #[must_use]
    pub fn with_local(mut self, local: Arc<dyn UtterancePlayer>) -> Self {
        self.local = Some(local);
        self
    }

    #[must_use]
    pub const fn meter(&self) -> &VoiceMeter {
        &self.meter
    }

    /// Speak `text`, resolving when playback has finished
    ///
    /// # Errors
    ///
    /// Returns error only when the on-device path fails (or is missing);
    /// cloud failures are absorbed by the fallback
    pub async fn speak(&self, text: &str) -> Result<SpeechBackend> {
        if text.trim().is_empty() {
            return Ok(SpeechBackend::Skipped);
        }

        let result = self.speak_any(text).await;
        self.meter.reset();

        match &result {
            Ok(backend) => tracing::debug!(?backend, "speech finished"),
            Err(e) => tracing::warn!(error = %e, "speech failed"),
        }
        result
    }

    async fn speak_any(&self, text: &str) -> Result<SpeechBackend> {
        if let (Some(cloud), Some(sink)) = (&self.cloud, &self.sink) {
            match self.speak_cloud(cloud, sink.as_ref(), text).await {
                Ok(()) => return Ok(SpeechBackend::Cloud),
                Err(e) => {
                    tracing::warn!(error = %e, "cloud speech failed, falling back to on-device synthesis");
                }
            }
        }

        self.speak_local(text).await?;
        Ok(SpeechBackend::Local)
    }

    async fn speak_cloud(&self, cloud: &CloudVoice, sink: &dyn AudioSink, text: &str) -> Result<()> {
        let audio = cloud.synthesize(text).await?;

        let meter = self.meter.clone();
        let pulse = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PULSE_INTERVAL);
            loop {
                ticker.tick().await;
                meter.set(random_level());
            }
        });

        let result = sink.play_mp3(audio).await;
        pulse.abort();
        let _ = pulse.await;
        result
    }

    async fn speak_local(&self, text: &str) -> Result<()> {
        let player = self.local.as_ref().ok_or_else(|| {
            Error::CapabilityUnavailable("no on-device speech synthesizer".to_string())
        })?;

        let voices = player.voices();
        let voice = preferred_voice(&voices, &self.language).cloned();
        tracing::debug!(voice = ?voice.as_ref().map(|v| &v.name), "speaking on device");

        let mut events = player.speak(Utterance {
            text: text.to_string(),
            language: self.language.clone(),
            rate: LOCAL_RATE,
            pitch: LOCAL_PITCH,
            voice,
        });

        while let Some(event) = events.recv().await {
            match event {
                SynthesisEvent::Started => tracing::trace!("utterance started"),
                SynthesisEvent::Boundary => self.meter.set(random_level()),
                SynthesisEvent::Ended => return Ok(()),
                SynthesisEvent::Failed(reason) => return Err(Error::Synthesis(reason)),
            }
        }

        Err(Error::Synthesis(
            "synthesizer stopped before the utterance ended".to_string(),
        ))
    }
}

/// Random pulse level in [0.5, 1.0]
fn random_level() -> f32 {
    rand::thread_rng().gen_range(0.5..=1.0)
}
