//! Cloud text-to-speech (`ElevenLabs`)

use secrecy::{ExposeSecret, SecretString};

use crate::config::SpeechConfig;
use crate::{Error, Result};

/// Fixed voice tuning sent with every request
const STABILITY: f32 = 0.5;
const SIMILARITY_BOOST: f32 = 0.75;
const STYLE: f32 = 0.0;
const USE_SPEAKER_BOOST: bool = true;

#[derive(serde::Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

#[derive(serde::Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// Synthesizes speech through the `ElevenLabs` API
pub struct CloudVoice {
    client: reqwest::Client,
    api_key: SecretString,
    voice_id: String,
    model_id: String,
    base_url: String,
}

impl CloudVoice {
    /// Create a cloud voice from explicit credentials
    ///
    /// # Errors
    ///
    /// Returns error if API key or voice id is missing
    pub fn new(api_key: SecretString, voice_id: String, model_id: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("ElevenLabs API key required for TTS".to_string()));
        }
        if voice_id.is_empty() {
            return Err(Error::Config("ElevenLabs voice id required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice_id,
            model_id,
            base_url: crate::config::DEFAULT_ELEVENLABS_URL.to_string(),
        })
    }

    /// Build from configuration; `None` unless both key and voice are set
    #[must_use]
    pub fn from_config(config: &SpeechConfig) -> Option<Self> {
        let key = config.elevenlabs_api_key.as_ref()?;
        let voice_id = config.voice_id.clone()?;

        Self::new(
            SecretString::from(key.expose_secret().to_owned()),
            voice_id,
            config.model_id.clone(),
        )
        .ok()
        .map(|voice| voice.with_base_url(config.elevenlabs_url.clone()))
    }

    /// Point the client at a different API host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API answers with an error status
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: STABILITY,
                similarity_boost: SIMILARITY_BOOST,
                style: STYLE,
                use_speaker_boost: USE_SPEAKER_BOOST,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(Error::Tts("ElevenLabs returned no audio".to_string()));
        }

        tracing::debug!(bytes = audio.len(), "cloud speech synthesized");
        Ok(audio.to_vec())
    }
}
