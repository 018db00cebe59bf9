//! Configuration management for the voice front-end
//!
//! Resolved once at startup with precedence env > TOML file > default.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::voice::SttProvider;
use crate::{Error, Result};
use file::JarvisConfigFile;

/// Default chat endpoint
pub const DEFAULT_CHAT_URL: &str = "http://localhost:3000/api/chat";

/// Default `ElevenLabs` API base
pub const DEFAULT_ELEVENLABS_URL: &str = "https://api.elevenlabs.io";

/// Front-end configuration
#[derive(Debug)]
pub struct Config {
    /// Trigger phrase, lowercase
    pub wake_word: String,

    /// Spoken language tag (BCP 47, e.g. "pt-BR")
    pub language: String,

    /// Path to data directory (conversation store)
    pub data_dir: PathBuf,

    /// Remote chat endpoint
    pub chat: ChatConfig,

    /// Speech synthesis
    pub speech: SpeechConfig,

    /// Speech capture
    pub capture: CaptureConfig,
}

/// Remote chat endpoint configuration
#[derive(Debug)]
pub struct ChatConfig {
    /// Full endpoint URL the request is POSTed to
    pub url: String,

    /// Bearer token, sent as `Authorization` when present
    pub token: Option<SecretString>,

    /// Session identifier forwarded with every request
    pub session_id: String,

    /// Model identifier
    pub model: String,

    /// Token budget for the reply
    pub max_tokens: u32,
}

/// Cloud speech synthesis configuration
#[derive(Debug)]
pub struct SpeechConfig {
    /// `ElevenLabs` API key
    pub elevenlabs_api_key: Option<SecretString>,

    /// `ElevenLabs` voice identifier
    pub voice_id: Option<String>,

    /// `ElevenLabs` model identifier
    pub model_id: String,

    /// `ElevenLabs` API base URL
    pub elevenlabs_url: String,
}

impl SpeechConfig {
    /// Cloud synthesis needs both the key and a voice
    #[must_use]
    pub const fn cloud_enabled(&self) -> bool {
        self.elevenlabs_api_key.is_some() && self.voice_id.is_some()
    }
}

/// Speech capture configuration
#[derive(Debug)]
pub struct CaptureConfig {
    /// Enable microphone capture
    pub enabled: bool,

    /// Cloud STT backend used to transcribe speech segments
    pub stt_provider: SttProvider,

    /// API key for the STT backend
    pub stt_api_key: Option<SecretString>,

    /// STT model
    pub stt_model: String,

    /// Silence after which the capture session ends and restarts
    pub session_timeout: Duration,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load() -> Result<Self> {
        Self::load_with_options(false)
    }

    /// Load configuration with explicit capture disable option
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load_with_options(disable_capture: bool) -> Result<Self> {
        let fc = file::load_config_file();
        let mut config = Self::resolve(fc, |key| std::env::var(key).ok())?;

        if disable_capture {
            tracing::info!("capture explicitly disabled via --no-mic");
            config.capture.enabled = false;
        }

        if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
            tracing::warn!(
                path = %config.data_dir.display(),
                error = %e,
                "failed to create data directory"
            );
        }

        Ok(config)
    }

    /// Resolve configuration from a file overlay and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn resolve<F>(fc: JarvisConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let wake_word = env("JARVIS_WAKE_WORD")
            .or(fc.wake_word)
            .unwrap_or_else(|| "jarvis".to_string())
            .trim()
            .to_lowercase();
        if wake_word.is_empty() {
            return Err(Error::Config("wake word must not be empty".to_string()));
        }

        let language = env("JARVIS_LANGUAGE")
            .or(fc.language)
            .unwrap_or_else(|| "pt-BR".to_string());

        let data_dir = env("JARVIS_DATA_DIR")
            .or(fc.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        // Chat endpoint (env > toml > default)
        let max_tokens = match env("JARVIS_MAX_TOKENS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|e| Error::Config(format!("JARVIS_MAX_TOKENS: {e}")))?,
            None => fc.chat.max_tokens.unwrap_or(1024),
        };
        if max_tokens == 0 {
            return Err(Error::Config("max tokens must be positive".to_string()));
        }

        let chat = ChatConfig {
            url: env("JARVIS_CHAT_URL")
                .or(fc.chat.url)
                .unwrap_or_else(|| DEFAULT_CHAT_URL.to_string()),
            token: non_empty(env("JARVIS_CHAT_TOKEN").or(fc.chat.token)).map(SecretString::from),
            session_id: env("JARVIS_SESSION_ID")
                .or(fc.chat.session_id)
                .unwrap_or_else(|| "jarvis-main".to_string()),
            model: env("JARVIS_MODEL")
                .or(fc.chat.model)
                .unwrap_or_else(|| "openclaw".to_string()),
            max_tokens,
        };

        let speech = SpeechConfig {
            elevenlabs_api_key: non_empty(
                env("ELEVENLABS_API_KEY").or(fc.speech.elevenlabs_api_key),
            )
            .map(SecretString::from),
            voice_id: non_empty(env("ELEVENLABS_VOICE_ID").or(fc.speech.voice_id)),
            model_id: env("ELEVENLABS_MODEL_ID")
                .or(fc.speech.model_id)
                .unwrap_or_else(|| "eleven_multilingual_v2".to_string()),
            elevenlabs_url: env("ELEVENLABS_URL")
                .unwrap_or_else(|| DEFAULT_ELEVENLABS_URL.to_string()),
        };

        // Capture (env > toml > default); the key falls back to the provider's own variable
        let stt_provider = match env("JARVIS_STT_PROVIDER").or(fc.capture.stt_provider) {
            Some(name) => SttProvider::parse(&name)
                .ok_or_else(|| Error::Config(format!("unknown STT provider: {name}")))?,
            None => SttProvider::Whisper,
        };
        let provider_key = match stt_provider {
            SttProvider::Whisper => env("OPENAI_API_KEY"),
            SttProvider::Deepgram => env("DEEPGRAM_API_KEY"),
        };
        let session_timeout_secs = match env("JARVIS_SESSION_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("JARVIS_SESSION_TIMEOUT_SECS: {e}")))?,
            None => fc.capture.session_timeout_secs.unwrap_or(8),
        };
        let capture = CaptureConfig {
            enabled: fc.capture.enabled.unwrap_or(true),
            stt_provider,
            stt_api_key: non_empty(provider_key.or(fc.capture.stt_api_key))
                .map(SecretString::from),
            stt_model: env("JARVIS_STT_MODEL")
                .or(fc.capture.stt_model)
                .unwrap_or_else(|| stt_provider.default_model().to_string()),
            session_timeout: Duration::from_secs(session_timeout_secs.max(1)),
        };

        Ok(Self {
            wake_word,
            language,
            data_dir,
            chat,
            speech,
            capture,
        })
    }

    /// Path of the conversation store
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("jarvis.db")
    }
}

/// Default data directory (`~/.local/share/jarvis` on Linux)
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("jarvis"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn resolve_with(vars: &[(&str, &str)], fc: JarvisConfigFile) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::resolve(fc, |key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = resolve_with(&[], JarvisConfigFile::default()).unwrap();

        assert_eq!(config.wake_word, "jarvis");
        assert_eq!(config.language, "pt-BR");
        assert_eq!(config.chat.url, DEFAULT_CHAT_URL);
        assert_eq!(config.chat.session_id, "jarvis-main");
        assert_eq!(config.chat.max_tokens, 1024);
        assert!(config.chat.token.is_none());
        assert!(!config.speech.cloud_enabled());
        assert_eq!(config.speech.model_id, "eleven_multilingual_v2");
        assert_eq!(config.capture.stt_provider, SttProvider::Whisper);
        assert_eq!(config.capture.stt_model, "whisper-1");
        assert_eq!(config.capture.session_timeout, Duration::from_secs(8));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut fc = JarvisConfigFile::default();
        fc.chat.model = Some("from-file".to_string());
        fc.chat.session_id = Some("file-session".to_string());

        let config = resolve_with(&[("JARVIS_MODEL", "from-env")], fc).unwrap();

        assert_eq!(config.chat.model, "from-env");
        assert_eq!(config.chat.session_id, "file-session");
    }

    #[test]
    fn test_cloud_speech_needs_key_and_voice() {
        let only_key = resolve_with(
            &[("ELEVENLABS_API_KEY", "xi-key")],
            JarvisConfigFile::default(),
        )
        .unwrap();
        assert!(!only_key.speech.cloud_enabled());

        let both = resolve_with(
            &[("ELEVENLABS_API_KEY", "xi-key"), ("ELEVENLABS_VOICE_ID", "voice-1")],
            JarvisConfigFile::default(),
        )
        .unwrap();
        assert!(both.speech.cloud_enabled());
        assert_eq!(
            both.speech.elevenlabs_api_key.unwrap().expose_secret(),
            "xi-key"
        );
    }

    #[test]
    fn test_wake_word_normalized() {
        let config =
            resolve_with(&[("JARVIS_WAKE_WORD", "  Sexta-Feira ")], JarvisConfigFile::default())
                .unwrap();
        assert_eq!(config.wake_word, "sexta-feira");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(resolve_with(&[("JARVIS_WAKE_WORD", "  ")], JarvisConfigFile::default()).is_err());
        assert!(resolve_with(&[("JARVIS_MAX_TOKENS", "lots")], JarvisConfigFile::default()).is_err());
        assert!(resolve_with(&[("JARVIS_MAX_TOKENS", "0")], JarvisConfigFile::default()).is_err());
        assert!(
            resolve_with(&[("JARVIS_STT_PROVIDER", "carrier-pigeon")], JarvisConfigFile::default())
                .is_err()
        );
    }

    #[test]
    fn test_deepgram_key_and_model() {
        let config = resolve_with(
            &[
                ("JARVIS_STT_PROVIDER", "deepgram"),
                ("DEEPGRAM_API_KEY", "dg"),
                ("OPENAI_API_KEY", "sk"),
            ],
            JarvisConfigFile::default(),
        )
        .unwrap();

        assert_eq!(config.capture.stt_provider, SttProvider::Deepgram);
        assert_eq!(config.capture.stt_model, "nova-2");
        assert_eq!(config.capture.stt_api_key.unwrap().expose_secret(), "dg");
    }

    #[test]
    fn test_blank_token_is_none() {
        let config =
            resolve_with(&[("JARVIS_CHAT_TOKEN", "")], JarvisConfigFile::default()).unwrap();
        assert!(config.chat.token.is_none());
    }
}
