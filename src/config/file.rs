//! TOML configuration file loading
//!
//! Supports `~/.config/jarvis/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct JarvisConfigFile {
    /// Trigger phrase (e.g. "jarvis")
    #[serde(default)]
    pub wake_word: Option<String>,

    /// Spoken language tag (e.g. "pt-BR")
    #[serde(default)]
    pub language: Option<String>,

    /// Directory holding the conversation store
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Remote chat endpoint
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Speech synthesis
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Speech capture
    #[serde(default)]
    pub capture: CaptureFileConfig,
}

/// Chat endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
}

/// Cloud speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// `ElevenLabs` API key
    pub elevenlabs_api_key: Option<String>,

    /// `ElevenLabs` voice identifier
    pub voice_id: Option<String>,

    /// `ElevenLabs` model identifier
    pub model_id: Option<String>,
}

/// Capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Enable microphone capture
    pub enabled: Option<bool>,

    /// "whisper" or "deepgram"
    pub stt_provider: Option<String>,

    /// API key for the selected STT provider
    pub stt_api_key: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Seconds without speech before the capture session ends
    pub session_timeout_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `JarvisConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> JarvisConfigFile {
    config_file_path().map_or_else(JarvisConfigFile::default, |path| load_from(&path))
}

/// Load a config file from an explicit path
///
/// Missing or malformed files yield the defaults.
pub fn load_from(path: &Path) -> JarvisConfigFile {
    if !path.exists() {
        return JarvisConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                JarvisConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            JarvisConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/jarvis/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("jarvis").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "wake_word = \"sexta-feira\"\n[chat]\nmodel = \"gpt-4o\"\nmax_tokens = 256"
        )
        .unwrap();

        let fc = load_from(file.path());
        assert_eq!(fc.wake_word.as_deref(), Some("sexta-feira"));
        assert_eq!(fc.chat.model.as_deref(), Some("gpt-4o"));
        assert_eq!(fc.chat.max_tokens, Some(256));
        assert!(fc.speech.voice_id.is_none());
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "wake_word = [unterminated").unwrap();

        let fc = load_from(file.path());
        assert!(fc.wake_word.is_none());
    }

    #[test]
    fn test_missing_file() {
        let fc = load_from(Path::new("/nonexistent/jarvis/config.toml"));
        assert!(fc.chat.url.is_none());
    }
}
