//! Error types for the Jarvis voice front-end

use thiserror::Error;

/// Result type alias for Jarvis operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice front-end
///
/// Most of these never leave their component: the chat client turns
/// `Chat` into an apology, the speech output falls back on `Tts`, and the
/// store reverts to defaults on corrupt data.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Platform lacks a capture or synthesis capability
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Cloud text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// On-device synthesis error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Remote chat endpoint error
    #[error("chat error: {0}")]
    Chat(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
