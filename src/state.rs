//! Conversation data model: interaction state, log entries, chat history

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase of the voice interaction cycle
///
/// The only reachable edges are `Idle → Listening → Processing → Responding → Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionState {
    /// Waiting for the wake word
    #[default]
    Idle,
    /// Wake word heard, waiting for the command
    Listening,
    /// Command sent to the chat endpoint
    Processing,
    /// Speaking the reply
    Responding,
}

impl InteractionState {
    /// The state that follows this one in the cycle
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Idle => Self::Listening,
            Self::Listening => Self::Processing,
            Self::Processing => Self::Responding,
            Self::Responding => Self::Idle,
        }
    }

    /// Whether moving from `self` to `to` follows the cycle
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        self.next() == to
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Responding => "responding",
        }
    }
}

impl fmt::Display for InteractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who produced a log entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    #[default]
    System,
    User,
    Assistant,
}

impl LogCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse a stored category; `jarvis` is the legacy name for assistant
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" | "jarvis" => Some(Self::Assistant),
            _ => None,
        }
    }

    /// Three-letter tag used by the terminal log view
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::System => "SYS",
            Self::User => "USR",
            Self::Assistant => "JAR",
        }
    }
}

/// One line of the conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub category: LogCategory,
    pub text: String,
}

impl LogEntry {
    /// Create an entry stamped now with a fresh id
    pub fn new(category: LogCategory, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            category,
            text: text.into(),
        }
    }

    /// Create a system entry
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(LogCategory::System, text)
    }
}

/// Role of a chat history message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// One message of the conversation history sent as chat context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    /// Build a message, rejecting blank content
    pub fn new(role: ChatRole, content: impl Into<String>) -> Option<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return None;
        }
        Some(Self { role, content })
    }

    pub fn user(content: impl Into<String>) -> Option<Self> {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Option<Self> {
        Self::new(ChatRole::Assistant, content)
    }
}
