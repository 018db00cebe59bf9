//! Jarvis - voice-activated conversational front-end
//!
//! Listens continuously for a wake word, captures the spoken command that
//! follows, sends it with the conversation history to a remote chat endpoint
//! and speaks the reply.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  finals   ┌───────────────┐  command  ┌────────────────┐
//! │ SpeechCapture├──────────►│ Orchestrator  ├──────────►│ ResponseClient │
//! │ (mic + STT)  │           │ idle→listen→  │◄──────────┤  (HTTP POST)   │
//! └──────────────┘  typed ──►│ process→resp. │   reply   └────────────────┘
//!                            └──┬─────────┬──┘
//!                       persist │         │ speak
//!                        ┌──────▼──┐  ┌───▼──────────────────────┐
//!                        │  Store  │  │ SpeechOutput             │
//!                        │ (SQLite)│  │ ElevenLabs → espeak-ng   │
//!                        └─────────┘  └──────────────────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod state;
pub mod store;
pub mod voice;

pub use chat::{APOLOGY, NO_REPLY, ResponseClient};
pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, OrchestratorHandle};
pub use state::{ChatMessage, ChatRole, InteractionState, LogCategory, LogEntry};
pub use store::Store;
