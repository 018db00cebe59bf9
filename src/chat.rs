//! Remote chat client
//!
//! Sends the spoken command plus conversation history to the chat endpoint
//! and normalizes whatever reply shape comes back. Failures never escape:
//! callers always get a string to speak.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

use crate::config::ChatConfig;
use crate::state::{ChatMessage, ChatRole};
use crate::{Error, Result};

/// Spoken when the endpoint cannot be reached or answers with an error
pub const APOLOGY: &str = "Desculpe, não consegui contactar o servidor. Verifique a conexão.";

/// Spoken when the endpoint answers but no reply text can be found
pub const NO_REPLY: &str = "Sem resposta do servidor.";

/// Reply extraction rules, tried in order
///
/// Each rule is a JSON pointer into the response body; the first one that
/// resolves to a non-empty string wins.
pub const REPLY_POINTERS: [&str; 4] = [
    "/choices/0/message/content",
    "/response",
    "/message",
    "/text",
];

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<WireMessage<'a>>,
    model: &'a str,
    max_tokens: u32,
    session: &'a str,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Client for the remote chat endpoint
pub struct ResponseClient {
    client: reqwest::Client,
    url: String,
    token: Option<SecretString>,
    session_id: String,
    model: String,
    max_tokens: u32,
}

impl ResponseClient {
    /// Create a client from the chat configuration
    #[must_use]
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            token: config
                .token
                .as_ref()
                .map(|t| SecretString::from(t.expose_secret().to_owned())),
            session_id: config.session_id.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }
    }

    /// Send a command with its history and return the text to speak
    ///
    /// Never fails: any network, status, or parse error becomes [`APOLOGY`].
    pub async fn send(&self, command: &str, history: &[ChatMessage]) -> String {
        match self.try_send(command, history).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, url = %self.url, "chat request failed");
                APOLOGY.to_string()
            }
        }
    }

    async fn try_send(&self, command: &str, history: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            messages: build_messages(command, history),
            model: &self.model,
            max_tokens: self.max_tokens,
            session: &self.session_id,
        };

        tracing::debug!(
            messages = request.messages.len(),
            model = %self.model,
            "sending chat request"
        );

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Chat(format!("chat endpoint error {status}: {body}")));
        }

        let body: Value = response.json().await?;
        let reply = extract_reply(&body).unwrap_or_else(|| {
            tracing::warn!("chat response carried no recognised reply field");
            NO_REPLY.to_string()
        });

        tracing::info!(reply_len = reply.len(), "chat reply received");
        Ok(reply)
    }
}

/// History with blank messages removed, followed by the new user message
fn build_messages<'a>(command: &'a str, history: &'a [ChatMessage]) -> Vec<WireMessage<'a>> {
    history
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| WireMessage {
            role: m.role.as_str(),
            content: &m.content,
        })
        .chain(
            (!command.trim().is_empty()).then_some(WireMessage {
                role: ChatRole::User.as_str(),
                content: command,
            }),
        )
        .collect()
}

/// Apply [`REPLY_POINTERS`] to a response body
#[must_use]
pub fn extract_reply(body: &Value) -> Option<String> {
    REPLY_POINTERS
        .iter()
        .filter_map(|pointer| body.pointer(pointer))
        .filter_map(Value::as_str)
        .find(|text| !text.trim().is_empty())
        .map(ToString::to_string)
}
