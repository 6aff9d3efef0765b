// relay-core/src/models/chat.rs
use crate::providers::ProviderId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        f.write_str(name)
    }
}

/// One message of a conversation. Order within a conversation is significant,
/// most recent last.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single chat-completion call, handed to a [`crate::providers::ProviderAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletionRequest {
    pub provider: ProviderId,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatCompletionRequest {
    pub fn new(provider: ProviderId, model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            provider,
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn has_system_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::System)
    }
}

/// Token accounting as reported by the backend. Every field is optional
/// because not every OpenAI-compatible service reports all of them.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// A successful completion. `content` is trimmed and never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletionResponse {
    pub content: String,
    pub model: String,
    pub provider: ProviderId,
    pub usage: Option<Usage>,
    pub latency_ms: u64,
}
