// relay-core/src/client.rs

//! One logical chat call with a single role-compatibility retry.
//!
//! Some backends reject any request that carries a `system` message. When a
//! failure looks like such a rejection, the system instructions are folded
//! into the first user message and the call is repeated exactly once. Every
//! other failure (HTTP errors, timeouts, empty completions) surfaces as is.

use crate::config::RelayConfig;
use crate::errors::{RelayError, Result};
use crate::models::chat::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Role};
use crate::providers::{ProviderId, ProviderRouter};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Heading of the folded instruction block.
const FOLDED_HEADER: &str = "IMPORTANT INSTRUCTIONS (from system prompt):";
/// Trailer that tells the model how to weigh the folded block.
const FOLDED_TRAILER: &str = "Follow them as high-priority constraints.";

/// Heuristic table of error text that means "this backend does not accept
/// system-role messages". Matching is a case-insensitive substring test on
/// the error's display text, so it depends on each backend's wording and new
/// backends may need new entries (see `system_role_markers` in the config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRoleMarkers {
    /// Any one of these phrases is enough.
    phrases: Vec<String>,
    /// Every word of at least one group must appear.
    co_occurrences: Vec<Vec<String>>,
}

impl Default for SystemRoleMarkers {
    fn default() -> Self {
        Self {
            phrases: vec![
                "developer instruction is not enabled".to_string(),
                "system instruction is not enabled".to_string(),
            ],
            co_occurrences: vec![vec!["role".to_string(), "system".to_string()]],
        }
    }
}

impl SystemRoleMarkers {
    pub fn with_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.phrases
            .extend(phrases.into_iter().map(|p| p.into().to_lowercase()));
        self
    }

    pub fn matches(&self, error_text: &str) -> bool {
        let normalized = error_text.to_lowercase();
        self.phrases.iter().any(|p| normalized.contains(p.as_str()))
            || self
                .co_occurrences
                .iter()
                .any(|group| group.iter().all(|word| normalized.contains(word.as_str())))
    }
}

/// Progress of one logical call. Only `Initial` may transition to
/// `RetriedWithoutSystemRole`, which caps the retries at one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Initial,
    RetriedWithoutSystemRole,
}

/// Rewrites a conversation so it carries no system-role messages.
///
/// All non-blank system contents are joined into one block that is
/// prepended to the first user message. If the conversation does not open
/// with a user message, the block becomes a new leading user message.
pub fn fold_system_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let system_contents: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty())
        .collect();
    let mut rest: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();

    if system_contents.is_empty() {
        return rest;
    }

    let block = format!(
        "{}\n{}\n\n{}",
        FOLDED_HEADER,
        system_contents.join("\n\n"),
        FOLDED_TRAILER
    );

    match rest.first_mut() {
        Some(first) if first.role == Role::User => {
            first.content = format!("{}\n\n{}", block, first.content);
            rest
        }
        _ => {
            rest.insert(0, ChatMessage::user(block));
            rest
        }
    }
}

pub struct ResilientChatClient {
    router: ProviderRouter,
    default_markers: SystemRoleMarkers,
    provider_markers: HashMap<ProviderId, SystemRoleMarkers>,
}

impl ResilientChatClient {
    pub fn new(router: ProviderRouter) -> Self {
        Self {
            router,
            default_markers: SystemRoleMarkers::default(),
            provider_markers: HashMap::new(),
        }
    }

    /// Uses the default marker table extended with each provider's configured phrases.
    pub fn from_config(router: ProviderRouter, config: &RelayConfig) -> Self {
        let mut client = Self::new(router);
        for (id, provider) in config.providers() {
            if !provider.system_role_markers.is_empty() {
                let markers = SystemRoleMarkers::default()
                    .with_phrases(provider.system_role_markers.iter().cloned());
                client = client.with_markers(*id, markers);
            }
        }
        client
    }

    pub fn with_markers(mut self, provider: ProviderId, markers: SystemRoleMarkers) -> Self {
        self.provider_markers.insert(provider, markers);
        self
    }

    pub fn router(&self) -> &ProviderRouter {
        &self.router
    }

    fn markers_for(&self, provider: ProviderId) -> &SystemRoleMarkers {
        self.provider_markers
            .get(&provider)
            .unwrap_or(&self.default_markers)
    }

    pub async fn chat(&self, request: ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let adapter = self.router.get(request.provider)?;
        let mut state = CallState::Initial;
        let mut current = request;

        loop {
            let error = match adapter.chat(&current).await {
                Ok(response) => {
                    debug!(state = ?state, "Chat call succeeded.");
                    return Ok(response);
                }
                Err(e) => e,
            };

            state = match state {
                CallState::Initial if self.is_system_role_rejection(&current, &error) => {
                    warn!(
                        provider = %current.provider,
                        model = %current.model,
                        error = %error,
                        "Backend rejected system-role messages; retrying once with instructions folded into the user message."
                    );
                    current.messages = fold_system_messages(&current.messages);
                    CallState::RetriedWithoutSystemRole
                }
                _ => return Err(error),
            };
        }
    }

    fn is_system_role_rejection(&self, request: &ChatCompletionRequest, error: &RelayError) -> bool {
        request.has_system_message()
            && self
                .markers_for(request.provider)
                .matches(&error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{Received, ScriptedAdapter};
    use std::sync::Arc;

    fn rejection() -> RelayError {
        RelayError::ProviderHttp {
            provider: ProviderId::OpenRouter,
            status: 400,
            body: r#"{"error":"Developer instruction is not enabled for models/gemma"}"#.to_string(),
        }
    }

    fn client_with(outcomes: Vec<Result<String>>) -> (ResilientChatClient, Received) {
        let adapter = ScriptedAdapter::new(ProviderId::OpenRouter, outcomes);
        let received = adapter.received.clone();
        let mut router = ProviderRouter::new();
        router.register(Arc::new(adapter));
        router.register(Arc::new(ScriptedAdapter::new(ProviderId::Groq, vec![])));
        (ResilientChatClient::new(router), received)
    }

    fn request(messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest::new(ProviderId::OpenRouter, "gemma", messages)
    }

    #[test]
    fn test_markers() {
        let markers = SystemRoleMarkers::default();
        assert!(markers.matches("Provider groq error 400: System Instruction is not enabled"));
        assert!(markers.matches("invalid role: 'system' is not allowed"));
        assert!(!markers.matches("Provider groq error 429: rate limited"));
        assert!(!markers.matches("system overloaded"));

        let custom = SystemRoleMarkers::default().with_phrases(["No System Prompts Here"]);
        assert!(custom.matches("error: no system prompts here"));
    }

    #[test]
    fn test_fold_into_first_user_message() {
        let folded = fold_system_messages(&[
            ChatMessage::system("Be terse."),
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello"),
            ChatMessage::system("  Answer in English.  "),
            ChatMessage::user("Again"),
        ]);

        assert_eq!(folded.len(), 3);
        assert!(folded.iter().all(|m| m.role != Role::System));
        assert_eq!(
            folded[0].content,
            "IMPORTANT INSTRUCTIONS (from system prompt):\nBe terse.\n\nAnswer in English.\n\nFollow them as high-priority constraints.\n\nHi"
        );
        assert_eq!(folded[1], ChatMessage::assistant("Hello"));
        assert_eq!(folded[2], ChatMessage::user("Again"));
    }

    #[test]
    fn test_fold_inserts_leading_user_message() {
        let folded = fold_system_messages(&[ChatMessage::system("Rules"), ChatMessage::assistant("Hey")]);
        assert_eq!(folded.len(), 2);
        assert_eq!(folded[0].role, Role::User);
        assert!(folded[0].content.contains("Rules"));
        assert_eq!(folded[1], ChatMessage::assistant("Hey"));

        let only_system = fold_system_messages(&[ChatMessage::system("Rules")]);
        assert_eq!(only_system.len(), 1);
        assert_eq!(only_system[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_success_needs_no_retry() {
        let (client, received) = client_with(vec![Ok("fine".to_string())]);
        let response = client
            .chat(request(vec![ChatMessage::system("s"), ChatMessage::user("u")]))
            .await
            .unwrap();
        assert_eq!(response.content, "fine");
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_once_without_system_role() {
        let (client, received) = client_with(vec![Err(rejection()), Ok("folded ok".to_string())]);
        let response = client
            .chat(request(vec![ChatMessage::system("Be terse."), ChatMessage::user("Hi")]))
            .await
            .unwrap();

        assert_eq!(response.content, "folded ok");
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].messages.len(), 2);
        assert_eq!(received[1].messages.len(), 1);
        assert_eq!(received[1].messages[0].role, Role::User);
        assert!(received[1].messages[0].content.contains("Be terse."));
        assert!(received[1].messages[0].content.ends_with("\n\nHi"));
    }

    #[tokio::test]
    async fn test_second_failure_propagates_without_another_retry() {
        let second = RelayError::ProviderHttp {
            provider: ProviderId::OpenRouter,
            status: 400,
            body: "system instruction is not enabled".to_string(),
        };
        let (client, received) = client_with(vec![Err(rejection()), Err(second)]);
        let err = client
            .chat(request(vec![ChatMessage::system("s"), ChatMessage::user("u")]))
            .await
            .unwrap_err();

        assert_eq!(received.lock().unwrap().len(), 2);
        assert!(err.to_string().contains("system instruction is not enabled"));
    }

    #[tokio::test]
    async fn test_no_retry_without_system_message() {
        let (client, received) = client_with(vec![Err(rejection())]);
        let err = client.chat(request(vec![ChatMessage::user("u")])).await.unwrap_err();
        assert!(matches!(err, RelayError::ProviderHttp { status: 400, .. }));
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_retry_for_unrelated_errors() {
        let timeout = RelayError::Timeout {
            provider: ProviderId::OpenRouter,
            timeout_ms: 45_000,
        };
        let (client, received) = client_with(vec![Err(timeout)]);
        let err = client
            .chat(request(vec![ChatMessage::system("s"), ChatMessage::user("u")]))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Timeout { .. }));
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_provider_specific_markers() {
        let custom = RelayError::ProviderHttp {
            provider: ProviderId::OpenRouter,
            status: 422,
            body: "instructions channel unavailable".to_string(),
        };
        let (client, received) = client_with(vec![Err(custom), Ok("ok".to_string())]);
        let client = client.with_markers(
            ProviderId::OpenRouter,
            SystemRoleMarkers::default().with_phrases(["instructions channel unavailable"]),
        );
        let response = client
            .chat(request(vec![ChatMessage::system("s"), ChatMessage::user("u")]))
            .await
            .unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(received.lock().unwrap().len(), 2);
    }
}
