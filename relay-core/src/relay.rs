// relay-core/src/relay.rs

//! The request flow that ties settings, history, the resilient client and
//! the artifact pipeline together. Front-ends call into [`RelayService`] and
//! only turn its outcomes into text.

use crate::artifacts::{
    ArtifactBundle, ArtifactWriter, ExtractionError, NormalizationReport, WrittenArtifactBundle,
    build_task_message, extract_with_report, is_artifact_request,
};
use crate::catalog::ModelCatalog;
use crate::client::ResilientChatClient;
use crate::config::RelayConfig;
use crate::errors::{RelayError, Result};
use crate::models::catalog::{ModelDescriptor, PowerTier};
use crate::models::chat::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::providers::ProviderId;
use crate::store::{ChatHistoryGateway, PendingInput, SettingsGateway, UserSettings};
use crate::utils::{clip_chars, split_into_chunks, take_chars};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const MAX_SYSTEM_PROMPT_CHARS: usize = 4_000;
pub const REPLY_CHUNK_CHARS: usize = 3_900;
pub const PREVIEW_CHARS: usize = 3_500;

const CHAT_REPLY_TITLE: &str = "ai-response";
const BUILD_REPLY_TITLE: &str = "build-response";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyLimits {
    pub large_reply_threshold: usize,
    pub history_clip_chars: usize,
}

impl ReplyLimits {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            large_reply_threshold: config.large_reply_threshold,
            history_clip_chars: config.history_clip_chars,
        }
    }
}

/// The model a request will actually be sent to.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveModel {
    pub settings: UserSettings,
    pub provider: ProviderId,
    pub model_id: String,
    /// The stored selection was missing from the catalog and was replaced.
    pub fell_back: bool,
}

/// How a reply reaches the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Inline {
        chunks: Vec<String>,
    },
    SavedToFile {
        filename: String,
        path: PathBuf,
        preview: String,
    },
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub response: ChatCompletionResponse,
    pub delivery: Delivery,
}

#[derive(Debug)]
pub enum BuildOutcome {
    Materialized {
        response: ChatCompletionResponse,
        bundle: ArtifactBundle,
        written: WrittenArtifactBundle,
        report: NormalizationReport,
    },
    /// No bundle could be recovered; the raw reply was delivered instead.
    RawFallback {
        response: ChatCompletionResponse,
        reason: ExtractionError,
        delivery: Delivery,
    },
}

#[derive(Debug)]
pub enum TextOutcome {
    SystemPromptSaved,
    Built(BuildOutcome),
    /// The text looks like a code request; the owner should use the build command.
    SuggestBuild,
    Chatted(ChatOutcome),
}

pub struct RelayService {
    client: ResilientChatClient,
    catalog: Arc<ModelCatalog>,
    settings: Arc<dyn SettingsGateway>,
    history: Arc<dyn ChatHistoryGateway>,
    writer: ArtifactWriter,
    limits: ReplyLimits,
}

impl RelayService {
    pub fn new(
        client: ResilientChatClient,
        catalog: Arc<ModelCatalog>,
        settings: Arc<dyn SettingsGateway>,
        history: Arc<dyn ChatHistoryGateway>,
        writer: ArtifactWriter,
        limits: ReplyLimits,
    ) -> Self {
        Self {
            client,
            catalog,
            settings,
            history,
            writer,
            limits,
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    pub async fn settings(&self, owner_id: &str) -> Result<UserSettings> {
        self.settings.get_by_owner(owner_id).await
    }

    /// The owner's selection if the catalog still has it, otherwise the
    /// catalog default for the owner's provider and tier (persisted).
    pub async fn resolve_active_model(&self, owner_id: &str) -> Result<ActiveModel> {
        let settings = self.settings.get_by_owner(owner_id).await?;
        if self
            .catalog
            .contains(settings.selected_provider, &settings.selected_model)
        {
            return Ok(ActiveModel {
                provider: settings.selected_provider,
                model_id: settings.selected_model.clone(),
                settings,
                fell_back: false,
            });
        }

        let Some(fallback) = self
            .catalog
            .default_model(settings.selected_provider, settings.selected_power_tier)
        else {
            return Err(RelayError::NoAvailableModel {
                provider: settings.selected_provider,
                power_tier: settings.selected_power_tier,
            });
        };

        warn!(
            owner = owner_id,
            stored_model = %settings.selected_model,
            fallback_model = %fallback.model_id,
            "Selected model is not in the catalog, falling back to the default."
        );
        self.settings
            .set_selected_model(owner_id, fallback.provider, &fallback.model_id)
            .await?;
        Ok(ActiveModel {
            provider: fallback.provider,
            model_id: fallback.model_id.clone(),
            settings,
            fell_back: true,
        })
    }

    /// Routes a plain message according to the owner's pending input.
    pub async fn handle_text(&self, owner_id: &str, text: &str) -> Result<TextOutcome> {
        let settings = self.settings.get_by_owner(owner_id).await?;
        match settings.pending_input {
            Some(PendingInput::SystemPrompt) => {
                self.set_system_prompt(owner_id, text).await?;
                self.settings.set_pending_input(owner_id, None).await?;
                Ok(TextOutcome::SystemPromptSaved)
            }
            Some(PendingInput::BuildRequest) => {
                self.settings.set_pending_input(owner_id, None).await?;
                self.build(owner_id, text).await.map(TextOutcome::Built)
            }
            None if is_artifact_request(text) => Ok(TextOutcome::SuggestBuild),
            None => self.chat(owner_id, text).await.map(TextOutcome::Chatted),
        }
    }

    pub async fn chat(&self, owner_id: &str, text: &str) -> Result<ChatOutcome> {
        let active = self.resolve_active_model(owner_id).await?;
        let messages = self
            .compose_messages(owner_id, &active.settings, ChatMessage::user(text))
            .await?;
        let response = self
            .client
            .chat(ChatCompletionRequest::new(active.provider, active.model_id, messages))
            .await?;

        self.remember_exchange(owner_id, text, &response.content).await?;
        let delivery = self.deliver(owner_id, CHAT_REPLY_TITLE, &response.content)?;
        Ok(ChatOutcome { response, delivery })
    }

    pub async fn build(&self, owner_id: &str, request: &str) -> Result<BuildOutcome> {
        let request = request.trim();
        if request.is_empty() {
            return Err(RelayError::validation("Build request is empty."));
        }

        let active = self.resolve_active_model(owner_id).await?;
        let messages = self
            .compose_messages(owner_id, &active.settings, build_task_message(request))
            .await?;
        let response = self
            .client
            .chat(ChatCompletionRequest::new(active.provider, active.model_id, messages))
            .await?;

        match extract_with_report(&response.content) {
            Ok((bundle, report)) => {
                let written = self.writer.write_bundle(owner_id, &bundle).inspect_err(|e| {
                    if matches!(e, RelayError::InvalidOutputPath(_)) {
                        error!(owner = owner_id, error = %e, "Refused to materialize artifact bundle.");
                    }
                })?;
                self.remember_exchange(owner_id, request, &bundle.summary).await?;
                Ok(BuildOutcome::Materialized {
                    response,
                    bundle,
                    written,
                    report,
                })
            }
            Err(reason) => {
                warn!(
                    owner = owner_id,
                    error = %reason,
                    "Could not extract artifacts, delivering the raw reply."
                );
                self.remember_exchange(owner_id, request, &response.content).await?;
                let delivery = self.deliver(owner_id, BUILD_REPLY_TITLE, &response.content)?;
                Ok(BuildOutcome::RawFallback {
                    response,
                    reason,
                    delivery,
                })
            }
        }
    }

    /// Selects a catalog model and adopts its power tier.
    pub async fn select_model(&self, owner_id: &str, provider: ProviderId, model_id: &str) -> Result<ModelDescriptor> {
        let model = self.catalog.model(provider, model_id).ok_or_else(|| {
            RelayError::validation(format!("Model '{}' is not in the {} catalog.", model_id, provider))
        })?;
        self.settings
            .set_selected_model(owner_id, model.provider, &model.model_id)
            .await?;
        self.settings.set_power_tier(owner_id, model.power_tier).await?;
        info!(owner = owner_id, provider = %provider, model = %model_id, "Selected model.");
        Ok(model.clone())
    }

    /// Stores the tier and switches to that tier's default model on the
    /// current provider. Returns the newly selected model, if any.
    pub async fn select_power_tier(&self, owner_id: &str, power_tier: PowerTier) -> Result<Option<ModelDescriptor>> {
        self.settings.set_power_tier(owner_id, power_tier).await?;
        let settings = self.settings.get_by_owner(owner_id).await?;
        let Some(model) = self
            .catalog
            .default_model(settings.selected_provider, power_tier)
        else {
            return Ok(None);
        };
        self.settings
            .set_selected_model(owner_id, model.provider, &model.model_id)
            .await?;
        info!(owner = owner_id, tier = %power_tier, model = %model.model_id, "Selected power tier.");
        Ok(Some(model.clone()))
    }

    pub async fn set_system_prompt(&self, owner_id: &str, prompt: &str) -> Result<()> {
        let prompt = prompt.trim();
        let length = prompt.chars().count();
        if length > MAX_SYSTEM_PROMPT_CHARS {
            return Err(RelayError::validation(format!(
                "System prompt is too long ({} chars). Max length is {} characters.",
                length, MAX_SYSTEM_PROMPT_CHARS
            )));
        }
        self.settings.set_system_prompt(owner_id, prompt).await
    }

    pub async fn reset_system_prompt(&self, owner_id: &str) -> Result<()> {
        self.settings.set_system_prompt(owner_id, "").await
    }

    /// Makes the next plain message a system prompt or a build task.
    pub async fn await_input(&self, owner_id: &str, pending: PendingInput) -> Result<()> {
        self.settings.set_pending_input(owner_id, Some(pending)).await
    }

    pub async fn cancel_pending_input(&self, owner_id: &str) -> Result<()> {
        self.settings.set_pending_input(owner_id, None).await
    }

    pub async fn clear_history(&self, owner_id: &str) -> Result<()> {
        self.history.clear(owner_id).await
    }

    /// Healthcheck result per provider, in [`ProviderId::ALL`] order.
    pub async fn health(&self) -> Vec<(ProviderId, bool)> {
        let mut results = Vec::with_capacity(ProviderId::ALL.len());
        for id in ProviderId::ALL {
            let healthy = match self.client.router().get(id) {
                Ok(adapter) => adapter.healthcheck().await,
                Err(_) => false,
            };
            results.push((id, healthy));
        }
        results
    }

    async fn compose_messages(
        &self,
        owner_id: &str,
        settings: &UserSettings,
        last: ChatMessage,
    ) -> Result<Vec<ChatMessage>> {
        let mut messages = Vec::new();
        if let Some(prompt) = settings.system_prompt() {
            messages.push(ChatMessage::system(prompt));
        }
        messages.extend(self.history.get(owner_id).await?);
        messages.push(last);
        Ok(messages)
    }

    async fn remember_exchange(&self, owner_id: &str, user_text: &str, assistant_text: &str) -> Result<()> {
        self.history.add(owner_id, ChatMessage::user(user_text)).await?;
        self.history
            .add(
                owner_id,
                ChatMessage::assistant(clip_chars(assistant_text, self.limits.history_clip_chars)),
            )
            .await
    }

    fn deliver(&self, owner_id: &str, title: &str, text: &str) -> Result<Delivery> {
        if text.chars().count() <= self.limits.large_reply_threshold {
            return Ok(Delivery::Inline {
                chunks: split_into_chunks(text, REPLY_CHUNK_CHARS),
            });
        }
        let filename = format!("{}-{}.txt", title, Utc::now().format("%Y%m%d%H%M%S"));
        let path = self.writer.write_large_text(owner_id, &filename, text)?;
        Ok(Delivery::SavedToFile {
            filename,
            path,
            preview: take_chars(text, PREVIEW_CHARS).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog;
    use crate::config::DefaultModelConfig;
    use crate::models::chat::Role;
    use crate::providers::ProviderRouter;
    use crate::providers::mock::{Received, ScriptedAdapter};
    use crate::store::{InMemoryChatHistoryStore, InMemorySettingsStore};
    use std::fs;
    use tempfile::TempDir;

    struct Harness {
        service: RelayService,
        openrouter: Received,
        groq: Received,
        _temp: TempDir,
    }

    fn harness(openrouter: Vec<Result<String>>, groq: Vec<Result<String>>, limits: ReplyLimits) -> Harness {
        let temp = tempfile::tempdir().unwrap();
        let openrouter_adapter = ScriptedAdapter::new(ProviderId::OpenRouter, openrouter);
        let groq_adapter = ScriptedAdapter::new(ProviderId::Groq, groq);
        let openrouter_received = openrouter_adapter.received.clone();
        let groq_received = groq_adapter.received.clone();

        let mut router = ProviderRouter::new();
        router.register(Arc::new(openrouter_adapter));
        router.register(Arc::new(groq_adapter));

        let defaults = DefaultModelConfig {
            provider: ProviderId::OpenRouter,
            model_id: "google/gemma-3n-e4b-it:free".to_string(),
            power_tier: PowerTier::Low,
        };
        let service = RelayService::new(
            ResilientChatClient::new(router),
            Arc::new(sample_catalog()),
            Arc::new(InMemorySettingsStore::new(defaults)),
            Arc::new(InMemoryChatHistoryStore::new(20)),
            ArtifactWriter::new(temp.path()).unwrap(),
            limits,
        );
        Harness {
            service,
            openrouter: openrouter_received,
            groq: groq_received,
            _temp: temp,
        }
    }

    fn limits() -> ReplyLimits {
        ReplyLimits {
            large_reply_threshold: 12_000,
            history_clip_chars: 2_000,
        }
    }

    #[tokio::test]
    async fn test_chat_sends_prompt_history_and_text() {
        let h = harness(vec![Ok("first".to_string()), Ok("second".to_string())], vec![], limits());
        h.service.set_system_prompt("1", "  Be terse.  ").await.unwrap();

        let outcome = h.service.chat("1", "Hi").await.unwrap();
        assert_eq!(
            outcome.delivery,
            Delivery::Inline {
                chunks: vec!["first".to_string()]
            }
        );
        h.service.chat("1", "Again").await.unwrap();

        let received = h.openrouter.lock().unwrap().clone();
        assert_eq!(received[0].model, "google/gemma-3n-e4b-it:free");
        let second = &received[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[0], ChatMessage::system("Be terse."));
        assert_eq!(second[1], ChatMessage::user("Hi"));
        assert_eq!(second[2], ChatMessage::assistant("first"));
        assert_eq!(second[3], ChatMessage::user("Again"));
    }

    #[tokio::test]
    async fn test_resolve_active_model_falls_back_and_persists() {
        let h = harness(vec![], vec![], limits());
        h.service
            .settings
            .set_selected_model("1", ProviderId::Groq, "retired-model")
            .await
            .unwrap();
        h.service.settings.set_power_tier("1", PowerTier::High).await.unwrap();

        let active = h.service.resolve_active_model("1").await.unwrap();
        assert!(active.fell_back);
        assert_eq!(active.provider, ProviderId::Groq);
        assert_eq!(active.model_id, "llama-3.3-70b");

        let stored = h.service.settings("1").await.unwrap();
        assert_eq!(stored.selected_model, "llama-3.3-70b");
        assert!(!h.service.resolve_active_model("1").await.unwrap().fell_back);
    }

    #[tokio::test]
    async fn test_resolve_active_model_without_catalog_entries_fails() {
        let temp = tempfile::tempdir().unwrap();
        let defaults = DefaultModelConfig {
            provider: ProviderId::Groq,
            model_id: "missing".to_string(),
            power_tier: PowerTier::Low,
        };
        let service = RelayService::new(
            ResilientChatClient::new(ProviderRouter::new()),
            Arc::new(ModelCatalog::default()),
            Arc::new(InMemorySettingsStore::new(defaults)),
            Arc::new(InMemoryChatHistoryStore::new(20)),
            ArtifactWriter::new(temp.path()).unwrap(),
            limits(),
        );
        let err = service.resolve_active_model("1").await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::NoAvailableModel {
                provider: ProviderId::Groq,
                power_tier: PowerTier::Low
            }
        ));
    }

    #[tokio::test]
    async fn test_history_is_clipped() {
        let reply = "a".repeat(50);
        let h = harness(
            vec![Ok(reply)],
            vec![],
            ReplyLimits {
                large_reply_threshold: 12_000,
                history_clip_chars: 10,
            },
        );
        h.service.chat("1", "Hi").await.unwrap();
        let history = h.service.history.get("1").await.unwrap();
        assert_eq!(history[1].content, format!("{}\n...[truncated]", "a".repeat(10)));
    }

    #[tokio::test]
    async fn test_large_reply_is_saved_to_file() {
        let reply = "x".repeat(120);
        let h = harness(
            vec![Ok(reply.clone())],
            vec![],
            ReplyLimits {
                large_reply_threshold: 100,
                history_clip_chars: 2_000,
            },
        );
        let outcome = h.service.chat("7", "long please").await.unwrap();
        match outcome.delivery {
            Delivery::SavedToFile { filename, path, preview } => {
                assert!(filename.starts_with("ai-response-"));
                assert!(filename.ends_with(".txt"));
                assert_eq!(filename.len(), "ai-response-".len() + 14 + ".txt".len());
                assert!(path.ends_with(format!("7/responses/{}", filename)));
                assert_eq!(fs::read_to_string(&path).unwrap(), reply);
                assert_eq!(preview, reply);
            }
            other => panic!("expected file delivery, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_build_materializes_bundle() {
        let reply = r#"```json
{"summary":"Лендинг готов","files":[{"path":"../index.html","content":"<h1>Pizza</h1>"}],"runInstructions":["open index.html"]}
```"#;
        let h = harness(vec![Ok(reply.to_string())], vec![], limits());
        let outcome = h.service.build("3", "landing for a pizzeria").await.unwrap();

        match outcome {
            BuildOutcome::Materialized { bundle, written, .. } => {
                assert_eq!(bundle.summary, "Лендинг готов");
                assert_eq!(written.files[0].relative_path, "index.html");
                assert_eq!(fs::read_to_string(&written.files[0].absolute_path).unwrap(), "<h1>Pizza</h1>");
            }
            other => panic!("expected materialized bundle, got {:?}", other),
        }

        let task = h.openrouter.lock().unwrap()[0].messages.last().cloned().unwrap();
        assert_eq!(task.role, Role::User);
        assert!(task.content.ends_with("\n\nUSER TASK:\nlanding for a pizzeria"));

        let history = h.service.history.get("3").await.unwrap();
        assert_eq!(history[0], ChatMessage::user("landing for a pizzeria"));
        assert_eq!(history[1], ChatMessage::assistant("Лендинг готов"));
    }

    #[tokio::test]
    async fn test_build_falls_back_to_raw_reply() {
        let h = harness(vec![Ok("Sorry, I can only describe it.".to_string())], vec![], limits());
        let outcome = h.service.build("3", "make a site").await.unwrap();
        match outcome {
            BuildOutcome::RawFallback { reason, delivery, .. } => {
                assert_eq!(reason, ExtractionError::NoJsonObject);
                assert_eq!(
                    delivery,
                    Delivery::Inline {
                        chunks: vec!["Sorry, I can only describe it.".to_string()]
                    }
                );
            }
            other => panic!("expected raw fallback, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handle_text_routes_pending_input() {
        let h = harness(
            vec![Ok(r#"{"files":[{"path":"a.py","content":"print(1)"}]}"#.to_string())],
            vec![],
            limits(),
        );

        h.service.await_input("1", PendingInput::SystemPrompt).await.unwrap();
        let outcome = h.service.handle_text("1", "Answer in English").await.unwrap();
        assert!(matches!(outcome, TextOutcome::SystemPromptSaved));
        let settings = h.service.settings("1").await.unwrap();
        assert_eq!(settings.system_prompt(), Some("Answer in English"));
        assert!(settings.pending_input.is_none());

        let outcome = h.service.handle_text("1", "write code for a script.py").await.unwrap();
        assert!(matches!(outcome, TextOutcome::SuggestBuild));

        h.service.await_input("1", PendingInput::BuildRequest).await.unwrap();
        let outcome = h.service.handle_text("1", "a tiny script").await.unwrap();
        assert!(matches!(outcome, TextOutcome::Built(BuildOutcome::Materialized { .. })));
        assert!(h.service.settings("1").await.unwrap().pending_input.is_none());
    }

    #[tokio::test]
    async fn test_system_prompt_length_is_validated() {
        let h = harness(vec![], vec![], limits());
        let long = "я".repeat(MAX_SYSTEM_PROMPT_CHARS + 1);
        let err = h.service.set_system_prompt("1", &long).await.unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));

        let exact = "я".repeat(MAX_SYSTEM_PROMPT_CHARS);
        h.service.set_system_prompt("1", &exact).await.unwrap();
        h.service.reset_system_prompt("1").await.unwrap();
        assert!(h.service.settings("1").await.unwrap().system_prompt().is_none());
    }

    #[tokio::test]
    async fn test_model_and_tier_selection() {
        let h = harness(vec![], vec![Ok("from groq".to_string())], limits());

        let model = h.service.select_model("1", ProviderId::Groq, "llama-3.3-70b").await.unwrap();
        assert_eq!(model.power_tier, PowerTier::High);
        let settings = h.service.settings("1").await.unwrap();
        assert_eq!(settings.selected_power_tier, PowerTier::High);

        let err = h.service.select_model("1", ProviderId::Groq, "nope").await.unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));

        let reselected = h.service.select_power_tier("1", PowerTier::Low).await.unwrap().unwrap();
        assert_eq!(reselected.model_id, "llama-3.1-8b");

        h.service.chat("1", "hello").await.unwrap();
        assert_eq!(h.groq.lock().unwrap()[0].model, "llama-3.1-8b");
        assert!(h.openrouter.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_errors_leave_history_untouched() {
        let h = harness(
            vec![Err(RelayError::ProviderEmptyResponse {
                provider: ProviderId::OpenRouter,
            })],
            vec![],
            limits(),
        );
        assert!(h.service.chat("1", "Hi").await.is_err());
        assert!(h.service.history.get("1").await.unwrap().is_empty());

        h.service.clear_history("1").await.unwrap();
    }

    #[tokio::test]
    async fn test_health_reports_each_provider() {
        let h = harness(vec![], vec![], limits());
        assert_eq!(
            h.service.health().await,
            vec![(ProviderId::OpenRouter, true), (ProviderId::Groq, true)]
        );
    }
}
