// relay-core/src/store.rs

//! Per-owner settings and chat history.
//!
//! Both stores sit behind traits so a persistent backend can replace the
//! in-memory ones without touching the request flow.

use crate::config::DefaultModelConfig;
use crate::errors::Result;
use crate::models::catalog::PowerTier;
use crate::models::chat::ChatMessage;
use crate::providers::ProviderId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// What the next plain message from the owner should be treated as.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PendingInput {
    SystemPrompt,
    BuildRequest,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub owner_id: String,
    pub selected_provider: ProviderId,
    pub selected_model: String,
    pub selected_power_tier: PowerTier,
    /// Empty when no system prompt is set.
    pub system_prompt: String,
    pub pending_input: Option<PendingInput>,
    pub updated_at: DateTime<Utc>,
}

impl UserSettings {
    pub fn new(owner_id: impl Into<String>, defaults: &DefaultModelConfig) -> Self {
        Self {
            owner_id: owner_id.into(),
            selected_provider: defaults.provider,
            selected_model: defaults.model_id.clone(),
            selected_power_tier: defaults.power_tier,
            system_prompt: String::new(),
            pending_input: None,
            updated_at: Utc::now(),
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        (!self.system_prompt.is_empty()).then_some(self.system_prompt.as_str())
    }
}

#[async_trait]
pub trait SettingsGateway: Send + Sync {
    /// Returns the owner's settings, creating defaults on first access.
    async fn get_by_owner(&self, owner_id: &str) -> Result<UserSettings>;
    async fn set_selected_model(&self, owner_id: &str, provider: ProviderId, model_id: &str) -> Result<()>;
    async fn set_power_tier(&self, owner_id: &str, power_tier: PowerTier) -> Result<()>;
    async fn set_system_prompt(&self, owner_id: &str, prompt: &str) -> Result<()>;
    async fn set_pending_input(&self, owner_id: &str, pending: Option<PendingInput>) -> Result<()>;
}

#[async_trait]
pub trait ChatHistoryGateway: Send + Sync {
    /// Oldest first.
    async fn get(&self, owner_id: &str) -> Result<Vec<ChatMessage>>;
    async fn add(&self, owner_id: &str, message: ChatMessage) -> Result<()>;
    async fn clear(&self, owner_id: &str) -> Result<()>;
}

pub struct InMemorySettingsStore {
    defaults: DefaultModelConfig,
    by_owner: RwLock<HashMap<String, UserSettings>>,
}

impl InMemorySettingsStore {
    pub fn new(defaults: DefaultModelConfig) -> Self {
        Self {
            defaults,
            by_owner: RwLock::new(HashMap::new()),
        }
    }

    async fn update<F>(&self, owner_id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut UserSettings) + Send,
    {
        let mut by_owner = self.by_owner.write().await;
        let settings = by_owner
            .entry(owner_id.to_string())
            .or_insert_with(|| UserSettings::new(owner_id, &self.defaults));
        apply(settings);
        settings.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl SettingsGateway for InMemorySettingsStore {
    async fn get_by_owner(&self, owner_id: &str) -> Result<UserSettings> {
        if let Some(existing) = self.by_owner.read().await.get(owner_id) {
            return Ok(existing.clone());
        }
        let mut by_owner = self.by_owner.write().await;
        let created = by_owner
            .entry(owner_id.to_string())
            .or_insert_with(|| UserSettings::new(owner_id, &self.defaults));
        Ok(created.clone())
    }

    async fn set_selected_model(&self, owner_id: &str, provider: ProviderId, model_id: &str) -> Result<()> {
        let model_id = model_id.to_string();
        self.update(owner_id, move |s| {
            s.selected_provider = provider;
            s.selected_model = model_id;
        })
        .await
    }

    async fn set_power_tier(&self, owner_id: &str, power_tier: PowerTier) -> Result<()> {
        self.update(owner_id, move |s| s.selected_power_tier = power_tier).await
    }

    async fn set_system_prompt(&self, owner_id: &str, prompt: &str) -> Result<()> {
        let prompt = prompt.to_string();
        self.update(owner_id, move |s| s.system_prompt = prompt).await
    }

    async fn set_pending_input(&self, owner_id: &str, pending: Option<PendingInput>) -> Result<()> {
        self.update(owner_id, move |s| s.pending_input = pending).await
    }
}

/// Keeps the most recent `limit` messages per owner.
pub struct InMemoryChatHistoryStore {
    limit: usize,
    by_owner: RwLock<HashMap<String, VecDeque<ChatMessage>>>,
}

impl InMemoryChatHistoryStore {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            by_owner: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ChatHistoryGateway for InMemoryChatHistoryStore {
    async fn get(&self, owner_id: &str) -> Result<Vec<ChatMessage>> {
        Ok(self
            .by_owner
            .read()
            .await
            .get(owner_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add(&self, owner_id: &str, message: ChatMessage) -> Result<()> {
        let mut by_owner = self.by_owner.write().await;
        let history = by_owner.entry(owner_id.to_string()).or_default();
        history.push_back(message);
        while history.len() > self.limit {
            history.pop_front();
        }
        Ok(())
    }

    async fn clear(&self, owner_id: &str) -> Result<()> {
        self.by_owner.write().await.remove(owner_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> DefaultModelConfig {
        DefaultModelConfig {
            provider: ProviderId::OpenRouter,
            model_id: "google/gemma-3n-e4b-it:free".to_string(),
            power_tier: PowerTier::Low,
        }
    }

    #[tokio::test]
    async fn test_settings_are_seeded_from_defaults() {
        let store = InMemorySettingsStore::new(defaults());
        let settings = store.get_by_owner("1").await.unwrap();
        assert_eq!(settings.owner_id, "1");
        assert_eq!(settings.selected_provider, ProviderId::OpenRouter);
        assert_eq!(settings.selected_model, "google/gemma-3n-e4b-it:free");
        assert_eq!(settings.selected_power_tier, PowerTier::Low);
        assert!(settings.system_prompt().is_none());
        assert!(settings.pending_input.is_none());
    }

    #[tokio::test]
    async fn test_settings_updates_are_per_owner() {
        let store = InMemorySettingsStore::new(defaults());
        store.set_selected_model("1", ProviderId::Groq, "llama-3.3-70b").await.unwrap();
        store.set_power_tier("1", PowerTier::High).await.unwrap();
        store.set_system_prompt("1", "Be terse.").await.unwrap();
        store.set_pending_input("1", Some(PendingInput::BuildRequest)).await.unwrap();

        let first = store.get_by_owner("1").await.unwrap();
        assert_eq!(first.selected_provider, ProviderId::Groq);
        assert_eq!(first.selected_model, "llama-3.3-70b");
        assert_eq!(first.selected_power_tier, PowerTier::High);
        assert_eq!(first.system_prompt(), Some("Be terse."));
        assert_eq!(first.pending_input, Some(PendingInput::BuildRequest));

        let second = store.get_by_owner("2").await.unwrap();
        assert_eq!(second.selected_provider, ProviderId::OpenRouter);
        assert!(second.pending_input.is_none());
    }

    #[tokio::test]
    async fn test_history_keeps_most_recent_messages() {
        let store = InMemoryChatHistoryStore::new(3);
        for i in 0..5 {
            store.add("1", ChatMessage::user(format!("m{}", i))).await.unwrap();
        }
        let history = store.get("1").await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
        assert!(store.get("2").await.unwrap().is_empty());

        store.clear("1").await.unwrap();
        assert!(store.get("1").await.unwrap().is_empty());
    }
}
