// relay-core/src/providers/mod.rs
use crate::config::RelayConfig;
use crate::errors::{RelayError, Result};
use crate::models::chat::{ChatCompletionRequest, ChatCompletionResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

pub mod openai;

pub use openai::OpenAiCompatibleAdapter;

/// The closed set of backends the relay knows how to talk to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenRouter,
    Groq,
}

impl ProviderId {
    /// Catalog and listing order.
    pub const ALL: [ProviderId; 2] = [ProviderId::OpenRouter, ProviderId::Groq];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenRouter => "openrouter",
            ProviderId::Groq => "groq",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderId::OpenRouter => "OpenRouter",
            ProviderId::Groq => "Groq",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderId::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderId::Groq => "https://api.groq.com/openai/v1",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ProviderId::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown provider '{}'. Expected one of openrouter, groq", s))
    }
}

/// Uniform interface over one backend's chat-completions endpoint.
///
/// Implementations perform exactly one outbound call per [`chat`](Self::chat)
/// invocation and never retry internally.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    async fn chat(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse>;

    async fn healthcheck(&self) -> bool;
}

/// Maps a provider identifier to its adapter.
#[derive(Default, Clone)]
pub struct ProviderRouter {
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        debug!(provider = %adapter.id(), "Registering provider adapter");
        self.adapters.insert(adapter.id(), adapter);
    }

    /// Builds one OpenAI-compatible adapter per configured provider.
    /// `lookup_key` resolves the configured env var name to its value.
    pub fn from_config<F>(config: &RelayConfig, http_client: Client, lookup_key: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut router = Self::new();
        for (id, provider_config) in config.providers() {
            let api_key = lookup_key(&provider_config.api_key_env_var)
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| {
                    RelayError::config(format!(
                        "Missing required environment variable: {}",
                        provider_config.api_key_env_var
                    ))
                })?;
            let adapter = OpenAiCompatibleAdapter::new(
                *id,
                provider_config.base_url(*id),
                api_key,
                http_client.clone(),
            )
            .with_timeout_ms(provider_config.timeout_ms)
            .with_extra_headers(provider_config.extra_headers.clone());
            router.register(Arc::new(adapter));
        }
        router.ensure_complete()?;
        Ok(router)
    }

    /// Fails unless every known provider has an adapter.
    pub fn ensure_complete(&self) -> Result<()> {
        match ProviderId::ALL.into_iter().find(|id| !self.adapters.contains_key(id)) {
            Some(missing) => Err(RelayError::UnknownProvider(missing.to_string())),
            None => Ok(()),
        }
    }

    pub fn get(&self, id: ProviderId) -> Result<&dyn ProviderAdapter> {
        self.adapters
            .get(&id)
            .map(|a| a.as_ref())
            .ok_or_else(|| RelayError::UnknownProvider(id.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod mock;
