// relay-core/src/lib.rs

#![doc = include_str!("../../README.md")]

pub mod artifacts;
pub mod catalog;
pub mod client;
pub mod config;
pub mod errors;
pub mod providers;
pub mod ranking;
pub mod relay;
pub mod render;
pub mod store;
pub mod utils;

pub mod models {
    pub mod catalog;
    pub mod chat;
}

pub use artifacts::{ArtifactBundle, ArtifactWriter, ExtractionError, GeneratedArtifactFile};
pub use catalog::ModelCatalog;
pub use client::ResilientChatClient;
pub use config::RelayConfig;
pub use errors::{RelayError, Result};
pub use models::catalog::{ModelDescriptor, ModelMetric, ModelStars, PowerTier, ProviderFilter};
pub use models::chat::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Role};
pub use providers::{OpenAiCompatibleAdapter, ProviderAdapter, ProviderId, ProviderRouter};
pub use ranking::{DEFAULT_RANK_LIMIT, ModelRanker, RankQuery, Ranking};
pub use relay::{BuildOutcome, ChatOutcome, Delivery, RelayService, ReplyLimits, TextOutcome};
pub use store::{
    ChatHistoryGateway, InMemoryChatHistoryStore, InMemorySettingsStore, PendingInput, SettingsGateway,
    UserSettings,
};

pub use async_trait::async_trait;
