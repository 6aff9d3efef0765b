// relay-core/src/catalog.rs

//! Read-only model catalog, loaded once at start-up.

use crate::errors::{RelayError, Result};
use crate::models::catalog::{ModelDescriptor, ModelStars, PowerTier};
use crate::providers::ProviderId;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Deserialize, Debug)]
struct CatalogFile {
    #[serde(default)]
    version: u32,
    providers: BTreeMap<String, ProviderSection>,
}

#[derive(Deserialize, Debug)]
struct ProviderSection {
    #[serde(default)]
    models: Vec<CatalogEntry>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    model_id: String,
    title: String,
    power_tier: PowerTier,
    #[serde(default)]
    tags: Vec<String>,
    stars: ModelStars,
}

/// All known models in catalog order: providers in [`ProviderId::ALL`] order,
/// models in file order within each provider.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    version: u32,
    models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    /// Builds a catalog from descriptors, rejecting duplicate keys and out-of-range stars.
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for model in &models {
            if !seen.insert((model.provider, model.model_id.as_str())) {
                return Err(RelayError::config(format!(
                    "Duplicate model '{}' for provider {}",
                    model.model_id, model.provider
                )));
            }
            if model.stars.values().iter().any(|s| *s > ModelStars::MAX) {
                return Err(RelayError::config(format!(
                    "Model '{}' has a star rating above {}",
                    model.model_id,
                    ModelStars::MAX
                )));
            }
        }
        Ok(Self { version: 0, models })
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(content)
            .map_err(|e| RelayError::config(format!("Failed to parse model catalog: {}", e)))?;

        let mut sections = BTreeMap::new();
        for (key, section) in file.providers {
            let id: ProviderId = key.parse().map_err(RelayError::Config)?;
            sections.insert(id, section);
        }

        let mut models = Vec::new();
        for id in ProviderId::ALL {
            let Some(section) = sections.remove(&id) else {
                continue;
            };
            models.extend(section.models.into_iter().map(|entry| ModelDescriptor {
                provider: id,
                model_id: entry.model_id,
                title: entry.title,
                power_tier: entry.power_tier,
                tags: entry.tags,
                stars: entry.stars,
            }));
        }

        let mut catalog = Self::new(models)?;
        catalog.version = file.version;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| RelayError::io(path, e))?;
        let catalog = Self::from_json_str(&content)?;
        info!(
            path = %path.display(),
            version = catalog.version,
            models = catalog.models.len(),
            "Loaded model catalog."
        );
        Ok(catalog)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn model(&self, provider: ProviderId, model_id: &str) -> Option<&ModelDescriptor> {
        self.models
            .iter()
            .find(|m| m.provider == provider && m.model_id == model_id)
    }

    pub fn contains(&self, provider: ProviderId, model_id: &str) -> bool {
        self.model(provider, model_id).is_some()
    }

    pub fn list(&self, provider: ProviderId, power_tier: Option<PowerTier>) -> Vec<&ModelDescriptor> {
        self.models
            .iter()
            .filter(|m| m.provider == provider)
            .filter(|m| power_tier.is_none_or(|tier| m.power_tier == tier))
            .collect()
    }

    pub fn list_all(&self, power_tier: Option<PowerTier>) -> Vec<&ModelDescriptor> {
        self.models
            .iter()
            .filter(|m| power_tier.is_none_or(|tier| m.power_tier == tier))
            .collect()
    }

    /// Models of `power_tier`, or the whole provider list if that tier is empty.
    pub fn list_preferred(&self, provider: ProviderId, power_tier: PowerTier) -> Vec<&ModelDescriptor> {
        let preferred = self.list(provider, Some(power_tier));
        if preferred.is_empty() {
            self.list(provider, None)
        } else {
            preferred
        }
    }

    /// First model of the tier, else the provider's first model.
    pub fn default_model(&self, provider: ProviderId, power_tier: PowerTier) -> Option<&ModelDescriptor> {
        self.list_preferred(provider, power_tier).into_iter().next()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_CATALOG: &str = r#"{
        "version": 3,
        "providers": {
            "groq": {
                "baseUrl": "https://api.groq.com/openai/v1",
                "models": [
                    { "modelId": "llama-3.3-70b", "title": "Llama 3.3 70B", "powerTier": "High",
                      "tags": ["general"], "stars": { "coding": 4, "reasoning": 4, "multilingual": 3, "speed": 5, "safety": 3 } },
                    { "modelId": "llama-3.1-8b", "title": "Llama 3.1 8B", "powerTier": "Low",
                      "tags": ["fast"], "stars": { "coding": 2, "reasoning": 2, "multilingual": 2, "speed": 5, "safety": 3 } }
                ]
            },
            "openrouter": {
                "models": [
                    { "modelId": "google/gemma-3n-e4b-it:free", "title": "Gemma 3n", "powerTier": "Low",
                      "tags": ["free"], "stars": { "coding": 2, "reasoning": 2, "multilingual": 3, "speed": 4, "safety": 4 } },
                    { "modelId": "deepseek/deepseek-r1", "title": "DeepSeek R1", "powerTier": "eHigh",
                      "tags": ["reasoning"], "stars": { "coding": 5, "reasoning": 5, "multilingual": 4, "speed": 2, "safety": 3 } },
                    { "modelId": "qwen/qwen-2.5-coder-32b", "title": "Qwen 2.5 Coder", "powerTier": "Medium",
                      "tags": ["coding"], "stars": { "coding": 5, "reasoning": 3, "multilingual": 4, "speed": 3, "safety": 3 } }
                ]
            }
        }
    }"#;

    pub(crate) fn sample_catalog() -> ModelCatalog {
        ModelCatalog::from_json_str(SAMPLE_CATALOG).unwrap()
    }

    #[test]
    fn test_load_orders_providers() {
        let catalog = sample_catalog();
        assert_eq!(catalog.version(), 3);
        let all: Vec<&str> = catalog.list_all(None).iter().map(|m| m.model_id.as_str()).collect();
        assert_eq!(
            all,
            vec![
                "google/gemma-3n-e4b-it:free",
                "deepseek/deepseek-r1",
                "qwen/qwen-2.5-coder-32b",
                "llama-3.3-70b",
                "llama-3.1-8b",
            ]
        );
    }

    #[test]
    fn test_lookup_and_listing() {
        let catalog = sample_catalog();
        assert!(catalog.contains(ProviderId::Groq, "llama-3.1-8b"));
        assert!(!catalog.contains(ProviderId::OpenRouter, "llama-3.1-8b"));
        assert_eq!(catalog.list(ProviderId::OpenRouter, Some(PowerTier::Low)).len(), 1);
        assert_eq!(catalog.list_all(Some(PowerTier::Low)).len(), 2);
    }

    #[test]
    fn test_default_model_falls_back_to_any_tier() {
        let catalog = sample_catalog();
        let exact = catalog.default_model(ProviderId::Groq, PowerTier::Low).unwrap();
        assert_eq!(exact.model_id, "llama-3.1-8b");

        let fallback = catalog.default_model(ProviderId::Groq, PowerTier::EHigh).unwrap();
        assert_eq!(fallback.model_id, "llama-3.3-70b");

        let empty = ModelCatalog::default();
        assert!(empty.default_model(ProviderId::Groq, PowerTier::Low).is_none());
    }

    #[test]
    fn test_rejects_invalid_catalogs() {
        let too_many_stars = SAMPLE_CATALOG.replace("\"speed\": 5, \"safety\": 3 } },", "\"speed\": 6, \"safety\": 3 } },");
        assert!(ModelCatalog::from_json_str(&too_many_stars).is_err());

        let unknown_provider = SAMPLE_CATALOG.replace("\"groq\":", "\"mistral\":");
        assert!(ModelCatalog::from_json_str(&unknown_provider).is_err());

        let duplicate = SAMPLE_CATALOG.replace("deepseek/deepseek-r1", "qwen/qwen-2.5-coder-32b");
        assert!(ModelCatalog::from_json_str(&duplicate).is_err());
    }
}
