// relay-core/src/config.rs

//! Handles configuration structures and parsing for the relay.

use crate::errors::{RelayError, Result};
use crate::models::catalog::PowerTier;
use crate::providers::ProviderId;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_TIMEOUT_MS: u64 = 45_000;
pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const DEFAULT_LARGE_REPLY_THRESHOLD: usize = 12_000;
pub const DEFAULT_HISTORY_CLIP_CHARS: usize = 2_000;

#[derive(Deserialize, Debug, Clone)]
struct RawRelayConfig {
    catalog_path: PathBuf,
    #[serde(default = "default_artifacts_dir")]
    artifacts_dir: PathBuf,
    #[serde(default = "default_history_limit")]
    history_limit: usize,
    #[serde(default = "default_large_reply_threshold")]
    large_reply_threshold: usize,
    #[serde(default = "default_history_clip_chars")]
    history_clip_chars: usize,
    default_model: DefaultModelConfig,
    #[serde(default)]
    providers: BTreeMap<String, ProviderConfig>,
}

/// Seed for new owners' settings.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DefaultModelConfig {
    pub provider: ProviderId,
    pub model_id: String,
    pub power_tier: PowerTier,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    pub api_key_env_var: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
    /// Extra phrases that mark a "system role unsupported" rejection for this backend.
    #[serde(default)]
    pub system_role_markers: Vec<String>,
}

impl ProviderConfig {
    pub fn base_url(&self, id: ProviderId) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| id.default_base_url().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub catalog_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub history_limit: usize,
    pub large_reply_threshold: usize,
    pub history_clip_chars: usize,
    pub default_model: DefaultModelConfig,
    providers: BTreeMap<ProviderId, ProviderConfig>,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("generated")
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_large_reply_threshold() -> usize {
    DEFAULT_LARGE_REPLY_THRESHOLD
}

fn default_history_clip_chars() -> usize {
    DEFAULT_HISTORY_CLIP_CHARS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl RelayConfig {
    pub fn from_toml_str(config_toml_content: &str) -> Result<RelayConfig> {
        let raw: RawRelayConfig = toml::from_str(config_toml_content).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse TOML content");
            RelayError::config(format!(
                "Failed to parse configuration TOML content. Check TOML syntax: {}",
                e
            ))
        })?;

        // --- Basic Checks ---
        if raw.catalog_path.as_os_str().is_empty() {
            return Err(RelayError::config("'catalog_path' is empty."));
        }
        if raw.artifacts_dir.as_os_str().is_empty() {
            return Err(RelayError::config("'artifacts_dir' is empty."));
        }
        if raw.history_limit == 0 {
            return Err(RelayError::config("'history_limit' must be at least 1."));
        }
        if raw.large_reply_threshold == 0 {
            return Err(RelayError::config("'large_reply_threshold' must be at least 1."));
        }
        if raw.default_model.model_id.trim().is_empty() {
            return Err(RelayError::config("'default_model.model_id' is empty."));
        }

        // --- Provider Validation ---
        let mut providers = BTreeMap::new();
        for (key, provider) in raw.providers {
            let id: ProviderId = key.parse().map_err(RelayError::Config)?;
            if provider.api_key_env_var.trim().is_empty() {
                return Err(RelayError::config(format!(
                    "Provider '{}' is missing 'api_key_env_var'.",
                    key
                )));
            }
            if provider.timeout_ms == 0 {
                return Err(RelayError::config(format!(
                    "Provider '{}' has a zero 'timeout_ms'.",
                    key
                )));
            }
            if let Some(base_url) = &provider.base_url {
                if base_url.trim().is_empty() {
                    return Err(RelayError::config(format!(
                        "Provider '{}' has an empty 'base_url'.",
                        key
                    )));
                }
                Url::parse(base_url).map_err(|e| {
                    RelayError::config(format!(
                        "Invalid URL format for base_url ('{}') in provider '{}': {}",
                        base_url, key, e
                    ))
                })?;
            }
            if provider.system_role_markers.iter().any(|m| m.trim().is_empty()) {
                return Err(RelayError::config(format!(
                    "Provider '{}' has an empty entry in 'system_role_markers'.",
                    key
                )));
            }
            providers.insert(id, provider);
        }

        if let Some(missing) = ProviderId::ALL.into_iter().find(|id| !providers.contains_key(id)) {
            return Err(RelayError::config(format!(
                "Provider '{}' not found in [providers] map.",
                missing
            )));
        }

        tracing::info!("Successfully parsed and validated relay configuration.");
        Ok(RelayConfig {
            catalog_path: raw.catalog_path,
            artifacts_dir: raw.artifacts_dir,
            history_limit: raw.history_limit,
            large_reply_threshold: raw.large_reply_threshold,
            history_clip_chars: raw.history_clip_chars,
            default_model: raw.default_model,
            providers,
        })
    }

    /// Resolves relative catalog and artifact paths against `base_dir`
    /// (usually the directory holding the config file).
    pub fn with_base_dir(mut self, base_dir: &Path) -> Self {
        if self.catalog_path.is_relative() {
            self.catalog_path = base_dir.join(&self.catalog_path);
        }
        if self.artifacts_dir.is_relative() {
            self.artifacts_dir = base_dir.join(&self.artifacts_dir);
        }
        self
    }

    pub fn providers(&self) -> impl Iterator<Item = (&ProviderId, &ProviderConfig)> {
        self.providers.iter()
    }

    pub fn provider(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(&id)
    }
}
