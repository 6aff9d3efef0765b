// relay-core/src/models/catalog.rs
//! Model descriptors as they appear in the static catalog.

use crate::providers::ProviderId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse quality/cost bucket of a model.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PowerTier {
    Low,
    Medium,
    High,
    #[serde(rename = "eHigh")]
    EHigh,
}

impl PowerTier {
    pub const ALL: [PowerTier; 4] = [
        PowerTier::Low,
        PowerTier::Medium,
        PowerTier::High,
        PowerTier::EHigh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerTier::Low => "Low",
            PowerTier::Medium => "Medium",
            PowerTier::High => "High",
            PowerTier::EHigh => "eHigh",
        }
    }
}

impl fmt::Display for PowerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PowerTier::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown power tier '{}'. Expected one of Low, Medium, High, eHigh", s))
    }
}

/// Star ratings, each 0 to 5.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelStars {
    pub coding: u8,
    pub reasoning: u8,
    pub multilingual: u8,
    pub speed: u8,
    pub safety: u8,
}

impl ModelStars {
    pub const MAX: u8 = 5;

    pub fn values(&self) -> [u8; 5] {
        [
            self.coding,
            self.reasoning,
            self.multilingual,
            self.speed,
            self.safety,
        ]
    }

    /// Arithmetic mean of all five dimensions.
    pub fn balanced(&self) -> f64 {
        let values = self.values();
        values.iter().map(|v| f64::from(*v)).sum::<f64>() / values.len() as f64
    }
}

/// Ranking dimension: one of the five stars or the synthetic `balanced` mean.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModelMetric {
    Coding,
    Reasoning,
    Multilingual,
    Speed,
    Safety,
    Balanced,
}

impl ModelMetric {
    pub const ALL: [ModelMetric; 6] = [
        ModelMetric::Coding,
        ModelMetric::Reasoning,
        ModelMetric::Multilingual,
        ModelMetric::Speed,
        ModelMetric::Safety,
        ModelMetric::Balanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelMetric::Coding => "coding",
            ModelMetric::Reasoning => "reasoning",
            ModelMetric::Multilingual => "multilingual",
            ModelMetric::Speed => "speed",
            ModelMetric::Safety => "safety",
            ModelMetric::Balanced => "balanced",
        }
    }
}

impl fmt::Display for ModelMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelMetric::ALL
            .into_iter()
            .find(|metric| metric.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown metric '{}'", s))
    }
}

/// Restricts a listing to one provider or lets every provider through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFilter {
    All,
    Only(ProviderId),
}

impl ProviderFilter {
    pub fn matches(&self, provider: ProviderId) -> bool {
        match self {
            ProviderFilter::All => true,
            ProviderFilter::Only(p) => *p == provider,
        }
    }
}

impl fmt::Display for ProviderFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderFilter::All => f.write_str("all"),
            ProviderFilter::Only(p) => write!(f, "{}", p),
        }
    }
}

impl FromStr for ProviderFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(ProviderFilter::All);
        }
        s.parse::<ProviderId>().map(ProviderFilter::Only)
    }
}

/// One catalog entry. `(provider, model_id)` is unique across the catalog.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub provider: ProviderId,
    pub model_id: String,
    pub title: String,
    pub power_tier: PowerTier,
    pub tags: Vec<String>,
    pub stars: ModelStars,
}

impl ModelDescriptor {
    pub fn score(&self, metric: ModelMetric) -> f64 {
        match metric {
            ModelMetric::Coding => f64::from(self.stars.coding),
            ModelMetric::Reasoning => f64::from(self.stars.reasoning),
            ModelMetric::Multilingual => f64::from(self.stars.multilingual),
            ModelMetric::Speed => f64::from(self.stars.speed),
            ModelMetric::Safety => f64::from(self.stars.safety),
            ModelMetric::Balanced => self.stars.balanced(),
        }
    }
}
