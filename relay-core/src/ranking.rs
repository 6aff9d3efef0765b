// relay-core/src/ranking.rs

//! Orders catalog models by a quality metric.

use crate::catalog::ModelCatalog;
use crate::models::catalog::{ModelDescriptor, ModelMetric, PowerTier, ProviderFilter};
use std::cmp::Ordering;
use tracing::debug;

pub const DEFAULT_RANK_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankQuery {
    pub metric: ModelMetric,
    pub provider: ProviderFilter,
    pub power_tier: Option<PowerTier>,
    pub limit: usize,
}

impl RankQuery {
    pub fn new(metric: ModelMetric) -> Self {
        Self {
            metric,
            provider: ProviderFilter::All,
            power_tier: None,
            limit: DEFAULT_RANK_LIMIT,
        }
    }

    pub fn provider(mut self, provider: ProviderFilter) -> Self {
        self.provider = provider;
        self
    }

    pub fn power_tier(mut self, power_tier: Option<PowerTier>) -> Self {
        self.power_tier = power_tier;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranking<'a> {
    pub models: Vec<&'a ModelDescriptor>,
    /// Set when the requested power tier had no models and was dropped.
    pub power_tier_relaxed: bool,
}

/// Descending metric, then descending balanced score, then ascending title.
pub fn compare(a: &ModelDescriptor, b: &ModelDescriptor, metric: ModelMetric) -> Ordering {
    b.score(metric)
        .total_cmp(&a.score(metric))
        .then_with(|| b.score(ModelMetric::Balanced).total_cmp(&a.score(ModelMetric::Balanced)))
        .then_with(|| a.title.cmp(&b.title))
}

pub struct ModelRanker<'a> {
    catalog: &'a ModelCatalog,
}

impl<'a> ModelRanker<'a> {
    pub fn new(catalog: &'a ModelCatalog) -> Self {
        Self { catalog }
    }

    pub fn rank(&self, query: &RankQuery) -> Ranking<'a> {
        let models = self.rank_filtered(query.metric, query.provider, query.power_tier, query.limit);
        if models.is_empty() && query.power_tier.is_some() {
            debug!(
                metric = %query.metric,
                provider = %query.provider,
                "No models for requested power tier, ranking across all tiers."
            );
            return Ranking {
                models: self.rank_filtered(query.metric, query.provider, None, query.limit),
                power_tier_relaxed: true,
            };
        }
        Ranking {
            models,
            power_tier_relaxed: false,
        }
    }

    fn rank_filtered(
        &self,
        metric: ModelMetric,
        provider: ProviderFilter,
        power_tier: Option<PowerTier>,
        limit: usize,
    ) -> Vec<&'a ModelDescriptor> {
        let mut source: Vec<&'a ModelDescriptor> = self
            .catalog
            .list_all(power_tier)
            .into_iter()
            .filter(|m| provider.matches(m.provider))
            .collect();
        // Stable: exact ties keep catalog order.
        source.sort_by(|a, b| compare(a, b, metric));
        source.truncate(limit);
        source
    }
}
