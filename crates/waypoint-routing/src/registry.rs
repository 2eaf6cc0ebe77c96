//! Tier-to-model resolution over configured provider catalogs
//!
//! Each provider lists models per tier; the first model in a list is the
//! preferred one. A static price table turns token estimates into cost
//! estimates.

use indexmap::IndexMap;
use waypoint_config::{Config, ModelTier, ProviderCatalog};

use crate::analysis::{ClassificationResult, Complexity};
use crate::error::RoutingError;

/// USD per million tokens, keyed by model id
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    prices: IndexMap<String, f64>,
}

impl PriceTable {
    pub const fn new(prices: IndexMap<String, f64>) -> Self {
        Self { prices }
    }

    /// Price per million tokens for a model
    pub fn price(&self, model: &str) -> Option<f64> {
        self.prices.get(model).copied()
    }

    /// Estimate the cost of sending `tokens` tokens to `model`
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate(&self, model: &str, tokens: u64) -> Option<f64> {
        self.price(model)
            .map(|per_million| tokens as f64 / 1_000_000.0 * per_million)
    }
}

/// A concrete model choice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    pub provider: String,
    pub model: String,
    pub tier: ModelTier,
}

/// Map complexity to the tier that serves it
pub const fn tier_for_complexity(complexity: Complexity) -> ModelTier {
    match complexity {
        Complexity::Simple => ModelTier::Mini,
        Complexity::Moderate | Complexity::Complex => ModelTier::Standard,
        Complexity::ReasoningHeavy => ModelTier::Reasoning,
    }
}

/// Resolve tiers and models from provider catalogs
#[derive(Debug, Clone, Default)]
pub struct TierModelResolver {
    catalogs: IndexMap<String, ProviderCatalog>,
    pricing: PriceTable,
}

impl TierModelResolver {
    pub const fn new(catalogs: IndexMap<String, ProviderCatalog>, pricing: PriceTable) -> Self {
        Self { catalogs, pricing }
    }

    /// Build from the `providers` and `pricing` sections
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.providers.clone(), PriceTable::new(config.pricing.clone()))
    }

    pub const fn pricing(&self) -> &PriceTable {
        &self.pricing
    }

    /// Provider ids in declaration order
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.catalogs.keys().map(String::as_str)
    }

    /// Whether any provider offers a vision model
    pub fn supports_vision(&self) -> bool {
        self.catalogs.values().any(|c| c.first(ModelTier::Vision).is_some())
    }

    /// Tier for a classification
    ///
    /// Vision overrides the complexity tier when a vision model exists;
    /// otherwise the complexity tier is kept. Long-context tasks never go
    /// to the mini tier.
    pub fn tier_for(&self, classification: &ClassificationResult) -> ModelTier {
        let tier = tier_for_complexity(classification.complexity);

        if classification.requires_vision {
            if self.supports_vision() {
                return ModelTier::Vision;
            }
            tracing::warn!(
                tier = %tier,
                "task needs vision but no vision model is configured, keeping complexity tier"
            );
        }

        if classification.requires_long_context && tier == ModelTier::Mini {
            return ModelTier::Standard;
        }

        tier
    }

    /// Find the provider and tier that list a model
    ///
    /// Providers are searched in `order` first, then in declaration order.
    pub fn find_model(&self, model: &str, order: &[String]) -> Result<ModelChoice, RoutingError> {
        self.ordered(order)
            .find_map(|(provider, catalog)| {
                catalog.tier_of(model).map(|tier| ModelChoice {
                    provider: provider.to_owned(),
                    model: model.to_owned(),
                    tier,
                })
            })
            .ok_or_else(|| RoutingError::ModelNotConfigured {
                model: model.to_owned(),
            })
    }

    /// Preferred model a provider offers for a tier
    pub fn model_for(&self, provider: &str, tier: ModelTier) -> Option<&str> {
        self.catalogs.get(provider).and_then(|c| c.first(tier))
    }

    /// Same-tier models from every provider except `exclude`, in `order`
    pub fn alternatives(&self, tier: ModelTier, exclude: &str, order: &[String]) -> Vec<(String, String)> {
        self.ordered(order)
            .filter(|(provider, _)| *provider != exclude)
            .filter_map(|(provider, catalog)| {
                catalog
                    .first(tier)
                    .map(|model| (provider.to_owned(), model.to_owned()))
            })
            .collect()
    }

    pub fn has_provider(&self, provider: &str) -> bool {
        self.catalogs.contains_key(provider)
    }

    /// Whether any provider offers a model for the tier
    pub fn has_tier(&self, tier: ModelTier) -> bool {
        self.catalogs.values().any(|c| c.first(tier).is_some())
    }

    /// Catalogs in `order` first, then any remaining in declaration order
    fn ordered<'a>(&'a self, order: &'a [String]) -> impl Iterator<Item = (&'a str, &'a ProviderCatalog)> + 'a {
        let chained = order
            .iter()
            .filter_map(|p| self.catalogs.get_key_value(p))
            .map(|(p, c)| (p.as_str(), c));
        let rest = self
            .catalogs
            .iter()
            .filter(|(p, _)| !order.contains(*p))
            .map(|(p, c)| (p.as_str(), c));
        chained.chain(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::classify;

    fn catalog(mini: &str, standard: &str, reasoning: &str, vision: Option<&str>) -> ProviderCatalog {
        ProviderCatalog {
            mini: vec![mini.to_owned()],
            standard: vec![standard.to_owned()],
            reasoning: vec![reasoning.to_owned()],
            vision: vision.map(|v| vec![v.to_owned()]).unwrap_or_default(),
        }
    }

    fn resolver() -> TierModelResolver {
        let mut catalogs = IndexMap::new();
        catalogs.insert(
            "anthropic".to_owned(),
            catalog("claude-haiku", "claude-sonnet", "claude-opus", Some("claude-sonnet")),
        );
        catalogs.insert("openai".to_owned(), catalog("gpt-4o-mini", "gpt-4o", "o3", None));
        catalogs.insert(
            "google".to_owned(),
            catalog("gemini-flash", "gemini-pro", "gemini-pro-thinking", Some("gemini-pro")),
        );

        let mut prices = IndexMap::new();
        prices.insert("gpt-4o".to_owned(), 2.5);
        TierModelResolver::new(catalogs, PriceTable::new(prices))
    }

    fn order() -> Vec<String> {
        vec!["openai".to_owned(), "google".to_owned(), "anthropic".to_owned()]
    }

    #[test]
    fn complexity_tiers() {
        assert_eq!(tier_for_complexity(Complexity::Simple), ModelTier::Mini);
        assert_eq!(tier_for_complexity(Complexity::Moderate), ModelTier::Standard);
        assert_eq!(tier_for_complexity(Complexity::Complex), ModelTier::Standard);
        assert_eq!(tier_for_complexity(Complexity::ReasoningHeavy), ModelTier::Reasoning);
    }

    #[test]
    fn vision_overrides_tier_when_supported() {
        let classification = classify("think hard about this screenshot", None);
        assert_eq!(resolver().tier_for(&classification), ModelTier::Vision);
    }

    #[test]
    fn vision_without_models_keeps_tier() {
        let mut catalogs = IndexMap::new();
        catalogs.insert("openai".to_owned(), catalog("gpt-4o-mini", "gpt-4o", "o3", None));
        let resolver = TierModelResolver::new(catalogs, PriceTable::default());

        let classification = classify("analyze this diagram", None);
        assert!(!resolver.supports_vision());
        assert_eq!(resolver.tier_for(&classification), ModelTier::Standard);
    }

    #[test]
    fn long_context_skips_mini() {
        let mut classification = classify("list all files", None);
        classification.requires_long_context = true;
        assert_eq!(resolver().tier_for(&classification), ModelTier::Standard);
    }

    #[test]
    fn find_model_infers_tier() {
        let choice = resolver().find_model("o3", &order()).unwrap();
        assert_eq!(choice.provider, "openai");
        assert_eq!(choice.tier, ModelTier::Reasoning);

        // claude-sonnet is listed as standard before vision
        let choice = resolver().find_model("claude-sonnet", &order()).unwrap();
        assert_eq!(choice.tier, ModelTier::Standard);
    }

    #[test]
    fn find_model_unknown() {
        assert_eq!(
            resolver().find_model("llama-405b", &order()),
            Err(RoutingError::ModelNotConfigured {
                model: "llama-405b".to_owned()
            })
        );
    }

    #[test]
    fn alternatives_follow_chain_order() {
        let alternatives = resolver().alternatives(ModelTier::Standard, "google", &order());
        assert_eq!(
            alternatives,
            vec![
                ("openai".to_owned(), "gpt-4o".to_owned()),
                ("anthropic".to_owned(), "claude-sonnet".to_owned()),
            ]
        );
    }

    #[test]
    fn alternatives_skip_providers_without_tier() {
        let alternatives = resolver().alternatives(ModelTier::Vision, "anthropic", &order());
        assert_eq!(alternatives, vec![("google".to_owned(), "gemini-pro".to_owned())]);
    }

    #[test]
    fn providers_outside_order_come_last() {
        let alternatives = resolver().alternatives(ModelTier::Mini, "none", &["google".to_owned()]);
        let providers: Vec<_> = alternatives.into_iter().map(|(p, _)| p).collect();
        assert_eq!(providers, ["google", "anthropic", "openai"]);
    }

    #[test]
    fn estimate_cost_from_price_table() {
        let resolver = resolver();
        let cost = resolver.pricing().estimate("gpt-4o", 2_000_000).unwrap();
        assert!((cost - 5.0).abs() < 1e-9);
        assert_eq!(resolver.pricing().estimate("o3", 1000), None);
    }
}
