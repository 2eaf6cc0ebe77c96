use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// Capability/cost class a catalog list belongs to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelTier {
    /// Cheapest models, for lookups and one-liners
    Mini,
    /// General-purpose models
    Standard,
    /// Extended-reasoning models
    Reasoning,
    /// Models with image input
    Vision,
}

/// Models a provider offers, grouped by tier
///
/// Within each list the first entry is the preferred model.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderCatalog {
    /// Cheap, fast models for simple tasks
    #[serde(default)]
    pub mini: Vec<String>,
    /// General-purpose models
    #[serde(default)]
    pub standard: Vec<String>,
    /// Models tuned for long chains of reasoning
    #[serde(default)]
    pub reasoning: Vec<String>,
    /// Models that accept image input
    #[serde(default)]
    pub vision: Vec<String>,
}

impl ProviderCatalog {
    /// Models configured for a tier
    pub fn models(&self, tier: ModelTier) -> &[String] {
        match tier {
            ModelTier::Mini => &self.mini,
            ModelTier::Standard => &self.standard,
            ModelTier::Reasoning => &self.reasoning,
            ModelTier::Vision => &self.vision,
        }
    }

    /// Preferred model for a tier
    pub fn first(&self, tier: ModelTier) -> Option<&str> {
        self.models(tier).first().map(String::as_str)
    }

    /// Tier whose list contains `model`
    ///
    /// Lists are searched mini, standard, reasoning, vision; the first hit wins.
    pub fn tier_of(&self, model: &str) -> Option<ModelTier> {
        ModelTier::iter().find(|tier| self.models(*tier).iter().any(|m| m == model))
    }

    /// Whether the catalog lists no models at all
    pub fn is_empty(&self) -> bool {
        self.mini.is_empty() && self.standard.is_empty() && self.reasoning.is_empty() && self.vision.is_empty()
    }
}
