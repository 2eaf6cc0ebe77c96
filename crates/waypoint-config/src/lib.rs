#![allow(clippy::must_use_candidate)]

pub mod budget;
pub mod chain;
pub mod classifier;
mod duration;
pub mod health;
mod loader;
pub mod providers;
pub mod telemetry;

use indexmap::IndexMap;
use serde::Deserialize;

pub use budget::*;
pub use chain::*;
pub use classifier::*;
pub use health::*;
pub use providers::*;
pub use telemetry::TelemetryConfig;

/// Top-level Waypoint configuration
///
/// Every section is optional; missing sections and fields fall back to the
/// documented defaults, so a partial file only overrides what it names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Circuit breaker thresholds
    #[serde(default)]
    pub health: HealthConfig,
    /// Ordered provider preference list
    #[serde(default)]
    pub chain: ChainConfig,
    /// Session spend limits
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Task classification tuning
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Per-provider model catalogs keyed by provider id
    #[serde(default)]
    pub providers: IndexMap<String, ProviderCatalog>,
    /// USD per million tokens, keyed by model id
    #[serde(default)]
    pub pricing: IndexMap<String, f64>,
    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Find which provider lists a model, searching providers in declaration order
    pub fn provider_for_model(&self, model: &str) -> Option<(&str, ModelTier)> {
        self.providers
            .iter()
            .find_map(|(name, catalog)| catalog.tier_of(model).map(|tier| (name.as_str(), tier)))
    }
}
