//! Routing-specific error types

use thiserror::Error;
use waypoint_config::ModelTier;

/// Errors surfaced by the routing layer
///
/// Provider failures are not errors here; they are reported through
/// `record_failure` and handled by fallback routing. An exhausted chain is
/// reported as an empty result, not as a variant of this enum.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// Configuration is invalid
    #[error("invalid routing configuration: {0}")]
    Config(String),

    /// A fallback chain must name at least one provider
    #[error("fallback chain must contain at least one provider")]
    EmptyChain,

    /// A forced model is not listed in any provider catalog
    #[error("model '{model}' is not configured for any provider")]
    ModelNotConfigured { model: String },

    /// No configured provider offers a model for the tier
    #[error("no provider offers a model for tier: {tier}")]
    NoModelForTier { tier: ModelTier },

    /// The provider is not a member of the fallback chain
    #[error("provider '{provider}' is not in the fallback chain")]
    NotInChain { provider: String },
}

impl RoutingError {
    /// Whether this error stems from configuration and will not succeed on retry
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::EmptyChain | Self::ModelNotConfigured { .. } | Self::NoModelForTier { .. }
        )
    }
}
