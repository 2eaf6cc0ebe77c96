//! Resilient model routing for Waypoint
//!
//! Picks a provider and model for each task while tracking provider health:
//! - **Circuit breaking**: providers that fail repeatedly are skipped until a cooldown elapses
//! - **Fallback chain**: ordered providers with automatic promotion of a healthy backup
//! - **Tiering**: keyword classification maps tasks to mini, standard, reasoning or vision models
//! - **Budget**: session spend tracking with tier downgrades under pressure

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod analysis;
pub mod budget;
pub mod chain;
pub mod clock;
pub mod error;
pub mod events;
pub mod health;
pub mod registry;
mod router;
pub mod stats;

pub use analysis::{ClassificationHints, ClassificationResult, Complexity, TaskClassifier, classify};
pub use budget::BudgetGovernor;
pub use chain::FallbackChain;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::RoutingError;
pub use events::{EventBus, EventKind, RouterEvent, SubscriptionId};
pub use health::{CircuitState, HealthTransition, ProviderHealth, ProviderHealthTracker};
pub use registry::{PriceTable, TierModelResolver};
pub use router::{ErrorKind, RouteDecision, RouteReason, RouteRequest, SmartRouter};
pub use stats::{RouterStats, format_stats};
pub use waypoint_config::ModelTier;
