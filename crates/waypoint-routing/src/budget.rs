//! Session spend tracking with edge-triggered threshold signals
//!
//! Budget overage is advisory: the governor raises signals and steps tiers
//! down, it never refuses a route.

use std::sync::{Arc, Mutex};

use waypoint_config::{BudgetConfig, ModelTier};

use crate::events::{EventBus, RouterEvent};

#[derive(Debug)]
struct BudgetState {
    current_cost: f64,
    config: BudgetConfig,
}

/// Tracks cumulative session cost
pub struct BudgetGovernor {
    state: Mutex<BudgetState>,
    events: Arc<EventBus>,
}

/// One level cheaper, or `None` for tiers that are not downgraded
///
/// Vision is exempt: stepping it down changes capability, not just cost.
pub const fn step_down(tier: ModelTier) -> Option<ModelTier> {
    match tier {
        ModelTier::Reasoning => Some(ModelTier::Standard),
        ModelTier::Standard => Some(ModelTier::Mini),
        ModelTier::Mini | ModelTier::Vision => None,
    }
}

impl BudgetGovernor {
    pub fn new(config: BudgetConfig, events: Arc<EventBus>) -> Self {
        Self {
            state: Mutex::new(BudgetState {
                current_cost: 0.0,
                config,
            }),
            events,
        }
    }

    /// Replace limits; the accumulated cost is kept
    pub fn set_config(&self, config: BudgetConfig) {
        self.lock().config = config;
    }

    pub fn config(&self) -> BudgetConfig {
        self.lock().config.clone()
    }

    /// Add spend and signal threshold crossings
    ///
    /// `budget:warning` and `budget:exceeded` fire only on the call that moves
    /// the total from below a threshold to at or above it. Negative or
    /// non-finite deltas are ignored. Returns the new total.
    pub fn add_cost(&self, delta: f64) -> f64 {
        if !delta.is_finite() || delta < 0.0 {
            tracing::warn!(delta, "ignoring invalid cost delta");
            return self.current_cost();
        }

        let mut events = Vec::with_capacity(2);

        let after = {
            let mut state = self.lock();
            let before = state.current_cost;
            let after = before + delta;
            state.current_cost = after;

            let budget = state.config.session_budget;
            let warning_at = budget * state.config.warning_ratio;

            if before < warning_at && after >= warning_at {
                events.push(RouterEvent::BudgetWarning {
                    current_cost: after,
                    session_budget: budget,
                });
            }

            if before < budget && after >= budget {
                events.push(RouterEvent::BudgetExceeded {
                    current_cost: after,
                    session_budget: budget,
                });
            }

            after
        };

        for event in &events {
            if let RouterEvent::BudgetWarning {
                current_cost,
                session_budget,
            }
            | RouterEvent::BudgetExceeded {
                current_cost,
                session_budget,
            } = event
            {
                tracing::warn!(
                    event = %event.kind(),
                    current_cost,
                    session_budget,
                    "session budget threshold crossed"
                );
            }
        }
        tracing::debug!(delta, total = after, "session cost updated");

        self.events.emit_all(events);
        after
    }

    pub fn current_cost(&self) -> f64 {
        self.lock().current_cost
    }

    pub fn session_budget(&self) -> f64 {
        self.lock().config.session_budget
    }

    /// Fraction of the budget spent
    pub fn utilization(&self) -> f64 {
        let state = self.lock();
        state.current_cost / state.config.session_budget
    }

    pub fn reset_cost(&self) {
        self.lock().current_cost = 0.0;
        tracing::info!("session cost reset");
    }

    /// Whether spend has reached the warning threshold
    pub fn under_pressure(&self) -> bool {
        let state = self.lock();
        state.current_cost >= state.config.session_budget * state.config.warning_ratio
    }

    /// Step a tier down one level when spend is at or above the warning threshold
    ///
    /// The lower tier is only taken when `available` accepts it, so pressure
    /// never leaves a request without a servable tier. Returns the downgraded
    /// tier and signals `tier:downgraded`, or `None` when no downgrade applies.
    pub fn downgrade(&self, tier: ModelTier, available: impl FnOnce(ModelTier) -> bool) -> Option<ModelTier> {
        let (current_cost, to) = {
            let state = self.lock();
            let config = &state.config;
            if !config.auto_downgrade || state.current_cost < config.session_budget * config.warning_ratio {
                return None;
            }
            (state.current_cost, step_down(tier)?)
        };

        if !available(to) {
            tracing::debug!(from = %tier, to = %to, "lower tier unavailable, keeping tier");
            return None;
        }

        tracing::info!(from = %tier, to = %to, current_cost, "tier downgraded under budget pressure");
        self.events.emit(&RouterEvent::TierDowngraded {
            from: tier,
            to,
            current_cost,
        });
        Some(to)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BudgetState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for BudgetGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("BudgetGovernor")
            .field("current_cost", &state.current_cost)
            .field("config", &state.config)
            .finish_non_exhaustive()
    }
}
