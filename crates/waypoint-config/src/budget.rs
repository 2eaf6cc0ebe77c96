use serde::Deserialize;

/// Session spend limits
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    /// Session budget in USD
    #[serde(default = "default_session_budget")]
    pub session_budget: f64,
    /// Fraction of the budget at which the warning fires and downgrades start
    #[serde(default = "default_warning_ratio")]
    pub warning_ratio: f64,
    /// Step tiers down one level once the warning threshold is reached
    #[serde(default = "default_auto_downgrade")]
    pub auto_downgrade: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            session_budget: default_session_budget(),
            warning_ratio: default_warning_ratio(),
            auto_downgrade: default_auto_downgrade(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_session_budget() -> f64 {
    10.0
}

#[allow(clippy::missing_const_for_fn)]
fn default_warning_ratio() -> f64 {
    0.8
}

#[allow(clippy::missing_const_for_fn)]
fn default_auto_downgrade() -> bool {
    true
}
