use std::time::Duration;

use serde::Deserialize;

/// Provider health and circuit breaker thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Failures inside `failure_window` that open the circuit
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    /// Sliding window over which failures are counted
    #[serde(default = "default_failure_window", deserialize_with = "crate::duration::deserialize")]
    pub failure_window: Duration,
    /// Minimum time an unhealthy provider waits before it is retried
    #[serde(default = "default_cooldown", deserialize_with = "crate::duration::deserialize")]
    pub cooldown: Duration,
    /// Responses at or above this latency count as slow
    #[serde(default = "default_slow_threshold", deserialize_with = "crate::duration::deserialize")]
    pub slow_threshold: Duration,
    /// Consecutive slow responses that mark a provider unhealthy
    #[serde(default = "default_max_slow_responses")]
    pub max_slow_responses: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            failure_window: default_failure_window(),
            cooldown: default_cooldown(),
            slow_threshold: default_slow_threshold(),
            max_slow_responses: default_max_slow_responses(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_failures() -> u32 {
    3
}

#[allow(clippy::missing_const_for_fn)]
fn default_failure_window() -> Duration {
    Duration::from_secs(60)
}

#[allow(clippy::missing_const_for_fn)]
fn default_cooldown() -> Duration {
    Duration::from_secs(30)
}

#[allow(clippy::missing_const_for_fn)]
fn default_slow_threshold() -> Duration {
    Duration::from_secs(30)
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_slow_responses() -> u32 {
    3
}
