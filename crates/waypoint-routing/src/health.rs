//! Provider health tracking with a sliding-window circuit breaker
//!
//! A provider opens its circuit when `max_failures` failures land inside
//! `failure_window`, or when `max_slow_responses` consecutive successes are
//! slower than `slow_threshold`. Once `cooldown` has elapsed since the
//! circuit opened the provider is reported healthy again; the next success
//! closes the circuit for good and a failure restarts the cooldown.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use waypoint_config::HealthConfig;

use crate::clock::Clock;
use crate::events::{EventBus, RouterEvent};

/// Circuit breaker state for a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, requests flow through
    Closed,
    /// Provider is failing, requests are blocked
    Open,
    /// Cooldown elapsed; the provider is tried again
    HalfOpen,
}

/// Health change caused by a recorded outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    Unchanged,
    BecameUnhealthy,
    Recovered,
}

/// Point-in-time view of a provider's health
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub provider: String,
    /// Effective health, including cooldown-based recovery
    pub healthy: bool,
    pub state: CircuitState,
    /// Failures inside the current window
    pub failure_count: usize,
    pub success_count: u64,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
    pub consecutive_slow_responses: u32,
    pub last_error: Option<String>,
    #[serde(skip)]
    pub last_success: Option<Instant>,
    #[serde(skip)]
    pub last_failure: Option<Instant>,
    #[serde(skip)]
    pub circuit_opened_at: Option<Instant>,
    /// Time left before an open circuit is retried
    pub cooldown_remaining_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct ProviderRecord {
    unhealthy: bool,
    failures: VecDeque<Instant>,
    success_count: u64,
    total_requests: u64,
    sum_response_time_ms: u64,
    consecutive_slow_responses: u32,
    last_success: Option<Instant>,
    last_failure: Option<Instant>,
    last_error: Option<String>,
    circuit_opened_at: Option<Instant>,
}

impl ProviderRecord {
    /// Drop failures that have aged out of the window
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.failures.front() {
            if now.saturating_duration_since(oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn failures_in_window(&self, now: Instant, window: Duration) -> usize {
        self.failures
            .iter()
            .filter(|t| now.saturating_duration_since(**t) <= window)
            .count()
    }

    fn cooldown_remaining(&self, now: Instant, cooldown: Duration) -> Option<Duration> {
        if !self.unhealthy {
            return None;
        }

        let opened_at = self.circuit_opened_at?;
        let elapsed = now.saturating_duration_since(opened_at);
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    fn state(&self, now: Instant, cooldown: Duration) -> CircuitState {
        if !self.unhealthy {
            CircuitState::Closed
        } else if self.cooldown_remaining(now, cooldown).is_some() {
            CircuitState::Open
        } else {
            CircuitState::HalfOpen
        }
    }

    fn open(&mut self, now: Instant) {
        self.unhealthy = true;
        self.circuit_opened_at = Some(now);
    }
}

/// Track provider health and implement circuit breaker logic
pub struct ProviderHealthTracker {
    providers: DashMap<String, ProviderRecord>,
    config: RwLock<HealthConfig>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
}

impl ProviderHealthTracker {
    /// Create a new health tracker with the given configuration
    pub fn new(config: HealthConfig, clock: Arc<dyn Clock>, events: Arc<EventBus>) -> Self {
        Self {
            providers: DashMap::new(),
            config: RwLock::new(config),
            clock,
            events,
        }
    }

    /// Replace the thresholds; existing records are kept
    pub fn set_config(&self, config: HealthConfig) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    /// Active thresholds
    pub fn config(&self) -> HealthConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Create an empty record for a provider if it has none
    pub fn register(&self, provider: &str) {
        self.providers.entry(provider.to_owned()).or_default();
    }

    /// Record a successful request and its latency
    pub fn record_success(&self, provider: &str, response_time: Duration) -> HealthTransition {
        let config = self.config();
        let now = self.clock.now();
        let response_time_ms = u64::try_from(response_time.as_millis()).unwrap_or(u64::MAX);

        let mut events = vec![RouterEvent::ProviderSuccess {
            provider: provider.to_owned(),
            response_time_ms,
        }];
        let mut transition = HealthTransition::Unchanged;

        {
            let mut record = self.providers.entry(provider.to_owned()).or_default();

            record.success_count += 1;
            record.total_requests += 1;
            record.sum_response_time_ms = record.sum_response_time_ms.saturating_add(response_time_ms);
            record.last_success = Some(now);

            if response_time < config.slow_threshold {
                record.consecutive_slow_responses = 0;
            } else {
                record.consecutive_slow_responses += 1;
            }

            if record.unhealthy {
                record.unhealthy = false;
                record.failures.clear();
                record.circuit_opened_at = None;
                transition = HealthTransition::Recovered;
                events.push(RouterEvent::ProviderRecovered {
                    provider: provider.to_owned(),
                });
            }

            // A provider that answers but always too slowly is treated as failing
            if record.consecutive_slow_responses >= config.max_slow_responses {
                record.open(now);
                transition = HealthTransition::BecameUnhealthy;
                events.push(RouterEvent::ProviderUnhealthy {
                    provider: provider.to_owned(),
                    reason: format!("{} consecutive slow responses", record.consecutive_slow_responses),
                    failure_count: record.failures.len(),
                });
            }
        }

        match transition {
            HealthTransition::Recovered => tracing::info!(provider, "provider recovered"),
            HealthTransition::BecameUnhealthy => tracing::warn!(
                provider,
                response_time_ms,
                "circuit breaker opened for provider after consecutive slow responses"
            ),
            HealthTransition::Unchanged => tracing::debug!(provider, response_time_ms, "provider success recorded"),
        }

        self.events.emit_all(events);
        transition
    }

    /// Record a failed request
    pub fn record_failure(&self, provider: &str, error: &str) -> HealthTransition {
        let config = self.config();
        let now = self.clock.now();

        let mut events = Vec::with_capacity(2);
        let mut transition = HealthTransition::Unchanged;
        let failure_count;

        {
            let mut record = self.providers.entry(provider.to_owned()).or_default();

            record.failures.push_back(now);
            record.prune(now, config.failure_window);
            record.total_requests += 1;
            record.last_failure = Some(now);
            record.last_error = Some(error.to_owned());
            failure_count = record.failures.len();

            if record.unhealthy {
                // A failed retry after cooldown restarts the cooldown
                record.circuit_opened_at = Some(now);
            } else if failure_count >= config.max_failures as usize {
                record.open(now);
                transition = HealthTransition::BecameUnhealthy;
            }
        }

        events.push(RouterEvent::ProviderFailure {
            provider: provider.to_owned(),
            error: error.to_owned(),
            failure_count,
        });

        if transition == HealthTransition::BecameUnhealthy {
            tracing::warn!(provider, error_count = failure_count, error, "circuit breaker opened for provider");
            events.push(RouterEvent::ProviderUnhealthy {
                provider: provider.to_owned(),
                reason: format!("{failure_count} failures within {:?}", config.failure_window),
                failure_count,
            });
        } else {
            tracing::debug!(provider, error_count = failure_count, error, "provider failure recorded");
        }

        self.events.emit_all(events);
        transition
    }

    /// Whether a provider may receive requests
    ///
    /// Unknown providers are healthy. An unhealthy provider becomes healthy
    /// again once its cooldown has elapsed.
    pub fn is_healthy(&self, provider: &str) -> bool {
        self.state(provider) != CircuitState::Open
    }

    /// Check the circuit state for a provider
    pub fn state(&self, provider: &str) -> CircuitState {
        let cooldown = self.config().cooldown;
        self.providers
            .get(provider)
            .map_or(CircuitState::Closed, |record| record.state(self.clock.now(), cooldown))
    }

    /// Open a provider's circuit from out-of-band knowledge, e.g. a maintenance window
    pub fn mark_unhealthy(&self, provider: &str, reason: &str) -> HealthTransition {
        let now = self.clock.now();

        let (was_healthy, failure_count) = {
            let mut record = self.providers.entry(provider.to_owned()).or_default();
            let was_healthy = !record.unhealthy;
            record.open(now);
            (was_healthy, record.failures.len())
        };

        if !was_healthy {
            tracing::debug!(provider, reason, "provider already unhealthy, cooldown restarted");
            return HealthTransition::Unchanged;
        }

        tracing::warn!(provider, reason, "provider marked unhealthy");
        self.events.emit(&RouterEvent::ProviderUnhealthy {
            provider: provider.to_owned(),
            reason: reason.to_owned(),
            failure_count,
        });
        HealthTransition::BecameUnhealthy
    }

    /// Clear all history for a provider
    pub fn reset_provider(&self, provider: &str) -> HealthTransition {
        let was_unhealthy = self
            .providers
            .insert(provider.to_owned(), ProviderRecord::default())
            .is_some_and(|old| old.unhealthy);

        tracing::info!(provider, "provider health reset");

        if was_unhealthy {
            self.events.emit(&RouterEvent::ProviderRecovered {
                provider: provider.to_owned(),
            });
            HealthTransition::Recovered
        } else {
            HealthTransition::Unchanged
        }
    }

    /// Reset every known provider, keeping the records
    pub fn reset_all(&self) {
        for mut entry in self.providers.iter_mut() {
            *entry.value_mut() = ProviderRecord::default();
        }
    }

    /// Snapshot of one provider; unknown providers report a fresh record
    pub fn health(&self, provider: &str) -> ProviderHealth {
        let config = self.config();
        let now = self.clock.now();

        self.providers.get(provider).map_or_else(
            || snapshot(provider, &ProviderRecord::default(), now, &config),
            |record| snapshot(provider, &record, now, &config),
        )
    }

    /// Snapshots of every known provider, sorted by id
    pub fn all_health(&self) -> Vec<ProviderHealth> {
        let config = self.config();
        let now = self.clock.now();

        let mut all: Vec<ProviderHealth> = self
            .providers
            .iter()
            .map(|entry| snapshot(entry.key(), entry.value(), now, &config))
            .collect();
        all.sort_by(|a, b| a.provider.cmp(&b.provider));
        all
    }
}

impl std::fmt::Debug for ProviderHealthTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHealthTracker")
            .field("providers", &self.providers.len())
            .field("config", &self.config())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_precision_loss)]
fn snapshot(provider: &str, record: &ProviderRecord, now: Instant, config: &HealthConfig) -> ProviderHealth {
    let state = record.state(now, config.cooldown);

    let avg_response_time_ms = if record.total_requests == 0 {
        0.0
    } else {
        record.sum_response_time_ms as f64 / record.total_requests as f64
    };

    ProviderHealth {
        provider: provider.to_owned(),
        healthy: state != CircuitState::Open,
        state,
        failure_count: record.failures_in_window(now, config.failure_window),
        success_count: record.success_count,
        total_requests: record.total_requests,
        avg_response_time_ms,
        consecutive_slow_responses: record.consecutive_slow_responses,
        last_error: record.last_error.clone(),
        last_success: record.last_success,
        last_failure: record.last_failure,
        circuit_opened_at: record.circuit_opened_at,
        cooldown_remaining_ms: record
            .cooldown_remaining(now, config.cooldown)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
    }
}
