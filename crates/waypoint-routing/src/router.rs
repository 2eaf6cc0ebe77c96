//! Per-request orchestration
//!
//! Each `route` call is a fresh pass: classify (unless forced), pick a tier,
//! apply budget pressure, select a provider from the chain and resolve the
//! model. Only health, budget and chain order are shared between requests.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use waypoint_config::{Config, ModelTier};

use crate::analysis::{ClassificationHints, ClassificationResult, TaskClassifier};
use crate::budget::BudgetGovernor;
use crate::chain::FallbackChain;
use crate::clock::{Clock, SystemClock};
use crate::error::RoutingError;
use crate::events::{EventBus, EventKind, RouterEvent, SubscriptionId};
use crate::health::{HealthTransition, ProviderHealth, ProviderHealthTracker};
use crate::registry::TierModelResolver;
use crate::stats::{RouteCounters, RouterStats, format_stats};

/// Category of a failed provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    RateLimit,
    ServerError,
    Network,
    Auth,
    InvalidResponse,
    Unknown,
}

impl ErrorKind {
    /// Classify an HTTP status returned by a provider
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            408 | 504 => Self::Timeout,
            429 => Self::RateLimit,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

/// Why a route was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    /// Caller named the model
    ForcedModel,
    /// Caller named the tier
    ForcedTier,
    /// Tier derived from task classification
    Classified,
    /// Classification confidence too low to trust
    LowConfidence,
    /// Tier stepped down under budget pressure
    BudgetDowngrade,
    /// Retry on an alternative after a failed attempt
    Fallback(ErrorKind),
}

impl std::fmt::Display for RouteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ForcedModel => f.write_str("forced_model"),
            Self::ForcedTier => f.write_str("forced_tier"),
            Self::Classified => f.write_str("classified"),
            Self::LowConfidence => f.write_str("low_confidence"),
            Self::BudgetDowngrade => f.write_str("budget_downgrade"),
            Self::Fallback(kind) => write!(f, "fallback:{kind}"),
        }
    }
}

/// A request to route
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    /// Task description used for classification
    pub task: String,
    pub hints: ClassificationHints,
    /// Use exactly this model, skipping classification and budget checks
    pub force_model: Option<String>,
    /// Use this tier, skipping classification and budget checks
    pub force_tier: Option<ModelTier>,
    /// Use this provider when it is healthy and offers the tier
    pub preferred_provider: Option<String>,
    /// Tokens the caller expects to send; enables cost estimates
    pub estimated_tokens: Option<u64>,
}

impl RouteRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_hints(mut self, hints: ClassificationHints) -> Self {
        self.hints = hints;
        self
    }

    #[must_use]
    pub fn with_force_model(mut self, model: impl Into<String>) -> Self {
        self.force_model = Some(model.into());
        self
    }

    #[must_use]
    pub const fn with_force_tier(mut self, tier: ModelTier) -> Self {
        self.force_tier = Some(tier);
        self
    }

    #[must_use]
    pub fn with_preferred_provider(mut self, provider: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider.into());
        self
    }

    #[must_use]
    pub const fn with_estimated_tokens(mut self, tokens: u64) -> Self {
        self.estimated_tokens = Some(tokens);
        self
    }
}

/// Result of a routing decision
///
/// Attach it to the provider call and hand it back to
/// [`SmartRouter::record_success`], [`SmartRouter::record_failure`] or
/// [`SmartRouter::fallback_route`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDecision {
    pub provider: String,
    pub model: String,
    pub tier: ModelTier,
    pub reason: RouteReason,
    pub is_fallback: bool,
    /// Same-tier (provider, model) pairs from the other providers, in chain order
    pub alternatives: Vec<(String, String)>,
    pub estimated_tokens: Option<u64>,
    /// USD, present when tokens were supplied and the model is priced
    pub estimated_cost: Option<f64>,
    pub classification: Option<ClassificationResult>,
}

/// Resilient provider and model router
pub struct SmartRouter {
    config: RwLock<Arc<Config>>,
    events: Arc<EventBus>,
    health: Arc<ProviderHealthTracker>,
    chain: FallbackChain,
    classifier: RwLock<Arc<TaskClassifier>>,
    resolver: RwLock<Arc<TierModelResolver>>,
    budget: BudgetGovernor,
    counters: RouteCounters,
}

impl SmartRouter {
    /// Build a router on the system clock
    pub fn new(config: Config) -> Result<Self, RoutingError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a router on a supplied clock
    ///
    /// When `chain.providers` is empty the catalogs' declaration order is used.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self, RoutingError> {
        config.validate().map_err(|e| RoutingError::Config(e.to_string()))?;
        let chain_order = initial_chain(&config)?;

        let events = Arc::new(EventBus::new());
        let health = Arc::new(ProviderHealthTracker::new(
            config.health.clone(),
            clock,
            Arc::clone(&events),
        ));
        let chain = FallbackChain::new(Arc::clone(&health), Arc::clone(&events), config.chain.auto_promote);
        chain.set_chain(&chain_order)?;

        let budget = BudgetGovernor::new(config.budget.clone(), Arc::clone(&events));
        let classifier = TaskClassifier::new(config.classifier.clone());
        let resolver = TierModelResolver::from_config(&config);

        tracing::info!(
            chain = ?chain_order,
            providers = config.providers.len(),
            session_budget = config.budget.session_budget,
            "smart router initialized"
        );

        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            events,
            health,
            chain,
            classifier: RwLock::new(Arc::new(classifier)),
            resolver: RwLock::new(Arc::new(resolver)),
            budget,
            counters: RouteCounters::default(),
        })
    }

    /// Choose a provider and model for a request
    ///
    /// Returns `Ok(None)` when every provider is unhealthy and within its
    /// cooldown; `chain:exhausted` has been signalled in that case.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a forced or default model is not
    /// listed by any provider, or no provider offers the required tier
    pub fn route(&self, request: &RouteRequest) -> Result<Option<RouteDecision>, RoutingError> {
        let resolver = self.resolver();
        let chain_order = self.chain.providers();

        if let Some(ref model) = request.force_model {
            let choice = resolver.find_model(model, &chain_order)?;
            let decision = self.finish(
                &resolver,
                &chain_order,
                request,
                (choice.provider, choice.model, choice.tier),
                RouteReason::ForcedModel,
                None,
            );
            return Ok(Some(decision));
        }

        let (mut tier, mut reason, classification) = if let Some(tier) = request.force_tier {
            (tier, RouteReason::ForcedTier, None)
        } else {
            let classifier = self.classifier();
            let classification = classifier.classify(&request.task, Some(&request.hints));

            if classifier.is_confident(&classification) {
                (resolver.tier_for(&classification), RouteReason::Classified, Some(classification))
            } else {
                let default_choice = classifier
                    .config()
                    .default_model
                    .as_deref()
                    .map(|model| resolver.find_model(model, &chain_order))
                    .transpose()?;

                match default_choice {
                    Some(choice) if self.health.is_healthy(&choice.provider) => {
                        tracing::info!(
                            confidence = classification.confidence,
                            model = %choice.model,
                            "low classification confidence, using default model"
                        );
                        let decision = self.finish(
                            &resolver,
                            &chain_order,
                            request,
                            (choice.provider, choice.model, choice.tier),
                            RouteReason::LowConfidence,
                            Some(classification),
                        );
                        return Ok(Some(decision));
                    }
                    Some(choice) => {
                        tracing::warn!(
                            provider = %choice.provider,
                            model = %choice.model,
                            "default model provider unhealthy, using standard tier"
                        );
                    }
                    None => {
                        tracing::info!(
                            confidence = classification.confidence,
                            "low classification confidence, using standard tier"
                        );
                    }
                }
                (ModelTier::Standard, RouteReason::LowConfidence, Some(classification))
            }
        };

        if !resolver.has_tier(tier) {
            return Err(RoutingError::NoModelForTier { tier });
        }

        if reason != RouteReason::ForcedTier
            && let Some(downgraded) = self
                .budget
                .downgrade(tier, |lower| self.tier_servable(&resolver, &chain_order, lower))
        {
            tier = downgraded;
            reason = RouteReason::BudgetDowngrade;
            self.counters.downgrade();
        }

        let provider = match request.preferred_provider.as_deref() {
            Some(preferred) if self.health.is_healthy(preferred) && resolver.model_for(preferred, tier).is_some() => {
                Some(preferred.to_owned())
            }
            Some(preferred) => {
                tracing::debug!(preferred, tier = %tier, "preferred provider unavailable, using chain");
                self.chain.next_provider(false)
            }
            None => self.chain.next_provider(false),
        };

        let Some(provider) = provider else {
            self.counters.exhausted();
            return Ok(None);
        };

        let Some((provider, model)) = self.provider_offering(&resolver, &chain_order, provider, tier) else {
            tracing::warn!(tier = %tier, "no healthy provider in the chain offers the tier");
            self.events.emit(&RouterEvent::ChainExhausted {
                attempted: chain_order.clone(),
            });
            self.counters.exhausted();
            return Ok(None);
        };

        Ok(Some(self.finish(
            &resolver,
            &chain_order,
            request,
            (provider, model, tier),
            reason,
            classification,
        )))
    }

    /// Report a successful provider call
    ///
    /// A run of slow responses can still open the circuit, which is handled
    /// the same way as a failure-driven outage.
    pub fn record_success(&self, decision: &RouteDecision, latency: Duration, cost: f64) -> HealthTransition {
        let transition = self.health.record_success(&decision.provider, latency);
        if transition == HealthTransition::BecameUnhealthy {
            self.chain.handle_unhealthy(&decision.provider);
        }
        self.budget.add_cost(cost);
        transition
    }

    /// Report a failed provider call
    ///
    /// Opening the primary's circuit may promote a healthy backup.
    pub fn record_failure(&self, decision: &RouteDecision, error: ErrorKind) -> HealthTransition {
        let transition = self.health.record_failure(&decision.provider, &error.to_string());
        if transition == HealthTransition::BecameUnhealthy {
            self.chain.handle_unhealthy(&decision.provider);
        }
        transition
    }

    /// Record a failed attempt and pick the next alternative to retry on
    ///
    /// This records the failure itself; do not also call `record_failure`
    /// for the same attempt. Returns `None` once no healthy alternative
    /// remains, which ends the request.
    pub fn fallback_route(&self, failed: &RouteDecision, error: ErrorKind) -> Option<RouteDecision> {
        self.record_failure(failed, error);
        let resolver = self.resolver();

        for (i, (provider, model)) in failed.alternatives.iter().enumerate() {
            if !self.health.is_healthy(provider) {
                tracing::debug!(provider = %provider, "skipping unhealthy alternative");
                continue;
            }

            let decision = RouteDecision {
                provider: provider.clone(),
                model: model.clone(),
                tier: failed.tier,
                reason: RouteReason::Fallback(error),
                is_fallback: true,
                alternatives: failed.alternatives[i + 1..].to_vec(),
                estimated_tokens: failed.estimated_tokens,
                estimated_cost: failed
                    .estimated_tokens
                    .and_then(|tokens| resolver.pricing().estimate(model, tokens)),
                classification: failed.classification.clone(),
            };

            tracing::info!(
                from = %failed.provider,
                to = %provider,
                model = %model,
                error = %error,
                "falling back to alternative"
            );

            self.events.emit(&RouterEvent::ProviderFallback {
                from: failed.provider.clone(),
                to: provider.clone(),
                reason: error.to_string(),
            });
            self.emit_selected(&decision);
            self.counters.fallback();
            return Some(decision);
        }

        let attempted: Vec<String> = std::iter::once(failed.provider.clone())
            .chain(failed.alternatives.iter().map(|(p, _)| p.clone()))
            .collect();

        tracing::warn!(attempted = ?attempted, error = %error, "no healthy alternative left");
        self.events.emit(&RouterEvent::ChainExhausted { attempted });
        self.counters.exhausted();
        None
    }

    /// Open a provider's circuit from out-of-band knowledge
    pub fn mark_unhealthy(&self, provider: &str, reason: &str) {
        if self.health.mark_unhealthy(provider, reason) == HealthTransition::BecameUnhealthy {
            self.chain.handle_unhealthy(provider);
        }
    }

    /// Clear a provider's health history
    pub fn reset_provider(&self, provider: &str) {
        self.health.reset_provider(provider);
    }

    /// Move a provider to the primary position
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::NotInChain` if the provider is not a chain member
    pub fn promote_provider(&self, provider: &str) -> Result<bool, RoutingError> {
        self.chain.promote(provider)
    }

    pub fn health(&self, provider: &str) -> ProviderHealth {
        self.health.health(provider)
    }

    pub fn all_health(&self) -> Vec<ProviderHealth> {
        self.health.all_health()
    }

    pub fn is_healthy(&self, provider: &str) -> bool {
        self.health.is_healthy(provider)
    }

    /// Add spend outside of `record_success`
    pub fn add_cost(&self, delta: f64) -> f64 {
        self.budget.add_cost(delta)
    }

    pub fn current_cost(&self) -> f64 {
        self.budget.current_cost()
    }

    pub fn reset_cost(&self) {
        self.budget.reset_cost();
    }

    /// Replace the chain order
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the list is empty, repeats a
    /// provider, or names a provider without a model catalog
    pub fn configure_chain(&self, providers: &[String]) -> Result<(), RoutingError> {
        let resolver = self.resolver();
        if let Some(unknown) = providers.iter().find(|p| !resolver.has_provider(p)) {
            return Err(RoutingError::Config(format!("provider '{unknown}' has no model catalog")));
        }

        self.chain.set_chain(providers)?;

        let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
        let mut updated = Config::clone(&config);
        updated.chain.providers = providers.to_vec();
        *config = Arc::new(updated);
        Ok(())
    }

    /// Chain in current preference order
    pub fn fallback_chain(&self) -> Vec<String> {
        self.chain.providers()
    }

    /// Active configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Validate and apply a new configuration to every component
    ///
    /// Health history and accumulated cost are kept; the chain is reset to
    /// the new order.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if validation fails; nothing is applied then
    pub fn update_config(&self, config: Config) -> Result<(), RoutingError> {
        config.validate().map_err(|e| RoutingError::Config(e.to_string()))?;
        let chain_order = initial_chain(&config)?;

        self.chain.set_chain(&chain_order)?;
        self.chain.set_auto_promote(config.chain.auto_promote);
        self.health.set_config(config.health.clone());
        self.budget.set_config(config.budget.clone());
        *self.classifier.write().unwrap_or_else(|e| e.into_inner()) =
            Arc::new(TaskClassifier::new(config.classifier.clone()));
        *self.resolver.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(TierModelResolver::from_config(&config));
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(config);

        tracing::info!(chain = ?chain_order, "router configuration updated");
        Ok(())
    }

    /// Classify a task with the configured classifier
    pub fn classify(&self, text: &str, hints: Option<&ClassificationHints>) -> ClassificationResult {
        self.classifier().classify(text, hints)
    }

    pub fn stats(&self) -> RouterStats {
        let (routes, fallbacks, downgrades, exhausted) = self.counters.snapshot();
        let chain = self.chain.providers();

        RouterStats {
            primary: chain.first().cloned(),
            chain,
            auto_promote: self.chain.auto_promote(),
            providers: self.health.all_health(),
            current_cost: self.budget.current_cost(),
            session_budget: self.budget.session_budget(),
            budget_utilization: self.budget.utilization(),
            routes,
            fallbacks,
            downgrades,
            exhausted,
        }
    }

    /// Stats as a text table
    pub fn format_stats(&self) -> String {
        format_stats(&self.stats())
    }

    /// Clear health, cost and counters and restore the configured chain order
    pub fn reset(&self) {
        self.health.reset_all();
        self.budget.reset_cost();
        self.counters.reset();

        let config = self.config();
        match initial_chain(&config) {
            Ok(order) => {
                if let Err(e) = self.chain.set_chain(&order) {
                    tracing::error!(error = %e, "failed to restore fallback chain");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to restore fallback chain"),
        }

        tracing::info!("router state reset");
    }

    /// Reset and drop every event subscription
    pub fn dispose(&self) {
        self.reset();
        self.events.clear();
    }

    /// Receive every event
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&RouterEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Receive only events of one kind
    pub fn subscribe_kind<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&RouterEvent) + Send + Sync + 'static,
    {
        self.events.subscribe_kind(kind, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Whether a healthy chain member offers the tier
    fn tier_servable(&self, resolver: &TierModelResolver, chain_order: &[String], tier: ModelTier) -> bool {
        chain_order
            .iter()
            .any(|p| resolver.model_for(p, tier).is_some() && self.health.is_healthy(p))
    }

    /// First provider, starting at `selected` and following chain order, that
    /// is healthy and offers the tier
    ///
    /// Moving past `selected` signals `provider:fallback` for this request;
    /// the chain cursor is left alone since `selected` is still healthy.
    fn provider_offering(
        &self,
        resolver: &TierModelResolver,
        chain_order: &[String],
        selected: String,
        tier: ModelTier,
    ) -> Option<(String, String)> {
        if let Some(model) = resolver.model_for(&selected, tier) {
            return Some((selected, model.to_owned()));
        }

        let start = chain_order.iter().position(|p| *p == selected).unwrap_or(0);
        let (provider, model) = chain_order
            .iter()
            .cycle()
            .skip(start + 1)
            .take(chain_order.len().saturating_sub(1))
            .filter(|p| self.health.is_healthy(p))
            .find_map(|p| resolver.model_for(p, tier).map(|m| (p.clone(), m.to_owned())))?;

        tracing::debug!(from = %selected, to = %provider, tier = %tier, "selected provider lacks tier");
        self.events.emit(&RouterEvent::ProviderFallback {
            from: selected,
            to: provider.clone(),
            reason: "tier_unavailable".to_owned(),
        });
        Some((provider, model))
    }

    fn finish(
        &self,
        resolver: &TierModelResolver,
        chain_order: &[String],
        request: &RouteRequest,
        (provider, model, tier): (String, String, ModelTier),
        reason: RouteReason,
        classification: Option<ClassificationResult>,
    ) -> RouteDecision {
        let alternatives = resolver.alternatives(tier, &provider, chain_order);
        let estimated_cost = request
            .estimated_tokens
            .and_then(|tokens| resolver.pricing().estimate(&model, tokens));

        let decision = RouteDecision {
            provider,
            model,
            tier,
            reason,
            is_fallback: false,
            alternatives,
            estimated_tokens: request.estimated_tokens,
            estimated_cost,
            classification,
        };

        tracing::info!(
            provider = %decision.provider,
            model = %decision.model,
            tier = %decision.tier,
            reason = %decision.reason,
            alternatives = decision.alternatives.len(),
            "routing decision made"
        );

        self.emit_selected(&decision);
        self.counters.route();
        decision
    }

    fn emit_selected(&self, decision: &RouteDecision) {
        self.events.emit(&RouterEvent::RouteSelected {
            provider: decision.provider.clone(),
            model: decision.model.clone(),
            tier: decision.tier,
            reason: decision.reason,
            is_fallback: decision.is_fallback,
        });
    }

    fn resolver(&self) -> Arc<TierModelResolver> {
        Arc::clone(&self.resolver.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn classifier(&self) -> Arc<TaskClassifier> {
        Arc::clone(&self.classifier.read().unwrap_or_else(|e| e.into_inner()))
    }
}

impl std::fmt::Debug for SmartRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartRouter")
            .field("chain", &self.chain)
            .field("health", &self.health)
            .field("budget", &self.budget)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Chain order from config, defaulting to catalog declaration order
fn initial_chain(config: &Config) -> Result<Vec<String>, RoutingError> {
    let order: Vec<String> = if config.chain.providers.is_empty() {
        config.providers.keys().cloned().collect()
    } else {
        config.chain.providers.clone()
    };

    if order.is_empty() {
        return Err(RoutingError::EmptyChain);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, Weak};
    use std::thread;

    use super::*;
    use crate::clock::ManualClock;

    const CONFIG: &str = r#"
[health]
max_failures = 2
failure_window = "60s"
cooldown = "30s"

[chain]
providers = ["anthropic", "openai", "google"]

[budget]
session_budget = 10.0

[providers.anthropic]
mini = ["claude-haiku"]
standard = ["claude-sonnet"]
reasoning = ["claude-opus"]
vision = ["claude-sonnet"]

[providers.openai]
mini = ["gpt-4o-mini"]
standard = ["gpt-4o"]
reasoning = ["o3"]

[providers.google]
mini = ["gemini-flash"]
standard = ["gemini-pro"]

[pricing]
"gpt-4o" = 2.5
"claude-haiku" = 0.8
"#;

    fn config() -> Config {
        Config::from_toml_str(CONFIG).unwrap()
    }

    struct Fixture {
        router: SmartRouter,
        clock: Arc<ManualClock>,
        events: Arc<Mutex<Vec<RouterEvent>>>,
    }

    fn fixture_with(config: Config) -> Fixture {
        let clock = Arc::new(ManualClock::new());
        let router = SmartRouter::with_clock(config, clock.clone()).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        router.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        Fixture { router, clock, events }
    }

    fn fixture() -> Fixture {
        fixture_with(config())
    }

    fn kinds(events: &Mutex<Vec<RouterEvent>>) -> Vec<EventKind> {
        events.lock().unwrap().iter().map(RouterEvent::kind).collect()
    }

    fn route(router: &SmartRouter, task: &str) -> RouteDecision {
        router.route(&RouteRequest::new(task)).unwrap().unwrap()
    }

    fn pair(provider: &str, model: &str) -> (String, String) {
        (provider.to_owned(), model.to_owned())
    }

    #[test]
    fn error_kind_from_status() {
        assert_eq!(ErrorKind::from_status(429), ErrorKind::RateLimit);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::ServerError);
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Auth);
        assert_eq!(ErrorKind::from_status(504), ErrorKind::Timeout);
        assert_eq!(ErrorKind::from_status(404), ErrorKind::Unknown);
        assert_eq!("rate_limit".parse::<ErrorKind>().unwrap(), ErrorKind::RateLimit);
    }

    #[test]
    fn route_reason_names() {
        assert_eq!(RouteReason::BudgetDowngrade.to_string(), "budget_downgrade");
        assert_eq!(RouteReason::Fallback(ErrorKind::Timeout).to_string(), "fallback:timeout");
        assert_eq!(
            serde_json::to_value(RouteReason::Fallback(ErrorKind::Timeout)).unwrap(),
            serde_json::json!({ "fallback": "timeout" })
        );
    }

    #[test]
    fn simple_task_goes_to_primary_mini() {
        let f = fixture();
        let decision = route(&f.router, "list the files in src");

        assert_eq!(decision.provider, "anthropic");
        assert_eq!(decision.model, "claude-haiku");
        assert_eq!(decision.tier, ModelTier::Mini);
        assert_eq!(decision.reason, RouteReason::Classified);
        assert!(!decision.is_fallback);
        assert_eq!(
            decision.alternatives,
            vec![pair("openai", "gpt-4o-mini"), pair("google", "gemini-flash")]
        );
        assert!(decision.classification.is_some());
        assert_eq!(kinds(&f.events), vec![EventKind::RouteSelected]);
    }

    #[test]
    fn reasoning_task_uses_reasoning_tier() {
        let f = fixture();
        let decision = route(&f.router, "think hard, step by step, about this invariant");

        assert_eq!(decision.tier, ModelTier::Reasoning);
        assert_eq!(decision.model, "claude-opus");
        assert_eq!(decision.alternatives, vec![pair("openai", "o3")]);
    }

    #[test]
    fn vision_task_uses_vision_model() {
        let f = fixture();
        let decision = route(&f.router, "what is wrong in error.png");

        assert_eq!(decision.tier, ModelTier::Vision);
        assert_eq!(decision.model, "claude-sonnet");
        assert!(decision.alternatives.is_empty());
    }

    #[test]
    fn forced_model_skips_classification() {
        let f = fixture();
        let request = RouteRequest::new("think hard about this").with_force_model("gpt-4o");
        let decision = f.router.route(&request).unwrap().unwrap();

        assert_eq!(decision.provider, "openai");
        assert_eq!(decision.tier, ModelTier::Standard);
        assert_eq!(decision.reason, RouteReason::ForcedModel);
        assert!(decision.classification.is_none());
        assert_eq!(
            decision.alternatives,
            vec![pair("anthropic", "claude-sonnet"), pair("google", "gemini-pro")]
        );
    }

    #[test]
    fn unknown_forced_model_is_config_error() {
        let f = fixture();
        let err = f
            .router
            .route(&RouteRequest::new("hi").with_force_model("llama-9000"))
            .unwrap_err();
        assert_eq!(
            err,
            RoutingError::ModelNotConfigured {
                model: "llama-9000".to_owned()
            }
        );
        assert!(err.is_config_error());
    }

    #[test]
    fn forced_tier_without_models_is_config_error() {
        let mut config = config();
        config.providers.get_mut("anthropic").unwrap().vision.clear();
        let f = fixture_with(config);

        let err = f
            .router
            .route(&RouteRequest::new("hi").with_force_tier(ModelTier::Vision))
            .unwrap_err();
        assert_eq!(err, RoutingError::NoModelForTier { tier: ModelTier::Vision });
    }

    #[test]
    fn selected_provider_without_tier_walks_chain() {
        let f = fixture();
        f.router
            .configure_chain(&["google".to_owned(), "openai".to_owned()])
            .unwrap();

        let decision = f
            .router
            .route(&RouteRequest::new("hi").with_force_tier(ModelTier::Reasoning))
            .unwrap()
            .unwrap();
        assert_eq!(decision.provider, "openai");
        assert_eq!(decision.model, "o3");
        assert_eq!(decision.reason, RouteReason::ForcedTier);

        let events = f.events.lock().unwrap();
        assert!(events.contains(&RouterEvent::ProviderFallback {
            from: "google".to_owned(),
            to: "openai".to_owned(),
            reason: "tier_unavailable".to_owned(),
        }));
        assert_eq!(events.last().map(RouterEvent::kind), Some(EventKind::RouteSelected));
    }

    #[test]
    fn tier_walk_keeps_chain_cursor() {
        let f = fixture();
        f.router
            .configure_chain(&["google".to_owned(), "openai".to_owned()])
            .unwrap();
        let request = RouteRequest::new("hi").with_force_tier(ModelTier::Reasoning);

        f.router.route(&request).unwrap().unwrap();
        f.router.route(&request).unwrap().unwrap();
        let simple = route(&f.router, "list the files in src");

        assert_eq!(simple.provider, "google");
        let fallbacks: Vec<_> = f
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == EventKind::ProviderFallback)
            .cloned()
            .collect();
        assert_eq!(fallbacks.len(), 2);
        assert_eq!(f.router.fallback_chain(), vec!["google", "openai"]);
    }

    #[test]
    fn low_confidence_uses_standard_tier() {
        let mut config = config();
        config.classifier.min_confidence = 0.8;
        let f = fixture_with(config);

        let decision = route(&f.router, "hello there");
        assert_eq!(decision.reason, RouteReason::LowConfidence);
        assert_eq!(decision.tier, ModelTier::Standard);
        assert_eq!(decision.model, "claude-sonnet");
    }

    #[test]
    fn low_confidence_prefers_default_model() {
        let mut config = config();
        config.classifier.min_confidence = 0.8;
        config.classifier.default_model = Some("gpt-4o".to_owned());
        let f = fixture_with(config);

        let decision = route(&f.router, "hello there");
        assert_eq!(decision.reason, RouteReason::LowConfidence);
        assert_eq!(decision.provider, "openai");
        assert_eq!(decision.model, "gpt-4o");
        assert!(decision.classification.is_some());
    }

    #[test]
    fn low_confidence_skips_unhealthy_default_model() {
        let mut config = config();
        config.classifier.min_confidence = 0.8;
        config.classifier.default_model = Some("gpt-4o".to_owned());
        let f = fixture_with(config);
        f.router.mark_unhealthy("openai", "outage");

        let decision = route(&f.router, "hello there");
        assert_eq!(decision.reason, RouteReason::LowConfidence);
        assert_eq!(decision.tier, ModelTier::Standard);
        assert_eq!((decision.provider.as_str(), decision.model.as_str()), ("anthropic", "claude-sonnet"));

        f.clock.advance(Duration::from_secs(31));
        let recovered = route(&f.router, "hello there");
        assert_eq!(recovered.model, "gpt-4o");
    }

    #[test]
    fn budget_pressure_downgrades_classified_tier_only() {
        let f = fixture();
        f.router.add_cost(8.5);

        let decision = route(&f.router, "think hard about this design");
        assert_eq!(decision.tier, ModelTier::Standard);
        assert_eq!(decision.reason, RouteReason::BudgetDowngrade);

        let forced = f
            .router
            .route(&RouteRequest::new("think hard").with_force_tier(ModelTier::Reasoning))
            .unwrap()
            .unwrap();
        assert_eq!(forced.tier, ModelTier::Reasoning);
        assert_eq!(forced.reason, RouteReason::ForcedTier);

        assert_eq!(f.router.stats().downgrades, 1);
        assert!(kinds(&f.events).contains(&EventKind::TierDowngraded));
    }

    #[test]
    fn estimated_cost_needs_tokens_and_price() {
        let f = fixture();
        let request = RouteRequest::new("hi")
            .with_force_model("gpt-4o")
            .with_estimated_tokens(1_000_000);
        let decision = f.router.route(&request).unwrap().unwrap();
        assert!((decision.estimated_cost.unwrap() - 2.5).abs() < 1e-9);

        let unpriced = f
            .router
            .route(&RouteRequest::new("hi").with_force_model("o3").with_estimated_tokens(1000))
            .unwrap()
            .unwrap();
        assert_eq!(unpriced.estimated_cost, None);

        let no_tokens = f
            .router
            .route(&RouteRequest::new("hi").with_force_model("gpt-4o"))
            .unwrap()
            .unwrap();
        assert_eq!(no_tokens.estimated_cost, None);
    }

    #[test]
    fn preferred_provider_used_while_healthy() {
        let f = fixture();
        let request = RouteRequest::new("list files").with_preferred_provider("google");
        assert_eq!(f.router.route(&request).unwrap().unwrap().provider, "google");

        f.router.mark_unhealthy("google", "maintenance");
        assert_eq!(f.router.route(&request).unwrap().unwrap().provider, "anthropic");
    }

    #[test]
    fn fallback_walks_alternatives_then_exhausts() {
        let f = fixture();
        let first = route(&f.router, "list the files");

        let second = f.router.fallback_route(&first, ErrorKind::Timeout).unwrap();
        assert_eq!(second.provider, "openai");
        assert_eq!(second.model, "gpt-4o-mini");
        assert!(second.is_fallback);
        assert_eq!(second.reason, RouteReason::Fallback(ErrorKind::Timeout));
        assert_eq!(second.alternatives, vec![pair("google", "gemini-flash")]);

        let third = f.router.fallback_route(&second, ErrorKind::ServerError).unwrap();
        assert_eq!(third.provider, "google");
        assert!(third.alternatives.is_empty());

        assert!(f.router.fallback_route(&third, ErrorKind::RateLimit).is_none());

        let events = f.events.lock().unwrap();
        let exhausted = events.iter().rev().find_map(|e| match e {
            RouterEvent::ChainExhausted { attempted } => Some(attempted.clone()),
            _ => None,
        });
        assert_eq!(exhausted, Some(vec!["google".to_owned()]));
        drop(events);

        let stats = f.router.stats();
        assert_eq!((stats.routes, stats.fallbacks, stats.exhausted), (1, 2, 1));
    }

    #[test]
    fn fallback_skips_unhealthy_alternatives() {
        let f = fixture();
        let first = route(&f.router, "list the files");
        f.router.mark_unhealthy("openai", "maintenance");

        let next = f.router.fallback_route(&first, ErrorKind::Network).unwrap();
        assert_eq!(next.provider, "google");
        assert!(next.alternatives.is_empty());
    }

    #[test]
    fn primary_failures_promote_backup() {
        let f = fixture();
        let decision = route(&f.router, "list the files");

        assert_eq!(
            f.router.record_failure(&decision, ErrorKind::ServerError),
            HealthTransition::Unchanged
        );
        assert_eq!(
            f.router.record_failure(&decision, ErrorKind::ServerError),
            HealthTransition::BecameUnhealthy
        );

        assert_eq!(f.router.fallback_chain(), ["openai", "anthropic", "google"]);
        assert!(f.events.lock().unwrap().contains(&RouterEvent::ProviderPromoted {
            provider: "openai".to_owned(),
            previous_primary: "anthropic".to_owned(),
        }));

        assert_eq!(route(&f.router, "list the files").provider, "openai");
    }

    #[test]
    fn all_unhealthy_routes_nothing_until_cooldown() {
        let f = fixture();
        for provider in ["anthropic", "openai", "google"] {
            f.router.mark_unhealthy(provider, "outage");
        }

        assert_eq!(f.router.route(&RouteRequest::new("list files")).unwrap(), None);
        assert!(kinds(&f.events).contains(&EventKind::ChainExhausted));

        f.clock.advance(Duration::from_secs(31));
        let decision = route(&f.router, "list files");
        assert_eq!(decision.provider, f.router.fallback_chain()[0]);
    }

    #[test]
    fn success_records_health_and_cost() {
        let f = fixture();
        let decision = route(&f.router, "list the files");
        f.router.record_success(&decision, Duration::from_millis(250), 0.25);

        let health = f.router.health("anthropic");
        assert_eq!(health.success_count, 1);
        assert!((health.avg_response_time_ms - 250.0).abs() < 1e-9);
        assert!((f.router.current_cost() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn configure_chain_rejects_bad_lists() {
        let f = fixture();
        assert_eq!(f.router.configure_chain(&[]), Err(RoutingError::EmptyChain));
        assert!(f.router.configure_chain(&["mistral".to_owned()]).is_err());
        assert!(
            f.router
                .configure_chain(&["openai".to_owned(), "openai".to_owned()])
                .is_err()
        );
        assert_eq!(f.router.fallback_chain(), ["anthropic", "openai", "google"]);

        f.router
            .configure_chain(&["google".to_owned(), "anthropic".to_owned()])
            .unwrap();
        assert_eq!(f.router.config().chain.providers, ["google", "anthropic"]);
    }

    #[test]
    fn update_config_is_all_or_nothing() {
        let f = fixture();

        let mut bad = config();
        bad.chain.providers = vec!["mistral".to_owned()];
        assert!(f.router.update_config(bad).unwrap_err().is_config_error());
        assert_eq!(f.router.fallback_chain(), ["anthropic", "openai", "google"]);

        let mut good = config();
        good.chain.providers = vec!["openai".to_owned(), "anthropic".to_owned()];
        good.budget.session_budget = 1.0;
        f.router.update_config(good).unwrap();

        assert_eq!(route(&f.router, "list the files").provider, "openai");
        assert!((f.router.stats().session_budget - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_chain_defaults_to_declaration_order() {
        let mut config = config();
        config.chain.providers.clear();
        let f = fixture_with(config);
        assert_eq!(f.router.fallback_chain(), ["anthropic", "openai", "google"]);
    }

    #[test]
    fn no_providers_is_rejected() {
        let err = SmartRouter::new(Config::default()).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn reset_restores_configured_state() {
        let f = fixture();
        f.router.promote_provider("google").unwrap();
        f.router.mark_unhealthy("openai", "outage");
        f.router.add_cost(3.0);
        route(&f.router, "list files");

        f.router.reset();

        assert_eq!(f.router.fallback_chain(), ["anthropic", "openai", "google"]);
        assert!(f.router.is_healthy("openai"));
        assert!(f.router.current_cost().abs() < f64::EPSILON);
        assert_eq!(f.router.stats().routes, 0);
    }

    #[test]
    fn dispose_drops_listeners() {
        let f = fixture();
        f.router.dispose();
        route(&f.router, "list files");
        assert!(f.events.lock().unwrap().is_empty());
    }

    #[test]
    fn listeners_can_call_back_into_router() {
        let router = Arc::new(SmartRouter::new(config()).unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let weak: Weak<SmartRouter> = Arc::downgrade(&router);
        let sink = Arc::clone(&seen);
        router.subscribe_kind(EventKind::RouteSelected, move |_| {
            if let Some(router) = weak.upgrade() {
                sink.lock().unwrap().push(router.stats().routes);
                router.add_cost(0.01);
            }
        });

        let decision = route(&router, "list files");
        router.record_success(&decision, Duration::from_millis(10), 0.0);
        route(&router, "list files");

        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let f = fixture();
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let id = f.router.subscribe(move |_| *sink.lock().unwrap() += 1);

        route(&f.router, "list files");
        assert!(f.router.unsubscribe(id));
        assert!(!f.router.unsubscribe(id));
        route(&f.router, "list files");

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn concurrent_routing_keeps_totals() {
        let router = Arc::new(SmartRouter::new(config()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let router = Arc::clone(&router);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let decision = route(&router, "list the files");
                        router.record_success(&decision, Duration::from_millis(5), 0.001);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = router.stats();
        assert_eq!(stats.routes, 400);
        assert!((stats.current_cost - 0.4).abs() < 1e-9);
        assert_eq!(router.health("anthropic").success_count, 400);
    }
}
