//! Ordered provider fallback chain with automatic promotion
//!
//! Position 0 is the primary. Selection scans forward from a cursor,
//! wrapping once, and returns the first provider the health tracker reports
//! healthy (which includes providers whose cooldown has elapsed).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::RoutingError;
use crate::events::{EventBus, RouterEvent};
use crate::health::ProviderHealthTracker;

#[derive(Debug, Default)]
struct ChainState {
    providers: Vec<String>,
    current_index: usize,
    /// Provider handed out by the last successful selection
    active: Option<String>,
}

/// Ordered list of providers tried in turn
pub struct FallbackChain {
    state: RwLock<ChainState>,
    auto_promote: AtomicBool,
    health: Arc<ProviderHealthTracker>,
    events: Arc<EventBus>,
}

impl FallbackChain {
    /// Create an empty chain; call [`FallbackChain::set_chain`] before selecting
    pub fn new(health: Arc<ProviderHealthTracker>, events: Arc<EventBus>, auto_promote: bool) -> Self {
        Self {
            state: RwLock::new(ChainState::default()),
            auto_promote: AtomicBool::new(auto_promote),
            health,
            events,
        }
    }

    /// Replace the provider order and reset the cursor to the new primary
    pub fn set_chain(&self, providers: &[String]) -> Result<(), RoutingError> {
        if providers.is_empty() {
            return Err(RoutingError::EmptyChain);
        }

        for (i, provider) in providers.iter().enumerate() {
            if providers[..i].contains(provider) {
                return Err(RoutingError::Config(format!(
                    "provider '{provider}' appears more than once in the chain"
                )));
            }
        }

        for provider in providers {
            self.health.register(provider);
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state = ChainState {
            providers: providers.to_vec(),
            current_index: 0,
            active: None,
        };
        drop(state);

        tracing::info!(chain = ?providers, "fallback chain configured");
        Ok(())
    }

    /// Providers in current preference order
    pub fn providers(&self) -> Vec<String> {
        self.read().providers.clone()
    }

    /// Provider at position 0
    pub fn primary(&self) -> Option<String> {
        self.read().providers.first().cloned()
    }

    /// Provider under the cursor
    pub fn current(&self) -> Option<String> {
        let state = self.read();
        state.providers.get(state.current_index).cloned()
    }

    /// Whether a provider is a member of the chain
    pub fn contains(&self, provider: &str) -> bool {
        self.read().providers.iter().any(|p| p == provider)
    }

    pub fn set_auto_promote(&self, enabled: bool) {
        self.auto_promote.store(enabled, Ordering::Relaxed);
    }

    pub fn auto_promote(&self) -> bool {
        self.auto_promote.load(Ordering::Relaxed)
    }

    /// Select the first usable provider at or after the cursor
    ///
    /// With `skip_current` the scan starts after the cursor and never returns
    /// the provider under it; the cursor then moves to the selection.
    /// Repeated calls with no health or order change return the same provider.
    /// Returns `None` and signals `chain:exhausted` when no provider is usable.
    pub fn next_provider(&self, skip_current: bool) -> Option<String> {
        let mut events = Vec::with_capacity(1);

        let selected = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            let len = state.providers.len();
            if len == 0 {
                return None;
            }

            let cursor = state.current_index.min(len - 1);
            let (start, span) = if skip_current { (cursor + 1, len - 1) } else { (cursor, len) };

            let found = (0..span)
                .map(|offset| (start + offset) % len)
                .find(|&idx| self.health.is_healthy(&state.providers[idx]));

            match found {
                Some(idx) => {
                    let selected = state.providers[idx].clone();
                    let previous = state
                        .active
                        .clone()
                        .unwrap_or_else(|| state.providers[cursor].clone());

                    if previous != selected {
                        let reason = if skip_current {
                            "skip_current"
                        } else if self.health.is_healthy(&previous) {
                            "restored"
                        } else {
                            "unhealthy"
                        };
                        events.push(RouterEvent::ProviderFallback {
                            from: previous,
                            to: selected.clone(),
                            reason: reason.to_owned(),
                        });
                    }

                    if skip_current {
                        state.current_index = idx;
                    }
                    state.active = Some(selected.clone());
                    Some(selected)
                }
                None => {
                    events.push(RouterEvent::ChainExhausted {
                        attempted: state.providers.clone(),
                    });
                    None
                }
            }
        };

        match (&selected, events.first()) {
            (Some(provider), Some(RouterEvent::ProviderFallback { from, reason, .. })) => {
                tracing::info!(from = %from, to = %provider, reason = %reason, "falling back to next provider");
            }
            (None, _) => tracing::warn!("all providers in the fallback chain are unhealthy"),
            _ => {}
        }

        self.events.emit_all(events);
        selected
    }

    /// Move a provider to the primary position
    ///
    /// Returns `Ok(false)` if it already is the primary.
    pub fn promote(&self, provider: &str) -> Result<bool, RoutingError> {
        let previous_primary = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            let idx = state
                .providers
                .iter()
                .position(|p| p == provider)
                .ok_or_else(|| RoutingError::NotInChain {
                    provider: provider.to_owned(),
                })?;

            if idx == 0 {
                return Ok(false);
            }

            let promoted = state.providers.remove(idx);
            let previous = state.providers[0].clone();
            state.providers.insert(0, promoted);
            state.current_index = 0;
            previous
        };

        tracing::info!(provider, previous_primary = %previous_primary, "provider promoted to primary");
        self.events.emit(&RouterEvent::ProviderPromoted {
            provider: provider.to_owned(),
            previous_primary,
        });
        Ok(true)
    }

    /// React to a provider turning unhealthy
    ///
    /// When auto-promotion is enabled and the provider is the primary, the
    /// first healthy provider behind it becomes the new primary. Returns the
    /// promoted provider, if any.
    pub fn handle_unhealthy(&self, provider: &str) -> Option<String> {
        if !self.auto_promote() {
            return None;
        }

        let candidate = {
            let state = self.read();
            if state.providers.first().is_none_or(|p| p != provider) {
                return None;
            }
            state
                .providers
                .iter()
                .skip(1)
                .find(|p| self.health.is_healthy(p))
                .cloned()
        };

        let Some(candidate) = candidate else {
            tracing::warn!(provider, "primary unhealthy and no healthy backup to promote");
            return None;
        };

        // The chain may have been reordered concurrently; promotion re-checks membership
        match self.promote(&candidate) {
            Ok(true) => Some(candidate),
            Ok(false) | Err(_) => None,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ChainState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("FallbackChain")
            .field("providers", &state.providers)
            .field("current_index", &state.current_index)
            .field("auto_promote", &self.auto_promote())
            .finish_non_exhaustive()
    }
}
