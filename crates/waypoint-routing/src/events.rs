//! Synchronous event delivery for routing signals
//!
//! Listeners run on the thread that raised the event, after the component
//! has released its internal locks and before the triggering call returns,
//! so a listener observes state exactly as it was when the signal fired and
//! may call back into the router without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use waypoint_config::ModelTier;

use crate::RouteReason;

/// Canonical signal names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter)]
pub enum EventKind {
    #[strum(serialize = "provider:success")]
    ProviderSuccess,
    #[strum(serialize = "provider:failure")]
    ProviderFailure,
    #[strum(serialize = "provider:unhealthy")]
    ProviderUnhealthy,
    #[strum(serialize = "provider:recovered")]
    ProviderRecovered,
    #[strum(serialize = "provider:promoted")]
    ProviderPromoted,
    #[strum(serialize = "provider:fallback")]
    ProviderFallback,
    #[strum(serialize = "chain:exhausted")]
    ChainExhausted,
    #[strum(serialize = "budget:warning")]
    BudgetWarning,
    #[strum(serialize = "budget:exceeded")]
    BudgetExceeded,
    #[strum(serialize = "tier:downgraded")]
    TierDowngraded,
    #[strum(serialize = "route:selected")]
    RouteSelected,
}

/// A routing signal and its payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RouterEvent {
    ProviderSuccess {
        provider: String,
        response_time_ms: u64,
    },
    ProviderFailure {
        provider: String,
        error: String,
        /// Failures currently inside the window, including this one
        failure_count: usize,
    },
    ProviderUnhealthy {
        provider: String,
        reason: String,
        failure_count: usize,
    },
    ProviderRecovered {
        provider: String,
    },
    ProviderPromoted {
        provider: String,
        previous_primary: String,
    },
    ProviderFallback {
        from: String,
        to: String,
        reason: String,
    },
    ChainExhausted {
        attempted: Vec<String>,
    },
    BudgetWarning {
        current_cost: f64,
        session_budget: f64,
    },
    BudgetExceeded {
        current_cost: f64,
        session_budget: f64,
    },
    TierDowngraded {
        from: ModelTier,
        to: ModelTier,
        current_cost: f64,
    },
    RouteSelected {
        provider: String,
        model: String,
        tier: ModelTier,
        reason: RouteReason,
        is_fallback: bool,
    },
}

impl RouterEvent {
    /// Signal name of this event
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ProviderSuccess { .. } => EventKind::ProviderSuccess,
            Self::ProviderFailure { .. } => EventKind::ProviderFailure,
            Self::ProviderUnhealthy { .. } => EventKind::ProviderUnhealthy,
            Self::ProviderRecovered { .. } => EventKind::ProviderRecovered,
            Self::ProviderPromoted { .. } => EventKind::ProviderPromoted,
            Self::ProviderFallback { .. } => EventKind::ProviderFallback,
            Self::ChainExhausted { .. } => EventKind::ChainExhausted,
            Self::BudgetWarning { .. } => EventKind::BudgetWarning,
            Self::BudgetExceeded { .. } => EventKind::BudgetExceeded,
            Self::TierDowngraded { .. } => EventKind::TierDowngraded,
            Self::RouteSelected { .. } => EventKind::RouteSelected,
        }
    }
}

/// Callback invoked for every matching event
pub type Listener = Arc<dyn Fn(&RouterEvent) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kind: Option<EventKind>,
    listener: Listener,
}

/// Registry of event listeners
pub struct EventBus {
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl EventBus {
    /// Create a bus with no listeners
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    /// Receive every event
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&RouterEvent) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(listener))
    }

    /// Receive only events of one kind
    pub fn subscribe_kind<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&RouterEvent) + Send + Sync + 'static,
    {
        self.insert(Some(kind), Arc::new(listener))
    }

    /// Remove a listener; returns `false` if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Drop every listener
    pub fn clear(&self) {
        self.subscriptions.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.subscriptions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Deliver an event to every matching listener
    pub fn emit(&self, event: &RouterEvent) {
        let kind = event.kind();
        tracing::trace!(event = %kind, "emitting router event");

        // Snapshot the listeners so callbacks may (un)subscribe re-entrantly
        let listeners: Vec<Listener> = self
            .subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.kind.is_none_or(|k| k == kind))
            .map(|s| Arc::clone(&s.listener))
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    /// Deliver a batch of events in order
    pub fn emit_all(&self, events: impl IntoIterator<Item = RouterEvent>) {
        for event in events {
            self.emit(&event);
        }
    }

    fn insert(&self, kind: Option<EventKind>, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscription { id, kind, listener });
        id
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}
