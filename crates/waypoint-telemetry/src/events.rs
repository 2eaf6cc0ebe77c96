//! Router events as log lines

use waypoint_routing::{EventKind, RouterEvent, SmartRouter, SubscriptionId};

/// Log target for bridged router events
pub const EVENT_TARGET: &str = "waypoint::events";

/// Severity a router event is logged at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    Debug,
    Info,
    Warn,
}

pub const fn severity(kind: EventKind) -> EventSeverity {
    match kind {
        EventKind::ProviderSuccess | EventKind::RouteSelected => EventSeverity::Debug,
        EventKind::ProviderUnhealthy | EventKind::ChainExhausted | EventKind::BudgetExceeded => EventSeverity::Warn,
        EventKind::ProviderFailure
        | EventKind::ProviderRecovered
        | EventKind::ProviderPromoted
        | EventKind::ProviderFallback
        | EventKind::BudgetWarning
        | EventKind::TierDowngraded => EventSeverity::Info,
    }
}

/// Emit one router event as a structured log line
pub fn log_event(event: &RouterEvent) {
    let kind = event.kind();
    let payload = serde_json::to_string(event).unwrap_or_default();

    match severity(kind) {
        EventSeverity::Debug => tracing::debug!(target: EVENT_TARGET, event = %kind, payload = %payload, "router event"),
        EventSeverity::Info => tracing::info!(target: EVENT_TARGET, event = %kind, payload = %payload, "router event"),
        EventSeverity::Warn => tracing::warn!(target: EVENT_TARGET, event = %kind, payload = %payload, "router event"),
    }
}

/// Subscribe [`log_event`] to every event a router raises
pub fn attach(router: &SmartRouter) -> SubscriptionId {
    router.subscribe(log_event)
}
