//! Router statistics snapshot and text rendering

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::health::ProviderHealth;

/// Running totals of routing outcomes
#[derive(Debug, Default)]
pub(crate) struct RouteCounters {
    routes: AtomicU64,
    fallbacks: AtomicU64,
    downgrades: AtomicU64,
    exhausted: AtomicU64,
}

impl RouteCounters {
    pub(crate) fn route(&self) {
        self.routes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn downgrade(&self) {
        self.downgrades.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        for counter in [&self.routes, &self.fallbacks, &self.downgrades, &self.exhausted] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.routes.load(Ordering::Relaxed),
            self.fallbacks.load(Ordering::Relaxed),
            self.downgrades.load(Ordering::Relaxed),
            self.exhausted.load(Ordering::Relaxed),
        )
    }
}

/// Point-in-time view of the whole routing layer
#[derive(Debug, Clone, Serialize)]
pub struct RouterStats {
    /// Chain in current preference order
    pub chain: Vec<String>,
    pub primary: Option<String>,
    pub auto_promote: bool,
    pub providers: Vec<ProviderHealth>,
    pub current_cost: f64,
    pub session_budget: f64,
    pub budget_utilization: f64,
    /// Primary routes returned by `route`
    pub routes: u64,
    /// Routes returned by `fallback_route`
    pub fallbacks: u64,
    pub downgrades: u64,
    /// Requests for which no provider was available
    pub exhausted: u64,
}

impl RouterStats {
    /// Render as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Render stats as a fixed-width text table
pub fn format_stats(stats: &RouterStats) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "chain: {}", stats.chain.join(" -> "));
    let _ = writeln!(
        out,
        "budget: ${:.4} / ${:.2} ({:.1}%)",
        stats.current_cost,
        stats.session_budget,
        stats.budget_utilization * 100.0
    );
    let _ = writeln!(
        out,
        "routes: {}  fallbacks: {}  downgrades: {}  exhausted: {}",
        stats.routes, stats.fallbacks, stats.downgrades, stats.exhausted
    );
    let _ = writeln!(
        out,
        "{:<16} {:<10} {:>8} {:>8} {:>8} {:>10}",
        "provider", "state", "ok", "failed", "total", "avg_ms"
    );

    for health in &stats.providers {
        let _ = writeln!(
            out,
            "{:<16} {:<10} {:>8} {:>8} {:>8} {:>10.1}",
            health.provider,
            health.state.to_string(),
            health.success_count,
            health.failure_count,
            health.total_requests,
            health.avg_response_time_ms
        );
    }

    out
}
