//! Shared router setup for scenario tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use waypoint_config::Config;
use waypoint_routing::{EventKind, ManualClock, RouteDecision, RouteRequest, RouterEvent, SmartRouter};

/// Three providers with distinct models per tier
///
/// Health: 3 failures in 10s open a circuit for 5s; two responses of 2s or
/// more in a row count as an outage.
pub const CONFIG: &str = r#"
[health]
max_failures = 3
failure_window = "10s"
cooldown = "5s"
slow_threshold = "2s"
max_slow_responses = 2

[chain]
providers = ["alpha", "beta", "gamma"]

[budget]
session_budget = 10.0

[providers.alpha]
mini = ["alpha-mini"]
standard = ["alpha-std"]
reasoning = ["alpha-think"]
vision = ["alpha-eye"]

[providers.beta]
mini = ["beta-mini"]
standard = ["beta-std"]
reasoning = ["beta-think"]

[providers.gamma]
mini = ["gamma-mini"]
standard = ["gamma-std"]

[pricing]
"alpha-std" = 3.0
"beta-std" = 1.0
"#;

pub struct Harness {
    pub router: Arc<SmartRouter>,
    pub clock: Arc<ManualClock>,
    events: Arc<Mutex<Vec<RouterEvent>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::from_toml(CONFIG)
    }

    pub fn from_toml(raw: &str) -> Self {
        Self::with_config(Config::from_toml_str(raw).unwrap())
    }

    pub fn with_config(config: Config) -> Self {
        let clock = Arc::new(ManualClock::new());
        let router = Arc::new(SmartRouter::with_clock(config, clock.clone()).unwrap());

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        router.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        Self { router, clock, events }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn route(&self, task: &str) -> Option<RouteDecision> {
        self.router.route(&RouteRequest::new(task)).unwrap()
    }

    /// A decision pinned to a provider's mini model
    pub fn decision_for(&self, provider: &str) -> RouteDecision {
        let request = RouteRequest::new("ping").with_force_model(format!("{provider}-mini"));
        self.router.route(&request).unwrap().unwrap()
    }

    pub fn fail(&self, provider: &str, times: usize) {
        let decision = self.decision_for(provider);
        for _ in 0..times {
            self.router
                .record_failure(&decision, waypoint_routing::ErrorKind::ServerError);
        }
    }

    pub fn events(&self) -> Vec<RouterEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_of(&self, kind: EventKind) -> Vec<RouterEvent> {
        self.events().into_iter().filter(|e| e.kind() == kind).collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }
}
