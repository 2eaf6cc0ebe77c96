//! Scripted request sequences against a simulated clock
//!
//! A script is a TOML file of `[[step]]` tables. Each step may advance the
//! clock, apply operator actions and route one task, feeding back an outcome
//! per attempt. Failed attempts retry on the decision's alternatives.
//!
//! ```toml
//! [[step]]
//! task = "list the files in src"
//! outcomes = ["timeout", "success"]
//! latency = "800ms"
//! cost = 0.002
//!
//! [[step]]
//! advance = "45s"
//! task = "think hard about the migration plan"
//! ```

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use waypoint_config::Config;
use waypoint_routing::{
    ClassificationHints, ErrorKind, ManualClock, ModelTier, RouteDecision, RouteRequest, RouterStats, SmartRouter,
};

use crate::render;

const DEFAULT_LATENCY: Duration = Duration::from_millis(500);

/// Parsed replay script
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// One scripted step; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Move the simulated clock forward before anything else
    #[serde(default, deserialize_with = "optional_duration")]
    pub advance: Option<Duration>,
    pub mark_unhealthy: Option<String>,
    pub reset_provider: Option<String>,
    pub promote: Option<String>,
    pub add_cost: Option<f64>,

    /// Task to route
    pub task: Option<String>,
    pub force_model: Option<String>,
    pub force_tier: Option<ModelTier>,
    pub prefer: Option<String>,
    pub tokens: Option<u64>,
    #[serde(default)]
    pub image: bool,

    /// Outcome per attempt; attempts past the end of the list succeed
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
    #[serde(default, deserialize_with = "optional_duration")]
    pub latency: Option<Duration>,
    /// Spend recorded on the successful attempt
    #[serde(default)]
    pub cost: f64,
}

/// Result fed back for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Outcome {
    Success,
    Failure(ErrorKind),
}

impl TryFrom<String> for Outcome {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        if raw == "success" {
            return Ok(Self::Success);
        }
        raw.parse::<ErrorKind>()
            .map(Self::Failure)
            .map_err(|_| format!("unknown outcome '{raw}', expected 'success' or an error kind"))
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failure(kind) => write!(f, "{kind}"),
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Serialize)]
struct AttemptRecord<'a> {
    step: usize,
    attempt: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<&'a RouteDecision>,
    outcome: Option<Outcome>,
}

impl Script {
    /// Read and parse a script file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid script
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read replay script {}: {e}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Parse a script from TOML
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or names unknown fields
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).map_err(|e| anyhow::anyhow!("failed to parse replay script: {e}"))
    }
}

/// Run a script and print each attempt, then the final stats
///
/// # Errors
///
/// Returns an error if the router rejects the configuration, a step names a
/// model or provider the configuration does not know, or output fails
pub fn run(config: Config, script: &Script, json: bool, out: &mut impl Write) -> anyhow::Result<RouterStats> {
    let clock = Arc::new(ManualClock::new());
    let router = SmartRouter::with_clock(config, clock.clone())?;
    waypoint_telemetry::attach(&router);

    for (index, step) in script.steps.iter().enumerate() {
        let number = index + 1;

        if let Some(by) = step.advance {
            clock.advance(by);
            tracing::debug!(step = number, advanced_ms = by.as_millis(), "clock advanced");
        }
        if let Some(ref provider) = step.mark_unhealthy {
            router.mark_unhealthy(provider, "replay");
        }
        if let Some(ref provider) = step.reset_provider {
            router.reset_provider(provider);
        }
        if let Some(ref provider) = step.promote {
            router.promote_provider(provider)?;
        }
        if let Some(delta) = step.add_cost {
            router.add_cost(delta);
        }

        if let Some(ref task) = step.task {
            run_request(&router, number, step, task, json, out)?;
        }
    }

    let stats = router.stats();
    if json {
        writeln!(out, "{}", serde_json::to_string(&stats)?)?;
    } else {
        writeln!(out)?;
        write!(out, "{}", waypoint_routing::format_stats(&stats))?;
    }
    Ok(stats)
}

fn run_request(
    router: &SmartRouter,
    number: usize,
    step: &Step,
    task: &str,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let request = build_request(step, task);
    let latency = step.latency.unwrap_or(DEFAULT_LATENCY);

    let Some(mut decision) = router.route(&request)? else {
        print_attempt(out, json, number, 1, None, None)?;
        return Ok(());
    };

    let mut outcomes = step.outcomes.iter().copied();
    for attempt in 1.. {
        let outcome = outcomes.next().unwrap_or(Outcome::Success);
        print_attempt(out, json, number, attempt, Some(&decision), Some(outcome))?;

        match outcome {
            Outcome::Success => {
                router.record_success(&decision, latency, step.cost);
                break;
            }
            Outcome::Failure(kind) => match router.fallback_route(&decision, kind) {
                Some(next) => decision = next,
                None => {
                    print_attempt(out, json, number, attempt + 1, None, None)?;
                    break;
                }
            },
        }
    }
    Ok(())
}

fn build_request(step: &Step, task: &str) -> RouteRequest {
    let mut request = RouteRequest::new(task).with_hints(ClassificationHints {
        has_images: step.image,
        ..ClassificationHints::default()
    });
    if let Some(ref model) = step.force_model {
        request = request.with_force_model(model.as_str());
    }
    if let Some(tier) = step.force_tier {
        request = request.with_force_tier(tier);
    }
    if let Some(ref provider) = step.prefer {
        request = request.with_preferred_provider(provider.as_str());
    }
    if let Some(tokens) = step.tokens {
        request = request.with_estimated_tokens(tokens);
    }
    request
}

fn print_attempt(
    out: &mut impl Write,
    json: bool,
    step: usize,
    attempt: usize,
    decision: Option<&RouteDecision>,
    outcome: Option<Outcome>,
) -> anyhow::Result<()> {
    if json {
        let record = AttemptRecord {
            step,
            attempt,
            decision,
            outcome,
        };
        writeln!(out, "{}", serde_json::to_string(&record)?)?;
        return Ok(());
    }

    match (decision, outcome) {
        (Some(decision), Some(outcome)) => {
            writeln!(out, "step {step}.{attempt}: {} -> {outcome}", render::decision_line(decision))?;
        }
        _ => writeln!(out, "step {step}.{attempt}: no healthy provider")?,
    }
    Ok(())
}

fn optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    duration_str::parse(&raw)
        .map(Some)
        .map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
}
