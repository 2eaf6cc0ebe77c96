//! Text output for decisions and classifications

use std::fmt::Write as _;

use waypoint_routing::{ClassificationResult, RouteDecision};

/// One-line summary, e.g. `anthropic/claude-haiku [mini, classified]`
pub fn decision_line(decision: &RouteDecision) -> String {
    let mut line = format!(
        "{}/{} [{}, {}]",
        decision.provider, decision.model, decision.tier, decision.reason
    );
    if let Some(cost) = decision.estimated_cost {
        let _ = write!(line, " ~${cost:.4}");
    }
    line
}

pub fn describe_decision(decision: &RouteDecision) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "provider:     {}", decision.provider);
    let _ = writeln!(out, "model:        {}", decision.model);
    let _ = writeln!(out, "tier:         {}", decision.tier);
    let _ = writeln!(out, "reason:       {}", decision.reason);

    let alternatives = if decision.alternatives.is_empty() {
        "none".to_owned()
    } else {
        decision
            .alternatives
            .iter()
            .map(|(provider, model)| format!("{provider}/{model}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let _ = writeln!(out, "alternatives: {alternatives}");

    if let Some(cost) = decision.estimated_cost {
        let _ = writeln!(out, "est. cost:    ${cost:.4}");
    }
    if let Some(ref classification) = decision.classification {
        out.push_str(&describe_classification(classification));
    }
    out
}

pub fn describe_classification(result: &ClassificationResult) -> String {
    let mut needs = Vec::new();
    if result.requires_vision {
        needs.push("vision");
    }
    if result.requires_reasoning {
        needs.push("reasoning");
    }
    if result.requires_long_context {
        needs.push("long-context");
    }
    let needs = if needs.is_empty() { "-".to_owned() } else { needs.join(", ") };

    let mut out = String::new();
    let _ = writeln!(out, "complexity:   {}", result.complexity);
    let _ = writeln!(out, "needs:        {needs}");
    let _ = writeln!(out, "tokens:       ~{}", result.estimated_tokens);
    let _ = writeln!(out, "confidence:   {:.2}", result.confidence);
    out
}
