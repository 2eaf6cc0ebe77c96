//! Heuristic task classification
//!
//! Maps a task description to a complexity and capability profile using
//! keyword patterns and length. No model call, no state: the same text and
//! hints always produce the same result.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use waypoint_config::ClassifierConfig;

/// Confidence when signals agree
const BASELINE_CONFIDENCE: f64 = 0.9;

/// Confidence when nothing in the text pointed anywhere
const NO_SIGNAL_CONFIDENCE: f64 = 0.7;

/// Confidence when a "simple" cue and a reasoning cue co-occur
const AMBIGUOUS_CONFIDENCE: f64 = 0.5;

/// Complexity level for routing decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    ReasoningHeavy,
}

/// Caller-supplied facts the text alone cannot reveal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationHints {
    /// The request carries image attachments
    pub has_images: bool,
    /// Tokens of context sent along with the task (files, history)
    pub context_tokens: Option<u64>,
    /// Lower bound on the computed complexity
    pub min_complexity: Option<Complexity>,
}

/// Profile of a task for routing decisions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ClassificationResult {
    pub complexity: Complexity,
    pub requires_vision: bool,
    pub requires_reasoning: bool,
    pub requires_long_context: bool,
    /// Roughly four characters per token
    pub estimated_tokens: u64,
    /// How much the signals agree, in `[0, 1]`
    pub confidence: f64,
}

static IMAGE_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(?:png|jpe?g|gif|webp)\b").expect("must be valid regex"));

static VISUAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:screenshots?|diagrams?|images?|pictures?|photos?|charts?|mockups?|wireframes?)\b")
        .expect("must be valid regex")
});

static REASONING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:think|megathink|ultrathink|deeply|think hard|step[- ]by[- ]step|reason through|prove)\b")
        .expect("must be valid regex")
});

static COMPLEX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:analy[sz]e|analysis|refactor(?:ing)?|architecture|architectural|redesign|optimi[sz]e|investigate|migrate|migration|trade-?offs?|security audit)\b",
    )
    .expect("must be valid regex")
});

static SIMPLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:list|show|print|rename|format|typo|quick(?:ly)?|simple|just|what is)\b")
        .expect("must be valid regex")
});

/// Classify with default tuning
pub fn classify(text: &str, hints: Option<&ClassificationHints>) -> ClassificationResult {
    TaskClassifier::new(ClassifierConfig::default()).classify(text, hints)
}

/// Rough token estimate: one token per four characters, rounded up
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Task classifier with configured thresholds
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    config: ClassifierConfig,
}

impl TaskClassifier {
    pub const fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Whether a result is trustworthy enough to route on
    pub fn is_confident(&self, result: &ClassificationResult) -> bool {
        result.confidence >= self.config.min_confidence
    }

    /// Classify a task description
    pub fn classify(&self, text: &str, hints: Option<&ClassificationHints>) -> ClassificationResult {
        let default_hints = ClassificationHints::default();
        let hints = hints.unwrap_or(&default_hints);

        let estimated_tokens = estimate_tokens(text);

        let requires_vision = hints.has_images || IMAGE_FILE_RE.is_match(text) || VISUAL_RE.is_match(text);

        let reasoning_signal = REASONING_RE.is_match(text);
        let complex_signal = COMPLEX_RE.is_match(text);
        let simple_signal = SIMPLE_RE.is_match(text);
        let too_long = text.chars().count() > self.config.complex_length;

        let mut complexity = if reasoning_signal {
            Complexity::ReasoningHeavy
        } else if complex_signal || too_long {
            Complexity::Complex
        } else {
            Complexity::Simple
        };

        if let Some(floor) = hints.min_complexity {
            complexity = complexity.max(floor);
        }

        let requires_reasoning = complexity >= Complexity::Complex;

        let context_tokens = estimated_tokens + hints.context_tokens.unwrap_or(0);
        let requires_long_context = context_tokens > self.config.long_context_tokens;

        let confidence = if simple_signal && (reasoning_signal || complex_signal) {
            AMBIGUOUS_CONFIDENCE
        } else if !(simple_signal || reasoning_signal || complex_signal || too_long || requires_vision) {
            NO_SIGNAL_CONFIDENCE
        } else {
            BASELINE_CONFIDENCE
        };

        tracing::debug!(
            complexity = %complexity,
            requires_vision,
            requires_reasoning,
            requires_long_context,
            estimated_tokens,
            confidence,
            "task classified"
        );

        ClassificationResult {
            complexity,
            requires_vision,
            requires_reasoning,
            requires_long_context,
            estimated_tokens,
            confidence,
        }
    }
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}
