use serde::Deserialize;

/// Task classifier tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Classifications below this confidence are not trusted
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Character length above which a task counts as complex
    #[serde(default = "default_complex_length")]
    pub complex_length: usize,
    /// Token estimate above which a task needs a long-context model
    #[serde(default = "default_long_context_tokens")]
    pub long_context_tokens: u64,
    /// Model used when a classification is not trusted
    #[serde(default)]
    pub default_model: Option<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            complex_length: default_complex_length(),
            long_context_tokens: default_long_context_tokens(),
            default_model: None,
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_min_confidence() -> f64 {
    0.6
}

#[allow(clippy::missing_const_for_fn)]
fn default_complex_length() -> usize {
    500
}

#[allow(clippy::missing_const_for_fn)]
fn default_long_context_tokens() -> u64 {
    30_000
}
