use serde::Deserialize;

/// Fallback chain configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    /// Provider ids in preference order; the first entry is the primary
    #[serde(default)]
    pub providers: Vec<String>,
    /// Promote the next healthy provider when the primary becomes unhealthy
    #[serde(default = "default_auto_promote")]
    pub auto_promote: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            auto_promote: default_auto_promote(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_auto_promote() -> bool {
    true
}
