use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails,
    /// or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let config = Self::from_toml_str(&raw)?;

        tracing::debug!(
            path = %path.display(),
            providers = config.providers.len(),
            chain = ?config.chain.providers,
            "configuration loaded"
        );

        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns an error if TOML parsing or validation fails
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if thresholds are out of range, the chain names a
    /// provider without a catalog, or the default model is not listed anywhere
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_health()?;
        self.validate_budget()?;
        self.validate_classifier()?;
        self.validate_chain()?;
        Ok(())
    }

    fn validate_health(&self) -> anyhow::Result<()> {
        if self.health.max_failures == 0 {
            anyhow::bail!("health.max_failures must be at least 1");
        }

        if self.health.max_slow_responses == 0 {
            anyhow::bail!("health.max_slow_responses must be at least 1");
        }

        if self.health.failure_window.is_zero() {
            anyhow::bail!("health.failure_window must be greater than 0");
        }

        Ok(())
    }

    fn validate_budget(&self) -> anyhow::Result<()> {
        if !(self.budget.session_budget.is_finite() && self.budget.session_budget > 0.0) {
            anyhow::bail!("budget.session_budget must be a positive amount");
        }

        if !(self.budget.warning_ratio > 0.0 && self.budget.warning_ratio <= 1.0) {
            anyhow::bail!("budget.warning_ratio must be in (0, 1]");
        }

        Ok(())
    }

    fn validate_classifier(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.classifier.min_confidence) {
            anyhow::bail!("classifier.min_confidence must be in [0, 1]");
        }

        if let Some(ref model) = self.classifier.default_model
            && self.provider_for_model(model).is_none()
        {
            anyhow::bail!("classifier.default_model '{model}' is not listed by any provider");
        }

        Ok(())
    }

    fn validate_chain(&self) -> anyhow::Result<()> {
        for (i, provider) in self.chain.providers.iter().enumerate() {
            if !self.providers.contains_key(provider) {
                anyhow::bail!("chain provider '{provider}' has no [providers.{provider}] catalog");
            }

            if self.chain.providers[..i].contains(provider) {
                anyhow::bail!("chain provider '{provider}' is listed more than once");
            }
        }

        for (name, catalog) in &self.providers {
            if catalog.is_empty() {
                anyhow::bail!("provider '{name}' lists no models");
            }
        }

        Ok(())
    }
}
