//! Configuration resolution from files, profiles and the environment.
//!
//! Order: `BOT_CONFIG` (TOML path), else the `BOT_PROFILE` profile; then
//! `LIQUIDATION_*` environment overrides; then `${VAR}` expansion and
//! validation.

use super::BotConfig;
use anyhow::{Context, Result};
use tracing::info;

/// Environment override variables.
pub const ENV_CONFIG: &str = "BOT_CONFIG";
pub const ENV_ENDPOINT: &str = "LIQUIDATION_ENDPOINT";
pub const ENV_SEED: &str = "LIQUIDATION_SEED";
pub const ENV_TARGET: &str = "LIQUIDATION_TARGET";
pub const ENV_STORE: &str = "LIQUIDATION_STORE";
pub const ENV_MODE: &str = "LIQUIDATION_MODE";

/// Resolve the process configuration from the environment.
pub fn load_config() -> Result<BotConfig> {
    let mut config = match std::env::var(ENV_CONFIG) {
        Ok(path) => {
            info!(path = %path, "Loading configuration file");
            BotConfig::from_file(&path).with_context(|| format!("failed to load config {path}"))?
        }
        Err(_) => BotConfig::from_env(),
    };

    config.apply_overrides(|name| std::env::var(name).ok())?;
    config.expand_env_vars();
    config.validate()?;
    Ok(config)
}

impl BotConfig {
    /// Apply `LIQUIDATION_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.chain.endpoint = endpoint;
        }
        if let Some(seed) = lookup(ENV_SEED) {
            self.chain.seed = seed;
        }
        if let Some(target) = lookup(ENV_TARGET) {
            self.liquidation.target = Some(target);
        }
        if let Some(path) = lookup(ENV_STORE) {
            self.store.path = path;
        }
        if let Some(mode) = lookup(ENV_MODE) {
            self.mode = mode
                .parse()
                .with_context(|| format!("invalid {ENV_MODE}"))?;
        }
        Ok(())
    }

    /// Expand `${VAR}` references in string fields.
    pub fn expand_env_vars(&mut self) {
        self.chain.endpoint = expand_env(&self.chain.endpoint);
        self.chain.seed = expand_env(&self.chain.seed);
        self.store.path = expand_env(&self.store.path);
        if let Some(ref mut target) = self.liquidation.target {
            *target = expand_env(target);
        }
    }
}

/// Expand ${VAR_NAME} patterns with environment variable values.
/// Unset variables are left as written.
pub fn expand_env(s: &str) -> String {
    expand_with(s, |name| std::env::var(name).ok())
}

fn expand_with(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };

    re.replace_all(s, |caps: &regex_lite::Captures| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}
