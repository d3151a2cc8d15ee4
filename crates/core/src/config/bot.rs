//! Configuration management with profile support.
//!
//! Provides centralized configuration for all bot parameters with
//! support for different profiles (testing, production).

use crate::calculator::LiquidationFreeAssets;
use crate::scanner::ScannerConfig;
use liquidation_chain::CurrencyId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure containing all bot parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Which loops to run
    #[serde(default)]
    pub mode: RunMode,

    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub liquidation: LiquidationConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Process mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Scan and liquidate.
    #[default]
    Full,
    /// Scan and fill the store only; no signing agent.
    ScanOnly,
}

impl FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "scan-only" | "scan_only" | "scanner" => Ok(Self::ScanOnly),
            other => anyhow::bail!("unknown run mode '{other}' (expected full or scan-only)"),
        }
    }
}

/// Node connection and signing credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// WebSocket endpoint; `${VAR}` references are expanded
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Secret URI of the liquidation agent
    #[serde(default = "default_seed")]
    pub seed: String,
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:9948".to_string()
}
fn default_seed() -> String {
    "//Alice//stash".to_string()
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            seed: default_seed(),
        }
    }
}

impl std::fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainConfig")
            .field("endpoint", &self.endpoint)
            .field("seed", &"<redacted>")
            .finish()
    }
}

/// Loop periods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Scan loop period (seconds)
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Liquidate loop period (seconds)
    #[serde(default = "default_liquidate_interval")]
    pub liquidate_interval_secs: u64,
}

fn default_scan_interval() -> u64 {
    60
}
fn default_liquidate_interval() -> u64 {
    25
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            liquidate_interval_secs: default_liquidate_interval(),
        }
    }
}

impl SchedulerConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
    pub fn liquidate_interval(&self) -> Duration {
        Duration::from_secs(self.liquidate_interval_secs)
    }
}

/// Liquidation selection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Minimum repay in whole tokens worth queueing
    #[serde(default = "default_low_repay_threshold")]
    pub low_repay_threshold: u64,

    /// Concurrent liquidity queries per scan
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,

    /// Borrower liquidated once at startup
    #[serde(default)]
    pub target: Option<String>,

    /// Currencies never seized as collateral
    #[serde(default)]
    pub liquidation_free_collaterals: Vec<CurrencyId>,

    /// Currency whose debt is valued from the reported lf shortfall
    #[serde(default)]
    pub liquidation_free_debt: Option<CurrencyId>,
}

fn default_low_repay_threshold() -> u64 {
    1
}
fn default_scan_concurrency() -> usize {
    32
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            low_repay_threshold: default_low_repay_threshold(),
            scan_concurrency: default_scan_concurrency(),
            target: None,
            liquidation_free_collaterals: Vec::new(),
            liquidation_free_debt: None,
        }
    }
}

/// Task store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "liquidation.json".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            mode: RunMode::default(),
            chain: ChainConfig::default(),
            scheduler: SchedulerConfig::default(),
            liquidation: LiquidationConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Fast loops and no dust filter, for local dev chains.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            scheduler: SchedulerConfig {
                scan_interval_secs: 10,
                liquidate_interval_secs: 5,
            },
            liquidation: LiquidationConfig {
                low_repay_threshold: 0, // queue everything
                scan_concurrency: 8,
                ..Default::default()
            },
            store: StoreConfig {
                path: "liquidation-testing.json".to_string(),
            },
            ..Default::default()
        }
    }

    /// Default periods with a wider fan-out.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            liquidation: LiquidationConfig {
                scan_concurrency: 64,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Profile named by BOT_PROFILE, or default.
    /// Supported values: testing, production
    pub fn from_env() -> Self {
        let profile = std::env::var("BOT_PROFILE").unwrap_or_else(|_| "default".to_string());
        Self::from_profile(&profile)
    }

    pub fn from_profile(profile: &str) -> Self {
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        }
    }

    /// Reject values the loops cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.scheduler.scan_interval_secs > 0,
            "scheduler.scan_interval_secs must be positive"
        );
        anyhow::ensure!(
            self.scheduler.liquidate_interval_secs > 0,
            "scheduler.liquidate_interval_secs must be positive"
        );
        anyhow::ensure!(
            !self.chain.endpoint.trim().is_empty(),
            "chain.endpoint must be set"
        );
        anyhow::ensure!(!self.store.path.trim().is_empty(), "store.path must be set");
        Ok(())
    }

    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            concurrency: self.liquidation.scan_concurrency.max(1),
            low_repay_threshold: u128::from(self.liquidation.low_repay_threshold),
        }
    }

    pub fn free_assets(&self) -> LiquidationFreeAssets {
        LiquidationFreeAssets {
            collaterals: self.liquidation.liquidation_free_collaterals.clone(),
            debt: self.liquidation.liquidation_free_debt,
        }
    }

    /// Log the current configuration. The seed is never logged.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, mode = ?self.mode, "Bot configuration loaded");
        tracing::info!(endpoint = %self.chain.endpoint, "Chain endpoint");
        tracing::info!(
            scan_interval_secs = self.scheduler.scan_interval_secs,
            liquidate_interval_secs = self.scheduler.liquidate_interval_secs,
            "Scheduler intervals"
        );
        tracing::info!(
            low_repay_threshold = self.liquidation.low_repay_threshold,
            scan_concurrency = self.liquidation.scan_concurrency,
            target = ?self.liquidation.target,
            free_collaterals = ?self.liquidation.liquidation_free_collaterals,
            free_debt = ?self.liquidation.liquidation_free_debt,
            "Liquidation parameters"
        );
        tracing::info!(path = %self.store.path, "Task store");
    }
}
