//! Configuration system for the liquidation client.
//!
//! This module provides:
//! - Bot runtime configuration (profiles, intervals, thresholds)
//! - Resolution from TOML files, profiles and environment overrides

mod bot;
mod loader;

pub use bot::{
    BotConfig, ChainConfig, LiquidationConfig, RunMode, SchedulerConfig, StoreConfig,
};
pub use loader::{expand_env, load_config};
