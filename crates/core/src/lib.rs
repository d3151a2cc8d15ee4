//! Liquidation pipeline for the Parallel lending markets.
//!
//! This crate provides the core bot functionality:
//! - Oracle price resolution and unit-price normalization
//! - Liquidation parameter calculation per borrower
//! - Shortfall scanning over the debt-snapshot index
//! - A persistent, deduplicated FIFO task store
//! - Liquidation execution and the periodic scheduler
//!
//! All chain access goes through [`liquidation_chain::LoansApi`].

mod calculator;
pub mod config;
mod error;
mod liquidator;
mod oracle;
mod scanner;
mod scheduler;
mod store;
pub mod u256_math;

#[cfg(test)]
mod test_support;

pub use calculator::{
    bounded_repay, canonical_borrower, BorrowerPosition, Calculator, Liquidation,
    LiquidationFreeAssets, PositionValue,
};
pub use config::{load_config, BotConfig, RunMode};
pub use error::{LiquidationError, StoreError};
pub use liquidator::{Liquidator, SweepFailure, SweepReport};
pub use oracle::{OraclePrice, OraclePrices, OracleResolver};
pub use scanner::{ScanReport, Scanner, ScannerConfig, ShortfallBorrower};
pub use scheduler::{join_loops, Scheduler};
pub use store::{LiquidationBorrower, TaskStore};
