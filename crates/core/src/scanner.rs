//! Shortfall scanning.
//!
//! A scan cycle walks every account in the debt-snapshot index, keeps those
//! with a positive effective shortfall, computes their liquidation, drops
//! dust-sized repays and queues the rest in the task store.

use crate::calculator::{Calculator, Liquidation};
use crate::error::LiquidationError;
use crate::store::TaskStore;
use alloy_primitives::U256;
use futures::{stream, StreamExt, TryStreamExt};
use liquidation_chain::{AccountId, LoansApi};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Scanner configuration.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Concurrent threshold-liquidity queries
    pub concurrency: usize,
    /// Minimum repay in whole tokens worth queueing
    pub low_repay_threshold: u128,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            concurrency: 32,
            low_repay_threshold: 1,
        }
    }
}

/// Borrower with a positive effective shortfall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortfallBorrower {
    pub borrower: AccountId,
    pub shortfall: u128,
}

/// Outcome of one scan cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub shortfall: usize,
    pub queued: usize,
    pub already_queued: usize,
    pub low_repay: usize,
    pub skipped: usize,
}

/// Finds liquidatable borrowers and queues them.
pub struct Scanner {
    api: Arc<dyn LoansApi>,
    calculator: Calculator,
    store: Arc<TaskStore>,
    config: ScannerConfig,
}

impl Scanner {
    pub fn new(
        api: Arc<dyn LoansApi>,
        calculator: Calculator,
        store: Arc<TaskStore>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            api,
            calculator,
            store,
            config,
        }
    }

    /// Unique borrowers whose effective shortfall is strictly positive.
    ///
    /// All liquidity queries must succeed; the first failure aborts the scan.
    #[instrument(skip(self))]
    pub async fn shortfall_borrowers(&self) -> Result<Vec<ShortfallBorrower>, LiquidationError> {
        let mut accounts = self.api.borrower_accounts().await?;
        let mut seen = BTreeSet::new();
        accounts.retain(|account| seen.insert(account.clone()));
        debug!(count = accounts.len(), "Scanning unique borrowers");

        let api = self.api.clone();
        let results: Vec<ShortfallBorrower> = stream::iter(accounts)
            .map(move |borrower| {
                let api = api.clone();
                async move {
                    let liquidity = api.threshold_liquidity(&borrower).await?;
                    let shortfall = liquidity.effective_shortfall();
                    debug!(borrower = %borrower, shortfall = shortfall, "Borrower liquidity");
                    Ok::<_, LiquidationError>(ShortfallBorrower {
                        borrower,
                        shortfall,
                    })
                }
            })
            .buffered(self.config.concurrency.max(1))
            .try_collect()
            .await?;

        let borrowers: Vec<ShortfallBorrower> =
            results.into_iter().filter(|b| b.shortfall > 0).collect();
        debug!(count = borrowers.len(), "Shortfall borrowers found");
        Ok(borrowers)
    }

    /// Scan, compute liquidations, filter low repays and queue.
    ///
    /// Borrowers whose liquidation cannot be computed from their data are
    /// skipped. A transient error aborts the cycle before anything is queued.
    #[instrument(skip(self))]
    pub async fn scan_cycle(&self) -> Result<ScanReport, LiquidationError> {
        let borrowers = self.shortfall_borrowers().await?;
        let mut report = ScanReport {
            shortfall: borrowers.len(),
            ..Default::default()
        };

        let calculator = self.calculator.clone();
        let outcomes: Vec<(AccountId, Result<Liquidation, LiquidationError>)> =
            stream::iter(borrowers)
                .map(move |b| {
                    let calculator = calculator.clone();
                    async move {
                        let result = calculator.calculate_for(&b.borrower).await;
                        (b.borrower, result)
                    }
                })
                .buffered(self.config.concurrency.max(1))
                .collect()
                .await;

        let mut liquidations = Vec::with_capacity(outcomes.len());
        for (borrower, outcome) in outcomes {
            match outcome {
                Ok(liquidation) => liquidations.push(liquidation),
                Err(e) if e.is_data_error() => {
                    warn!(borrower = %borrower, error = %e, "Skipping borrower");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let threshold = U256::from(self.config.low_repay_threshold);
        for liquidation in liquidations {
            if liquidation.whole_repay() < threshold {
                report.low_repay += 1;
                continue;
            }
            if self.store.insert_borrower(&liquidation.borrower.to_string())? {
                report.queued += 1;
            } else {
                report.already_queued += 1;
            }
        }

        if report.low_repay > 0 {
            debug!(
                count = report.low_repay,
                "Ignored liquidations with low repay amount"
            );
        }
        info!(
            shortfall = report.shortfall,
            queued = report.queued,
            already_queued = report.already_queued,
            skipped = report.skipped,
            store_size = self.store.len(),
            "Stored shortfall borrowers"
        );
        Ok(report)
    }
}
