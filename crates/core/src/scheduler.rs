//! Periodic scan and liquidate loops.
//!
//! An initial liquidate pass handles a configured target right away; the two
//! loops then run independently. A failed cycle is logged and the loop waits
//! for its next tick.

use crate::config::SchedulerConfig;
use crate::liquidator::Liquidator;
use crate::scanner::Scanner;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Owns the loop periods and the components each loop drives.
pub struct Scheduler {
    scanner: Arc<Scanner>,
    /// `None` in scan-only mode
    liquidator: Option<Arc<Liquidator>>,
    scan_interval: Duration,
    liquidate_interval: Duration,
}

impl Scheduler {
    pub fn new(
        scanner: Arc<Scanner>,
        liquidator: Option<Arc<Liquidator>>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            scanner,
            liquidator,
            scan_interval: config.scan_interval(),
            liquidate_interval: config.liquidate_interval(),
        }
    }

    /// Run the initial liquidate pass, then spawn the loops.
    ///
    /// Returns the loop task handles; they only finish if a task panics.
    pub async fn start(&self, target: Option<&str>) -> Vec<JoinHandle<()>> {
        if let Some(liquidator) = &self.liquidator {
            info!(target = ?target, "Running initial liquidation pass");
            match liquidator.liquidate(target).await {
                Ok(report) => info!(
                    processed = report.processed,
                    succeeded = report.succeeded,
                    failed = report.failed(),
                    "Initial liquidation pass finished"
                ),
                Err(e) => error!(error = %e, "Initial liquidation pass failed"),
            }
        }

        let mut handles = Vec::with_capacity(2);

        let scanner = self.scanner.clone();
        let period = self.scan_interval;
        handles.push(tokio::spawn(async move {
            scan_loop(scanner, period).await;
        }));

        if let Some(liquidator) = self.liquidator.clone() {
            let period = self.liquidate_interval;
            handles.push(tokio::spawn(async move {
                liquidate_loop(liquidator, period).await;
            }));
        }

        info!(
            scan_interval_secs = self.scan_interval.as_secs(),
            liquidate_interval_secs = self.liquidate_interval.as_secs(),
            liquidate_loop = self.liquidator.is_some(),
            "Scheduler started"
        );
        handles
    }
}

/// Wait for every loop task, logging each one that ends.
///
/// A loop that panics or returns does not stop the others.
pub async fn join_loops(handles: Vec<JoinHandle<()>>) {
    let mut loops: FuturesUnordered<_> = handles
        .into_iter()
        .enumerate()
        .map(|(index, handle)| async move { (index, handle.await) })
        .collect();

    while let Some((index, result)) = loops.next().await {
        match result {
            Ok(()) => warn!(index, remaining = loops.len(), "Scheduler loop exited"),
            Err(e) => error!(
                index,
                remaining = loops.len(),
                error = %e,
                "Scheduler loop terminated"
            ),
        }
    }
}

/// First tick one full period from now.
fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn scan_loop(scanner: Arc<Scanner>, period: Duration) {
    let mut ticker = ticker(period);
    loop {
        ticker.tick().await;
        debug!("Scan cycle started");
        match scanner.scan_cycle().await {
            Ok(report) => debug!(
                shortfall = report.shortfall,
                queued = report.queued,
                low_repay = report.low_repay,
                "Scan cycle finished"
            ),
            Err(e) => error!(error = %e, "Scan cycle failed"),
        }
    }
}

async fn liquidate_loop(liquidator: Arc<Liquidator>, period: Duration) {
    let mut ticker = ticker(period);
    loop {
        ticker.tick().await;
        debug!("Liquidate cycle started");
        match liquidator.liquidate(None).await {
            Ok(report) => debug!(
                processed = report.processed,
                succeeded = report.succeeded,
                failed = report.failed(),
                "Liquidate cycle finished"
            ),
            Err(e) => error!(error = %e, "Liquidate cycle failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::{Calculator, LiquidationFreeAssets};
    use crate::scanner::ScannerConfig;
    use crate::store::TaskStore;
    use crate::test_support::{account, borrower, market, MockChain, RATE_ONE};
    use liquidation_chain::{Agent, CurrencyId, LoansApi};

    const X: CurrencyId = 100;
    const Y: CurrencyId = 101;
    const PRICE_ONE: u128 = 1_000_000_000_000_000_000;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            scan_interval_secs: 10,
            liquidate_interval_secs: 4,
        }
    }

    fn chain() -> MockChain {
        let mut chain = MockChain::default()
            .with_market(X, market(RATE_ONE, 500_000))
            .with_market(Y, market(RATE_ONE, 500_000))
            .with_price(X, PRICE_ONE, 0)
            .with_price(Y, PRICE_ONE, 0);
        for n in [1, 2] {
            chain = chain
                .with_deposit(X, &account(n), 1_000, true)
                .with_borrow(Y, &account(n), 800, RATE_ONE);
        }
        chain
    }

    fn scheduler(chain: Arc<MockChain>, store: Arc<TaskStore>, scan_only: bool) -> Scheduler {
        let api: Arc<dyn LoansApi> = chain;
        let calculator = Calculator::new(api.clone(), LiquidationFreeAssets::default());
        let scanner = Arc::new(Scanner::new(
            api.clone(),
            calculator.clone(),
            store.clone(),
            ScannerConfig::default(),
        ));
        let liquidator = (!scan_only).then(|| {
            Arc::new(Liquidator::new(
                api,
                calculator,
                store,
                Agent::from_seed("//Alice//stash").unwrap(),
            ))
        });
        Scheduler::new(scanner, liquidator, &config())
    }

    fn assert_send<T: Send>(_: T) {}

    #[test]
    fn test_cycle_futures_are_send() {
        let s = scheduler(Arc::new(chain()), Arc::new(TaskStore::in_memory()), false);
        assert_send(s.scanner.scan_cycle());
        if let Some(liquidator) = &s.liquidator {
            assert_send(liquidator.liquidate(None));
            assert_send(liquidator.liquidate(Some("target")));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_exit_does_not_stop_others() {
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = finished.clone();

        let handles = vec![
            tokio::spawn(async { panic!("scan loop crashed") }),
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
            }),
        ];

        join_loops(handles).await;
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_scan_waits_one_period() {
        let chain = Arc::new(chain());
        let s = scheduler(chain.clone(), Arc::new(TaskStore::in_memory()), true);
        let handles = s.start(None).await;
        assert_eq!(handles.len(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(chain.scan_count(), 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(chain.scan_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_loop_survives_errors() {
        let chain = Arc::new(chain().failing_scan());
        let s = scheduler(chain.clone(), Arc::new(TaskStore::in_memory()), true);
        let handles = s.start(None).await;

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(chain.scan_count(), 3);
        assert!(!handles[0].is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_pass_drains_store() {
        let chain = Arc::new(chain());
        let store = Arc::new(TaskStore::in_memory());
        store.insert_borrower(&borrower(1)).unwrap();
        let s = scheduler(chain.clone(), store.clone(), false);

        let handles = s.start(None).await;
        assert_eq!(handles.len(), 2);
        assert_eq!(chain.submitted().len(), 1);
        assert!(store.is_empty());

        // picked up by the liquidate loop on its next tick
        store.insert_borrower(&borrower(2)).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(chain.submitted().len(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_target_does_not_stop_loops() {
        let chain = Arc::new(chain());
        let store = Arc::new(TaskStore::in_memory());
        let s = scheduler(chain.clone(), store, false);

        let handles = s.start(Some(&borrower(7))).await;
        assert!(chain.submitted().is_empty());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(chain.scan_count(), 1);
        assert!(handles.iter().all(|h| !h.is_finished()));
    }
}
