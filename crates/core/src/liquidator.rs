//! Liquidation executor.
//!
//! Dequeues borrowers from the task store, recomputes their liquidation from
//! current chain state and submits one `liquidate_borrow` extrinsic per
//! borrower, waiting for each to resolve before the next.

use crate::calculator::{canonical_borrower, Calculator, Liquidation};
use crate::error::LiquidationError;
use crate::store::TaskStore;
use liquidation_chain::{watch_transaction, Agent, LoansApi, TxReceipt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Borrower a sweep gave up on, with the error that stopped it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFailure {
    pub borrower: String,
    pub reason: String,
}

/// Outcome of a liquidate pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn record_failure(&mut self, borrower: &str, error: &LiquidationError) {
        self.failures.push(SweepFailure {
            borrower: borrower.to_string(),
            reason: error.to_string(),
        });
    }
}

/// Liquidation executor.
pub struct Liquidator {
    api: Arc<dyn LoansApi>,
    calculator: Calculator,
    store: Arc<TaskStore>,
    agent: Agent,
}

impl Liquidator {
    pub fn new(
        api: Arc<dyn LoansApi>,
        calculator: Calculator,
        store: Arc<TaskStore>,
        agent: Agent,
    ) -> Self {
        Self {
            api,
            calculator,
            store,
            agent,
        }
    }

    /// Liquidate `target` only, or drain the whole store when `None`.
    pub async fn liquidate(&self, target: Option<&str>) -> Result<SweepReport, LiquidationError> {
        match target {
            Some(borrower) => self.liquidate_target(borrower).await,
            None => self.sweep().await,
        }
    }

    /// Dequeue exactly `target`. Its absence from the store is an error.
    ///
    /// `target` may use any SS58 prefix; it is matched by account.
    #[instrument(skip(self))]
    pub async fn liquidate_target(&self, target: &str) -> Result<SweepReport, LiquidationError> {
        let key = canonical_borrower(target)?;
        let Some(borrower) = self.store.shift_borrower(&key)? else {
            error!(borrower = target, "Cannot get target liquidation to liquidate");
            return Err(LiquidationError::BorrowerNotQueued(target.to_string()));
        };

        self.execute(&borrower).await?;
        Ok(SweepReport {
            processed: 1,
            succeeded: 1,
            failures: Vec::new(),
        })
    }

    /// Drain the store in FIFO order.
    ///
    /// Data errors and failed extrinsics are counted and the sweep moves on;
    /// any other error ends the sweep.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport, LiquidationError> {
        let mut report = SweepReport::default();

        while let Some(borrower) = self.store.shift_last()? {
            report.processed += 1;
            match self.execute(&borrower).await {
                Ok(_) => report.succeeded += 1,
                Err(e) if e.is_tx_failure() => {
                    error!(borrower = %borrower, error = %e, "Liquidation transaction failed");
                    report.record_failure(&borrower, &e);
                }
                Err(e) if e.is_data_error() => {
                    warn!(borrower = %borrower, error = %e, "Skipping borrower");
                    report.record_failure(&borrower, &e);
                }
                Err(e) => {
                    warn!(
                        borrower = %borrower,
                        processed = report.processed,
                        "Sweep aborted, borrower left for the next scan"
                    );
                    return Err(e);
                }
            }
        }

        if report.processed == 0 {
            debug!("There are no liquidations to run");
        }
        Ok(report)
    }

    /// Recompute and submit the liquidation of one dequeued borrower.
    pub async fn execute(&self, borrower: &str) -> Result<TxReceipt, LiquidationError> {
        let start = Instant::now();
        let liquidation = self.calculator.calculate(borrower).await?;
        info!(
            borrower = %liquidation.borrower,
            liquidate_token = liquidation.liquidate_token,
            repay = liquidation.repay,
            collateral_token = liquidation.collateral_token,
            "Handling liquidation"
        );

        let receipt = self.submit(&liquidation).await?;
        info!(
            borrower = %liquidation.borrower,
            block = %receipt.block_hash,
            elapsed_ms = start.elapsed().as_millis(),
            "Liquidation succeeded"
        );
        Ok(receipt)
    }

    async fn submit(&self, liquidation: &Liquidation) -> Result<TxReceipt, LiquidationError> {
        // fetched right before signing; submissions from this agent are sequential
        let nonce = self.api.next_nonce(self.agent.account_id()).await?;
        let stream = self
            .api
            .submit(liquidation.to_call(), &self.agent, nonce)
            .await?;
        Ok(watch_transaction(stream).await?)
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::LiquidationFreeAssets;
    use crate::test_support::{account, borrower, failed_updates, market, MockChain, RATE_ONE};
    use liquidation_chain::{ChainError, CurrencyId, LoansCall};

    const X: CurrencyId = 100;
    const Y: CurrencyId = 101;
    const PRICE_ONE: u128 = 1_000_000_000_000_000_000;

    fn chain_with(borrowers: &[u8]) -> MockChain {
        let mut chain = MockChain::default()
            .with_market(X, market(RATE_ONE, 500_000))
            .with_market(Y, market(RATE_ONE, 500_000))
            .with_price(X, PRICE_ONE, 0)
            .with_price(Y, PRICE_ONE, 0);
        for n in borrowers {
            chain = chain
                .with_deposit(X, &account(*n), 1_000, true)
                .with_borrow(Y, &account(*n), 800, RATE_ONE);
        }
        chain
    }

    fn liquidator(chain: Arc<MockChain>, store: Arc<TaskStore>) -> Liquidator {
        let api: Arc<dyn LoansApi> = chain;
        let calculator = Calculator::new(api.clone(), LiquidationFreeAssets::default());
        Liquidator::new(
            api,
            calculator,
            store,
            Agent::from_seed("//Alice//stash").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_sweep_fifo_with_fresh_nonces() {
        let chain = Arc::new(chain_with(&[1, 2, 3]));
        let store = Arc::new(TaskStore::in_memory());
        for n in [2, 1, 3] {
            store.insert_borrower(&borrower(n)).unwrap();
        }
        let liq = liquidator(chain.clone(), store.clone());

        let report = liq.liquidate(None).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                processed: 3,
                succeeded: 3,
                failures: vec![]
            }
        );
        assert!(store.is_empty());

        let submitted = chain.submitted();
        let order: Vec<_> = submitted
            .iter()
            .map(|(call, _)| match call {
                LoansCall::LiquidateBorrow { borrower, .. } => borrower.clone(),
            })
            .collect();
        assert_eq!(order, vec![account(2), account(1), account(3)]);
        let nonces: Vec<_> = submitted.iter().map(|(_, n)| *n).collect();
        assert_eq!(nonces, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_submitted_call_carries_liquidation() {
        let chain = Arc::new(chain_with(&[1]));
        let store = Arc::new(TaskStore::in_memory());
        store.insert_borrower(&borrower(1)).unwrap();

        liquidator(chain.clone(), store).liquidate(None).await.unwrap();

        let (call, _) = &chain.submitted()[0];
        assert_eq!(
            *call,
            LoansCall::LiquidateBorrow {
                borrower: account(1),
                liquidate_token: Y,
                repay_amount: 400,
                collateral_token: X,
            }
        );
    }

    #[tokio::test]
    async fn test_targeted_liquidation() {
        let chain = Arc::new(chain_with(&[1, 2]));
        let store = Arc::new(TaskStore::in_memory());
        store.insert_borrower(&borrower(1)).unwrap();
        store.insert_borrower(&borrower(2)).unwrap();
        let liq = liquidator(chain.clone(), store.clone());

        let report = liq.liquidate(Some(&borrower(2))).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(store.borrowers(), vec![borrower(1)]);
    }

    #[tokio::test]
    async fn test_targeted_liquidation_accepts_any_ss58_prefix() {
        let chain = Arc::new(chain_with(&[1]));
        let store = Arc::new(TaskStore::in_memory());
        store.insert_borrower(&borrower(1)).unwrap();
        let liq = liquidator(chain.clone(), store.clone());

        // account(1) rendered with the Parallel prefix (172)
        let target = "p8AxskWHQBViXqKEeX2nUCLmxNrzQrDLd75fcJzDbGTTVUbBz";
        assert_ne!(target, borrower(1));

        let report = liq.liquidate(Some(target)).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(store.is_empty());
        match &chain.submitted()[0].0 {
            LoansCall::LiquidateBorrow { borrower, .. } => assert_eq!(*borrower, account(1)),
        }
    }

    #[tokio::test]
    async fn test_targeted_invalid_id_is_error() {
        let chain = Arc::new(chain_with(&[1]));
        let store = Arc::new(TaskStore::in_memory());
        store.insert_borrower(&borrower(1)).unwrap();
        let liq = liquidator(chain.clone(), store.clone());

        let err = liq.liquidate(Some("not-an-account")).await.unwrap_err();
        assert!(matches!(err, LiquidationError::InvalidBorrower(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_targeted_missing_borrower_is_error() {
        let chain = Arc::new(chain_with(&[1]));
        let store = Arc::new(TaskStore::in_memory());
        let liq = liquidator(chain.clone(), store);

        let err = liq.liquidate(Some(&borrower(1))).await.unwrap_err();
        assert!(matches!(err, LiquidationError::BorrowerNotQueued(_)));
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_extrinsic_failed_rejects_with_payload_and_no_requeue() {
        let chain = Arc::new(chain_with(&[1]).with_tx_outcome(failed_updates("0x0306")));
        let store = Arc::new(TaskStore::in_memory());
        store.insert_borrower(&borrower(1)).unwrap();
        let liq = liquidator(chain, store.clone());

        let err = liq.liquidate(Some(&borrower(1))).await.unwrap_err();
        match err {
            LiquidationError::Chain(ChainError::ExtrinsicFailed { payload, .. }) => {
                assert_eq!(payload, "0x0306")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!store.contains(&borrower(1)));
    }

    #[tokio::test]
    async fn test_sweep_continues_past_failures() {
        // borrower 9 has no position; borrower 1's tx fails; borrower 2 succeeds
        let chain = Arc::new(chain_with(&[1, 2]).with_tx_outcome(failed_updates("0x01")));
        let store = Arc::new(TaskStore::in_memory());
        for n in [9, 1, 2] {
            store.insert_borrower(&borrower(n)).unwrap();
        }
        let liq = liquidator(chain.clone(), store.clone());

        let report = liq.sweep().await.unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed(), 2);
        assert!(store.is_empty());
        assert_eq!(chain.submitted().len(), 2);

        assert_eq!(report.failures[0].borrower, borrower(9));
        assert!(report.failures[0].reason.contains("no collateral"));
        // the dispatch error payload of the failed extrinsic is kept
        assert_eq!(report.failures[1].borrower, borrower(1));
        assert!(report.failures[1].reason.contains("0x01"));
    }

    #[tokio::test]
    async fn test_sweep_aborts_on_transient_error() {
        let chain = Arc::new(chain_with(&[1, 2]).failing_prices());
        let store = Arc::new(TaskStore::in_memory());
        store.insert_borrower(&borrower(1)).unwrap();
        store.insert_borrower(&borrower(2)).unwrap();
        let liq = liquidator(chain, store.clone());

        let err = liq.sweep().await.unwrap_err();
        assert!(err.is_transient());
        // the failing borrower was dequeued, the rest stays queued
        assert_eq!(store.borrowers(), vec![borrower(2)]);
    }

    #[tokio::test]
    async fn test_empty_sweep() {
        let chain = Arc::new(chain_with(&[]));
        let liq = liquidator(chain, Arc::new(TaskStore::in_memory()));
        assert_eq!(liq.sweep().await.unwrap(), SweepReport::default());
    }
}
