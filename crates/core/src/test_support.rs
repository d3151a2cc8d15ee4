//! In-memory chain for pipeline tests.

use futures::{stream, StreamExt};
use liquidation_chain::{
    types::{CurveModel, InterestRateModel},
    AccountId, Agent, BorrowSnapshot, ChainError, CurrencyId, Deposits, ExtrinsicEvent, LoansApi,
    LoansCall, Market, MarketState, Rate, Ratio, ThresholdLiquidity, TxStatusStream,
    TxStatusUpdate,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub const RATE_ONE: u128 = 1_000_000_000_000_000_000;

pub fn account(n: u8) -> AccountId {
    AccountId::from([n; 32])
}

pub fn borrower(n: u8) -> String {
    account(n).to_string()
}

pub fn market(liquidate_incentive: Rate, close_factor: Ratio) -> Market {
    Market {
        collateral_factor: 500_000,
        liquidation_threshold: 550_000,
        reserve_factor: 100_000,
        close_factor,
        liquidate_incentive,
        liquidate_incentive_reserved_factor: 0,
        rate_model: InterestRateModel::Curve(CurveModel { base_rate: 0 }),
        state: MarketState::Active,
        supply_cap: u128::MAX,
        borrow_cap: u128::MAX,
        ptoken_id: 0,
    }
}

pub fn success_updates() -> Vec<TxStatusUpdate> {
    vec![
        TxStatusUpdate::Ready,
        TxStatusUpdate::InBlock {
            block_hash: "0x01".into(),
            events: vec![ExtrinsicEvent::Success],
        },
    ]
}

pub fn failed_updates(payload: &str) -> Vec<TxStatusUpdate> {
    vec![
        TxStatusUpdate::Ready,
        TxStatusUpdate::InBlock {
            block_hash: "0x02".into(),
            events: vec![ExtrinsicEvent::Failed {
                payload: payload.into(),
            }],
        },
    ]
}

/// Chain state held in memory. Built with the `with_*` methods.
#[derive(Default)]
pub struct MockChain {
    markets: Vec<(CurrencyId, Market)>,
    prices: HashMap<CurrencyId, (u128, u8)>,
    deposits: BTreeMap<(CurrencyId, AccountId), Deposits>,
    borrows: Vec<((CurrencyId, AccountId), BorrowSnapshot)>,
    borrow_index: HashMap<CurrencyId, Rate>,
    exchange_rate: HashMap<CurrencyId, Rate>,
    liquidity: BTreeMap<AccountId, ThresholdLiquidity>,
    fail_prices: bool,
    fail_scan: bool,
    fail_liquidity: BTreeSet<AccountId>,
    tx_outcomes: Mutex<VecDeque<Vec<TxStatusUpdate>>>,
    submitted: Mutex<Vec<(LoansCall, u64)>>,
    nonce: AtomicU64,
    scans: AtomicUsize,
}

impl MockChain {
    pub fn with_market(mut self, currency: CurrencyId, market: Market) -> Self {
        self.markets.push((currency, market));
        self
    }

    pub fn with_price(mut self, currency: CurrencyId, price: u128, decimals: u8) -> Self {
        self.prices.insert(currency, (price, decimals));
        self
    }

    pub fn with_deposit(
        mut self,
        currency: CurrencyId,
        who: &AccountId,
        voucher_balance: u128,
        is_collateral: bool,
    ) -> Self {
        self.deposits.insert(
            (currency, who.clone()),
            Deposits {
                voucher_balance,
                is_collateral,
            },
        );
        self
    }

    pub fn with_exchange_rate(mut self, currency: CurrencyId, rate: Rate) -> Self {
        self.exchange_rate.insert(currency, rate);
        self
    }

    pub fn with_borrow(
        mut self,
        currency: CurrencyId,
        who: &AccountId,
        principal: u128,
        borrow_index: Rate,
    ) -> Self {
        self.borrows.push((
            (currency, who.clone()),
            BorrowSnapshot {
                principal,
                borrow_index,
            },
        ));
        self
    }

    pub fn with_borrow_index(mut self, currency: CurrencyId, index: Rate) -> Self {
        self.borrow_index.insert(currency, index);
        self
    }

    pub fn with_liquidity(mut self, who: &AccountId, liquidity: ThresholdLiquidity) -> Self {
        self.liquidity.insert(who.clone(), liquidity);
        self
    }

    /// Shortfall-only liquidity tuple.
    pub fn with_shortfall(self, who: &AccountId, shortfall: u128) -> Self {
        self.with_liquidity(
            who,
            ThresholdLiquidity {
                shortfall,
                ..Default::default()
            },
        )
    }

    pub fn with_tx_outcome(self, updates: Vec<TxStatusUpdate>) -> Self {
        self.tx_outcomes.lock().push_back(updates);
        self
    }

    pub fn failing_prices(mut self) -> Self {
        self.fail_prices = true;
        self
    }

    pub fn failing_scan(mut self) -> Self {
        self.fail_scan = true;
        self
    }

    pub fn failing_liquidity(mut self, who: &AccountId) -> Self {
        self.fail_liquidity.insert(who.clone());
        self
    }

    pub fn submitted(&self) -> Vec<(LoansCall, u64)> {
        self.submitted.lock().clone()
    }

    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LoansApi for MockChain {
    async fn markets(&self) -> Result<Vec<(CurrencyId, Market)>, ChainError> {
        Ok(self.markets.clone())
    }

    async fn borrower_accounts(&self) -> Result<Vec<AccountId>, ChainError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if self.fail_scan {
            return Err(ChainError::rpc_message("connection reset"));
        }
        Ok(self.borrows.iter().map(|((_, who), _)| who.clone()).collect())
    }

    async fn account_deposits(
        &self,
        currency: CurrencyId,
        account: &AccountId,
    ) -> Result<Deposits, ChainError> {
        Ok(self
            .deposits
            .get(&(currency, account.clone()))
            .copied()
            .unwrap_or_default())
    }

    async fn account_borrows(
        &self,
        currency: CurrencyId,
        account: &AccountId,
    ) -> Result<BorrowSnapshot, ChainError> {
        Ok(self
            .borrows
            .iter()
            .find(|((c, who), _)| *c == currency && who == account)
            .map(|(_, snapshot)| *snapshot)
            .unwrap_or_default())
    }

    async fn borrow_index(&self, currency: CurrencyId) -> Result<Rate, ChainError> {
        Ok(self.borrow_index.get(&currency).copied().unwrap_or(RATE_ONE))
    }

    async fn exchange_rate(&self, currency: CurrencyId) -> Result<Rate, ChainError> {
        Ok(self.exchange_rate.get(&currency).copied().unwrap_or(RATE_ONE))
    }

    async fn oracle_price(&self, currency: CurrencyId) -> Result<u128, ChainError> {
        if self.fail_prices {
            return Err(ChainError::rpc_message("oracle timeout"));
        }
        Ok(self.prices.get(&currency).map(|(p, _)| *p).unwrap_or_default())
    }

    async fn asset_decimals(&self, currency: CurrencyId) -> Result<u8, ChainError> {
        Ok(self.prices.get(&currency).map(|(_, d)| *d).unwrap_or_default())
    }

    async fn threshold_liquidity(
        &self,
        account: &AccountId,
    ) -> Result<ThresholdLiquidity, ChainError> {
        if self.fail_liquidity.contains(account) {
            return Err(ChainError::rpc_message("liquidity query failed"));
        }
        Ok(self.liquidity.get(account).copied().unwrap_or_default())
    }

    async fn next_nonce(&self, _account: &AccountId) -> Result<u64, ChainError> {
        Ok(self.nonce.load(Ordering::SeqCst))
    }

    async fn submit(
        &self,
        call: LoansCall,
        _agent: &Agent,
        nonce: u64,
    ) -> Result<TxStatusStream, ChainError> {
        self.submitted.lock().push((call, nonce));
        self.nonce.fetch_add(1, Ordering::SeqCst);
        let updates = self
            .tx_outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(success_updates);
        Ok(stream::iter(updates.into_iter().map(Ok)).boxed())
    }
}
