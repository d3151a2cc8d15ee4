//! Loans pallet abstraction.
//!
//! [`LoansApi`] is the only surface the liquidation pipeline sees. The
//! concrete implementation is [`ParachainClient`](crate::ParachainClient);
//! tests implement it in memory.

use crate::error::ChainError;
use crate::signer::Agent;
use crate::tx::{LoansCall, TxStatusUpdate};
use crate::types::{
    AccountId, BorrowSnapshot, CurrencyId, Deposits, Market, Rate, ThresholdLiquidity,
};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of status updates for one submitted extrinsic.
pub type TxStatusStream = BoxStream<'static, Result<TxStatusUpdate, ChainError>>;

/// Queries and submissions against the loans, oracle and assets pallets.
#[async_trait]
pub trait LoansApi: Send + Sync {
    /// All configured markets in registry order, regardless of state.
    async fn markets(&self) -> Result<Vec<(CurrencyId, Market)>, ChainError>;

    /// Accounts found in the debt-snapshot index.
    ///
    /// One entry per `(currency, account)` key, so an account borrowing
    /// several assets appears several times.
    async fn borrower_accounts(&self) -> Result<Vec<AccountId>, ChainError>;

    /// Deposit record of `account` in market `currency` (default when absent).
    async fn account_deposits(
        &self,
        currency: CurrencyId,
        account: &AccountId,
    ) -> Result<Deposits, ChainError>;

    /// Borrow snapshot of `account` in market `currency` (default when absent).
    async fn account_borrows(
        &self,
        currency: CurrencyId,
        account: &AccountId,
    ) -> Result<BorrowSnapshot, ChainError>;

    /// Current borrow index of a market.
    async fn borrow_index(&self, currency: CurrencyId) -> Result<Rate, ChainError>;

    /// Current voucher-to-underlying exchange rate of a market.
    async fn exchange_rate(&self, currency: CurrencyId) -> Result<Rate, ChainError>;

    /// Aggregated oracle price mantissa; zero when the oracle has no value.
    async fn oracle_price(&self, currency: CurrencyId) -> Result<u128, ChainError>;

    /// Decimals from the asset metadata.
    async fn asset_decimals(&self, currency: CurrencyId) -> Result<u8, ChainError>;

    /// Threshold liquidity tuple for `account` at the latest block.
    async fn threshold_liquidity(
        &self,
        account: &AccountId,
    ) -> Result<ThresholdLiquidity, ChainError>;

    /// Next usable nonce for `account`, including pool transactions.
    async fn next_nonce(&self, account: &AccountId) -> Result<u64, ChainError>;

    /// Sign `call` with `agent` at `nonce`, submit it and watch its status.
    async fn submit(
        &self,
        call: LoansCall,
        agent: &Agent,
        nonce: u64,
    ) -> Result<TxStatusStream, ChainError>;
}

