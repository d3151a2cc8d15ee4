//! Liquidation parameter calculation.
//!
//! For one borrower: value every supply and borrow position at current
//! prices, pick the largest collateral and the largest debt, and bound the
//! repay amount by both the seizable collateral and the close factor.

use crate::error::LiquidationError;
use crate::oracle::{OraclePrices, OracleResolver};
use crate::u256_math;
use alloy_primitives::U256;
use futures::{stream, StreamExt, TryStreamExt};
use liquidation_chain::{AccountId, Balance, CurrencyId, LoansApi, LoansCall, Market};
use smallvec::SmallVec;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Concurrent per-market position queries.
const POSITION_FETCH_CONCURRENCY: usize = 8;

/// Assets with protocol-specific liquidation treatment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiquidationFreeAssets {
    /// Never counted as seizable collateral.
    pub collaterals: Vec<CurrencyId>,
    /// Debt valued from the chain-reported `lf_shortfall`.
    pub debt: Option<CurrencyId>,
}

/// Liquidation parameters, recomputed right before submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Liquidation {
    pub borrower: AccountId,
    pub liquidate_token: CurrencyId,
    pub collateral_token: CurrencyId,
    /// Smallest units of `liquidate_token`.
    pub repay: Balance,
    pub repay_decimal: u8,
}

impl Liquidation {
    /// Repay amount in whole tokens (truncated).
    pub fn whole_repay(&self) -> U256 {
        u256_math::whole_units(self.repay, self.repay_decimal)
    }

    pub fn to_call(&self) -> LoansCall {
        LoansCall::LiquidateBorrow {
            borrower: self.borrower.clone(),
            liquidate_token: self.liquidate_token,
            repay_amount: self.repay,
            collateral_token: self.collateral_token,
        }
    }
}

/// Value of one position in one market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionValue {
    pub currency: CurrencyId,
    pub value: U256,
}

/// Supply and debt values of a borrower, in market registry order.
#[derive(Debug, Clone, Default)]
pub struct BorrowerPosition {
    pub supplies: SmallVec<[PositionValue; 8]>,
    pub debts: SmallVec<[PositionValue; 8]>,
}

impl BorrowerPosition {
    pub fn best_collateral(&self) -> Option<PositionValue> {
        first_max(&self.supplies)
    }

    pub fn best_debt(&self) -> Option<PositionValue> {
        first_max(&self.debts)
    }
}

/// First entry with the maximum positive value.
fn first_max(values: &[PositionValue]) -> Option<PositionValue> {
    let mut best: Option<PositionValue> = None;
    for entry in values {
        if entry.value.is_zero() {
            continue;
        }
        match best {
            Some(current) if entry.value <= current.value => {}
            _ => best = Some(*entry),
        }
    }
    best
}

/// Canonical store key of a borrower id: its SS58 rendering with the
/// generic prefix, whatever prefix `id` was written with.
pub fn canonical_borrower(id: &str) -> Result<String, LiquidationError> {
    AccountId::from_str(id)
        .map(|account| account.to_string())
        .map_err(|_| LiquidationError::InvalidBorrower(id.to_string()))
}

/// Bound the repay value and convert it into debt-asset units.
///
/// `repay_value = min(collateral * 10^18 / incentive, debt * close_factor / 10^6)`
/// and `repay = repay_value / unit_price(debt)`.
pub fn bounded_repay(
    collateral_value: U256,
    liquidate_incentive: u128,
    debt_value: U256,
    close_factor: u32,
    debt_unit_price: U256,
) -> U256 {
    let repay_value = u256_math::min(
        u256_math::cap_by_incentive(collateral_value, liquidate_incentive),
        u256_math::cap_by_close_factor(debt_value, close_factor),
    );
    u256_math::to_native_units(repay_value, debt_unit_price)
}

/// Computes [`Liquidation`]s from current chain state.
#[derive(Clone)]
pub struct Calculator {
    api: Arc<dyn LoansApi>,
    oracle: OracleResolver,
    free_assets: LiquidationFreeAssets,
}

impl Calculator {
    pub fn new(api: Arc<dyn LoansApi>, free_assets: LiquidationFreeAssets) -> Self {
        Self {
            oracle: OracleResolver::new(api.clone()),
            api,
            free_assets,
        }
    }

    /// Parse a queued borrower id and compute its liquidation.
    pub async fn calculate(&self, borrower: &str) -> Result<Liquidation, LiquidationError> {
        let account = AccountId::from_str(borrower)
            .map_err(|_| LiquidationError::InvalidBorrower(borrower.to_string()))?;
        self.calculate_for(&account).await
    }

    #[instrument(skip(self, borrower), fields(borrower = %borrower))]
    pub async fn calculate_for(&self, borrower: &AccountId) -> Result<Liquidation, LiquidationError> {
        let markets: Vec<(CurrencyId, Market)> = self
            .api
            .markets()
            .await?
            .into_iter()
            .filter(|(_, market)| market.is_active())
            .collect();
        if markets.is_empty() {
            return Err(LiquidationError::NoMarkets);
        }

        let currencies: SmallVec<[CurrencyId; 8]> = markets.iter().map(|(c, _)| *c).collect();
        let prices = self.oracle.fetch(&currencies).await?;
        let position = self.position(borrower, &markets, &prices).await?;

        let collateral = position
            .best_collateral()
            .ok_or_else(|| LiquidationError::NoCollateral(borrower.to_string()))?;
        let debt = position
            .best_debt()
            .ok_or_else(|| LiquidationError::NoDebt(borrower.to_string()))?;

        let collateral_market = market_of(&markets, collateral.currency)?;
        let debt_market = market_of(&markets, debt.currency)?;
        let debt_price = prices.get(debt.currency)?;

        let repay = bounded_repay(
            collateral.value,
            collateral_market.liquidate_incentive,
            debt.value,
            debt_market.close_factor,
            debt_price.unit_price(),
        );

        let liquidation = Liquidation {
            borrower: borrower.clone(),
            liquidate_token: debt.currency,
            collateral_token: collateral.currency,
            repay: u256_math::saturating_u128(repay),
            repay_decimal: debt_price.decimal,
        };
        debug!(
            liquidate_token = liquidation.liquidate_token,
            collateral_token = liquidation.collateral_token,
            repay = liquidation.repay,
            "Liquidation computed"
        );
        Ok(liquidation)
    }

    /// Value every active market position of `borrower`.
    pub async fn position(
        &self,
        borrower: &AccountId,
        markets: &[(CurrencyId, Market)],
        prices: &OraclePrices,
    ) -> Result<BorrowerPosition, LiquidationError> {
        let lf_debt = self
            .free_assets
            .debt
            .filter(|currency| markets.iter().any(|(c, _)| c == currency));
        let lf_shortfall = match lf_debt {
            Some(_) => self.api.threshold_liquidity(borrower).await?.lf_shortfall,
            None => 0,
        };

        // owned per-market inputs keep the fan-out futures free of borrows
        let mut inputs = Vec::with_capacity(markets.len());
        for (currency, _) in markets {
            inputs.push(MarketInput {
                currency: *currency,
                unit_price: prices.unit_price(*currency)?,
                seizable: !self.free_assets.collaterals.contains(currency),
                lf_debt: lf_debt == Some(*currency),
            });
        }

        let api = self.api.clone();
        let borrower = borrower.clone();
        let entries: Vec<(PositionValue, PositionValue)> = stream::iter(inputs)
            .map(move |input| market_position(api.clone(), borrower.clone(), input, lf_shortfall))
            .buffered(POSITION_FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        let (supplies, debts) = entries.into_iter().unzip();
        Ok(BorrowerPosition { supplies, debts })
    }
}

/// Per-market inputs of a position valuation.
#[derive(Debug, Clone, Copy)]
struct MarketInput {
    currency: CurrencyId,
    unit_price: U256,
    seizable: bool,
    lf_debt: bool,
}

/// Supply and debt value of `borrower` in one market.
async fn market_position(
    api: Arc<dyn LoansApi>,
    borrower: AccountId,
    input: MarketInput,
    lf_shortfall: u128,
) -> Result<(PositionValue, PositionValue), LiquidationError> {
    let currency = input.currency;
    let (deposits, exchange_rate, snapshot, borrow_index) = futures::try_join!(
        api.account_deposits(currency, &borrower),
        api.exchange_rate(currency),
        api.account_borrows(currency, &borrower),
        api.borrow_index(currency),
    )?;

    let supply = if input.seizable && deposits.is_collateral {
        u256_math::supply_value(deposits.voucher_balance, exchange_rate, input.unit_price)
    } else {
        U256::ZERO
    };

    let debt = if input.lf_debt {
        U256::from(lf_shortfall)
    } else {
        u256_math::debt_value(
            snapshot.principal,
            borrow_index,
            snapshot.borrow_index,
            input.unit_price,
        )
    };

    Ok((
        PositionValue {
            currency,
            value: supply,
        },
        PositionValue {
            currency,
            value: debt,
        },
    ))
}

fn market_of(
    markets: &[(CurrencyId, Market)],
    currency: CurrencyId,
) -> Result<&Market, LiquidationError> {
    markets
        .iter()
        .find(|(c, _)| *c == currency)
        .map(|(_, m)| m)
        .ok_or(LiquidationError::NoMarkets)
}
