//! Oracle price resolution.
//!
//! Prices are fetched fresh for every calculation and normalized to a
//! per-smallest-unit price so that values of different assets are
//! comparable.

use crate::error::LiquidationError;
use crate::u256_math;
use alloy_primitives::U256;
use futures::{stream, StreamExt, TryStreamExt};
use liquidation_chain::{CurrencyId, LoansApi};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::debug;

/// Native and relay-chain currencies, whose metadata decimals are not
/// authoritative.
pub const NATIVE_CURRENCIES: [CurrencyId; 2] = [0, 1];

/// Decimal used for [`NATIVE_CURRENCIES`].
pub const NATIVE_DECIMAL: u8 = 12;

/// Concurrent price requests per resolution.
const PRICE_FETCH_CONCURRENCY: usize = 8;

/// Oracle price of one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OraclePrice {
    pub currency: CurrencyId,
    /// Price of one whole token, 18 decimals.
    pub price: u128,
    pub decimal: u8,
}

impl OraclePrice {
    /// Price of one smallest unit: `price / 10^decimal`.
    pub fn unit_price(&self) -> U256 {
        u256_math::unit_price(self.price, self.decimal)
    }
}

/// One price per currency, in the order requested.
#[derive(Debug, Clone, Default)]
pub struct OraclePrices {
    prices: SmallVec<[OraclePrice; 8]>,
}

impl OraclePrices {
    pub fn get(&self, currency: CurrencyId) -> Result<&OraclePrice, LiquidationError> {
        self.prices
            .iter()
            .find(|p| p.currency == currency)
            .ok_or(LiquidationError::MissingPrice(currency))
    }

    pub fn unit_price(&self, currency: CurrencyId) -> Result<U256, LiquidationError> {
        self.get(currency).map(OraclePrice::unit_price)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OraclePrice> {
        self.prices.iter()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl FromIterator<OraclePrice> for OraclePrices {
    fn from_iter<I: IntoIterator<Item = OraclePrice>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}

/// Fetches and normalizes oracle prices.
#[derive(Clone)]
pub struct OracleResolver {
    api: Arc<dyn LoansApi>,
}

impl OracleResolver {
    pub fn new(api: Arc<dyn LoansApi>) -> Self {
        Self { api }
    }

    /// Resolve one price per currency. Duplicates are priced once.
    pub async fn fetch(&self, currencies: &[CurrencyId]) -> Result<OraclePrices, LiquidationError> {
        if currencies.is_empty() {
            return Err(LiquidationError::NoMarkets);
        }

        let mut unique: SmallVec<[CurrencyId; 8]> = SmallVec::new();
        for currency in currencies {
            if !unique.contains(currency) {
                unique.push(*currency);
            }
        }

        let api = self.api.clone();
        let prices: Vec<OraclePrice> = stream::iter(unique)
            .map(move |currency| fetch_price(api.clone(), currency))
            .buffered(PRICE_FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        debug!(count = prices.len(), "Oracle prices resolved");
        Ok(prices.into_iter().collect())
    }
}

async fn fetch_price(
    api: Arc<dyn LoansApi>,
    currency: CurrencyId,
) -> Result<OraclePrice, LiquidationError> {
    let price = api.oracle_price(currency).await?;
    let decimal = if NATIVE_CURRENCIES.contains(&currency) {
        NATIVE_DECIMAL
    } else {
        api.asset_decimals(currency).await?
    };

    Ok(OraclePrice {
        currency,
        price,
        decimal,
    })
}
