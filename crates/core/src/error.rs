//! Error taxonomy of the liquidation pipeline.

use liquidation_chain::{ChainError, CurrencyId};
use thiserror::Error;

/// Task store persistence failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store file {path} is not valid json: {source}")]
    Serde {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Liquidation pipeline error.
#[derive(Debug, Error)]
pub enum LiquidationError {
    /// No active market to price or evaluate.
    #[error("no active markets")]
    NoMarkets,

    /// The borrower has no seizable collateral.
    #[error("borrower {0} has no collateral")]
    NoCollateral(String),

    /// The borrower has no outstanding debt.
    #[error("borrower {0} has no debt")]
    NoDebt(String),

    /// A currency was asked for that the price snapshot does not cover.
    #[error("no oracle price for currency {0}")]
    MissingPrice(CurrencyId),

    /// Queued borrower id is not a valid account.
    #[error("invalid borrower id '{0}'")]
    InvalidBorrower(String),

    /// Targeted liquidation for a borrower that is not queued.
    #[error("borrower {0} is not in the liquidation store")]
    BorrowerNotQueued(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LiquidationError {
    /// Malformed or unusable borrower state: skip the borrower, keep the cycle.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::NoMarkets
                | Self::NoCollateral(_)
                | Self::NoDebt(_)
                | Self::MissingPrice(_)
                | Self::InvalidBorrower(_)
                | Self::Chain(ChainError::Decode { .. })
        )
    }

    /// Network failure: abort the cycle, the next one retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Chain(e) if e.is_transient())
    }

    /// Submitted extrinsic failed or was rejected.
    pub fn is_tx_failure(&self) -> bool {
        matches!(self, Self::Chain(e) if e.is_tx_failure())
    }
}
