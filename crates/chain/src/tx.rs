//! Typed calls and the extrinsic lifecycle.
//!
//! A submitted extrinsic moves through
//! `Submitted -> Ready -> InBlock -> {Success | Failed}`. Status updates come
//! from the node subscription as [`TxStatusUpdate`]s and are folded into a
//! [`TxState`] by [`TxState::apply`]; [`watch_transaction`] drives that fold
//! until the extrinsic resolves.

use crate::api::TxStatusStream;
use crate::error::ChainError;
use crate::types::{AccountId, Balance, CurrencyId};
use futures::StreamExt;
use tracing::{debug, info};

/// Calls the bot knows how to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoansCall {
    /// Repay part of `borrower`'s debt in `liquidate_token` and seize
    /// `collateral_token` in exchange.
    LiquidateBorrow {
        borrower: AccountId,
        liquidate_token: CurrencyId,
        repay_amount: Balance,
        collateral_token: CurrencyId,
    },
}

impl LoansCall {
    pub fn pallet(&self) -> &'static str {
        match self {
            Self::LiquidateBorrow { .. } => "Loans",
        }
    }

    pub fn call_name(&self) -> &'static str {
        match self {
            Self::LiquidateBorrow { .. } => "liquidate_borrow",
        }
    }
}

/// Event emitted by the extrinsic in the block it was included in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtrinsicEvent {
    Success,
    /// `System.ExtrinsicFailed`; `payload` is the hex-encoded dispatch error.
    Failed { payload: String },
    Other { pallet: String, variant: String },
}

/// Status update from the transaction pool subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatusUpdate {
    /// Validated and broadcast.
    Ready,
    /// Included in a block, with this extrinsic's events.
    InBlock {
        block_hash: String,
        events: Vec<ExtrinsicEvent>,
    },
    /// Invalid, dropped or otherwise rejected by the pool.
    Dropped { reason: String },
}

/// Lifecycle state of one extrinsic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxState {
    Submitted,
    Ready,
    InBlock { block_hash: String },
    Success { block_hash: String },
    Failed { block_hash: String, payload: String },
}

impl TxState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Failed { .. })
    }

    /// Fold one status update into the state.
    ///
    /// Terminal states absorb every update. A drop before resolution is an
    /// error. Inclusion without a dispatch outcome event keeps the state at
    /// `InBlock` until a later update (e.g. finalization) carries one.
    pub fn apply(self, update: TxStatusUpdate) -> Result<TxState, ChainError> {
        if self.is_terminal() {
            return Ok(self);
        }

        match update {
            TxStatusUpdate::Ready => Ok(match self {
                Self::Submitted => Self::Ready,
                other => other,
            }),
            TxStatusUpdate::InBlock { block_hash, events } => {
                for event in events {
                    match event {
                        ExtrinsicEvent::Failed { payload } => {
                            return Ok(Self::Failed {
                                block_hash,
                                payload,
                            })
                        }
                        ExtrinsicEvent::Success => return Ok(Self::Success { block_hash }),
                        ExtrinsicEvent::Other { .. } => {}
                    }
                }
                Ok(Self::InBlock { block_hash })
            }
            TxStatusUpdate::Dropped { reason } => Err(ChainError::TxRejected { reason }),
        }
    }
}

/// Successful inclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub block_hash: String,
}

/// Drive `stream` until the extrinsic resolves.
///
/// Resolves exactly once: `Success` yields a receipt, `Failed` yields
/// [`ChainError::ExtrinsicFailed`] with the dispatch error payload, and a
/// stream that ends first yields [`ChainError::TxStreamClosed`].
pub async fn watch_transaction(mut stream: TxStatusStream) -> Result<TxReceipt, ChainError> {
    let mut state = TxState::Submitted;

    while let Some(update) = stream.next().await {
        let next = state.clone().apply(update?)?;
        if next == state {
            continue;
        }

        match &next {
            TxState::Ready => info!("Liquidation transaction broadcast"),
            TxState::InBlock { block_hash } => {
                debug!(block = %block_hash, "Transaction in block without outcome event")
            }
            TxState::Success { block_hash } => {
                info!(block = %block_hash, "Liquidation transaction included");
                return Ok(TxReceipt {
                    block_hash: block_hash.clone(),
                });
            }
            TxState::Failed {
                block_hash,
                payload,
            } => {
                return Err(ChainError::ExtrinsicFailed {
                    block_hash: block_hash.clone(),
                    payload: payload.clone(),
                });
            }
            TxState::Submitted => {}
        }
        state = next;
    }

    Err(ChainError::TxStreamClosed)
}
