//! Chain interaction layer for the liquidation client.
//!
//! This crate provides:
//! - On-chain types of the loans, oracle and assets pallets (SCALE codecs)
//! - The [`LoansApi`] trait the pipeline is written against
//! - [`ParachainClient`], the WebSocket implementation of that trait
//! - The signing [`Agent`]
//! - Typed calls and the extrinsic lifecycle state machine

mod api;
mod client;
mod error;
mod signer;
pub mod tx;
pub mod types;

pub use api::{LoansApi, TxStatusStream};
pub use client::ParachainClient;
pub use error::ChainError;
pub use signer::Agent;
pub use tx::{
    watch_transaction, ExtrinsicEvent, LoansCall, TxReceipt, TxState, TxStatusUpdate,
};
pub use types::{
    AccountId, AssetMetadata, Balance, BorrowSnapshot, CurrencyId, Deposits, Market, MarketState,
    Rate, Ratio, ThresholdLiquidity,
};
