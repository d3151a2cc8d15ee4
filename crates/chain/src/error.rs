//! Errors surfaced by the chain layer.

use thiserror::Error;

/// Chain interaction error.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport or RPC failure talking to the node.
    #[error("rpc error: {0}")]
    Rpc(#[from] subxt::Error),

    /// A storage value or RPC result could not be decoded.
    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    /// Borrower identifier is not a valid SS58 account.
    #[error("invalid account id '{0}'")]
    InvalidAccount(String),

    /// Signing seed could not be turned into a keypair.
    #[error("invalid signing seed: {0}")]
    InvalidSeed(String),

    /// The extrinsic was included but emitted `ExtrinsicFailed`.
    #[error("extrinsic failed in block {block_hash}: {payload}")]
    ExtrinsicFailed { block_hash: String, payload: String },

    /// The transaction pool dropped or rejected the extrinsic.
    #[error("transaction rejected: {reason}")]
    TxRejected { reason: String },

    /// The status subscription ended before the extrinsic resolved.
    #[error("transaction status stream closed before inclusion")]
    TxStreamClosed,
}

impl ChainError {
    pub(crate) fn decode(what: &'static str, reason: impl ToString) -> Self {
        Self::Decode {
            what,
            reason: reason.to_string(),
        }
    }

    /// RPC failure described only by a message.
    pub fn rpc_message(message: impl Into<String>) -> Self {
        Self::Rpc(subxt::Error::Other(message.into()))
    }

    /// Network-level failure that the next scheduled cycle may not hit.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::TxStreamClosed)
    }

    /// Failure of a submitted transaction (included-and-failed or rejected by the pool).
    pub fn is_tx_failure(&self) -> bool {
        matches!(self, Self::ExtrinsicFailed { .. } | Self::TxRejected { .. })
    }
}
