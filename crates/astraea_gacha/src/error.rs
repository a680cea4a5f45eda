//! # Gacha Error Types
//!
//! All errors that can occur in the summon engine.
//!
//! The taxonomy draws a hard line at the ledger debit: everything before it
//! fails fast with no side effects, everything after it is a
//! [`GachaError::PartialFailure`] that names the stage which died so the
//! caller can distinguish "nothing happened" from "currency spent, items may
//! be missing".

use thiserror::Error;

use crate::catalog::CurrencyId;
use crate::transaction::TxnStage;

/// Errors that can occur in the summon engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GachaError {
    /// The player cannot afford the requested batch. Checked before any
    /// state is touched.
    #[error("insufficient funds: batch costs {required} of currency {currency}")]
    InsufficientFunds {
        /// The currency being spent.
        currency: CurrencyId,
        /// Total cost of the batch.
        required: u64,
    },

    /// The inventory cannot hold the batch plus a possible bonus item.
    /// Checked before any state is touched.
    #[error("insufficient capacity: need {required} free slots")]
    InsufficientCapacity {
        /// Slots needed (batch size plus one reserved for the bonus).
        required: u32,
    },

    /// Another transaction already holds this currency's state.
    #[error("transaction already in progress for currency {0}")]
    TransactionInProgress(CurrencyId),

    /// The total sampling mass of a weight table is not strictly positive.
    /// Indicates corrupted catalog or configuration; fatal, never retried.
    #[error("exhausted weights for currency {0}: total sampling mass is not positive")]
    ExhaustedWeights(CurrencyId),

    /// The debit committed but a later step failed. Surfaced for manual
    /// reconciliation; a blind retry could double-debit or double-grant.
    #[error("partial failure at stage {stage:?} after debit: {source}")]
    PartialFailure {
        /// The transaction stage that failed.
        stage: TxnStage,
        /// The underlying failure.
        #[source]
        source: Box<GachaError>,
    },

    /// Currency id not present in the catalog.
    #[error("unknown currency: {0}")]
    UnknownCurrency(CurrencyId),

    /// Invalid configuration or catalog data.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An external collaborator (ledger, inventory, pity persistence)
    /// reported a failure.
    #[error("collaborator failure: {0}")]
    Collaborator(String),
}

/// Result type for gacha operations.
pub type GachaResult<T> = Result<T, GachaError>;
