//! # Transaction Records
//!
//! Staged bookkeeping for one draw batch.
//!
//! The debit-to-persist window is an explicit saga: every step advances a
//! recorded stage, so a failure after the debit names exactly where it died
//! instead of leaving an opaque dangling task. The coordinator wraps any
//! such failure as [`GachaError::PartialFailure`] carrying the stage.

use crate::catalog::{CurrencyId, Item};
use crate::error::GachaError;
use crate::pity::PityReward;

/// Stages of a draw transaction that run after the preconditions pass.
///
/// Anything failing from [`TxnStage::Debit`] onward is a partial failure:
/// currency may already have moved, so the stage is surfaced for
/// reconciliation instead of a silent retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnStage {
    /// Debiting the currency ledger.
    Debit,
    /// Sampling the weighted pool.
    Draw,
    /// Advancing pity counters and weight redistribution.
    PityUpdate,
    /// Granting the drawn items to the inventory.
    Grant,
    /// Granting the pity bonus item, when one is owed.
    BonusGrant,
    /// Persisting the updated pity state.
    Persist,
}

/// Running record of one draw transaction.
#[derive(Debug)]
pub struct DrawTransaction {
    currency: CurrencyId,
    draw_count: u32,
    stage: TxnStage,
}

impl DrawTransaction {
    /// Opens a transaction record at the debit stage.
    #[must_use]
    pub fn begin(currency: CurrencyId, draw_count: u32) -> Self {
        let txn = Self {
            currency,
            draw_count,
            stage: TxnStage::Debit,
        };
        tracing::debug!(currency, draw_count, stage = ?txn.stage, "transaction opened");
        txn
    }

    /// Advances to `stage`, tracing the transition.
    pub fn advance(&mut self, stage: TxnStage) {
        self.stage = stage;
        tracing::debug!(
            currency = self.currency,
            draw_count = self.draw_count,
            stage = ?stage,
            "transaction stage"
        );
    }

    /// The stage currently in flight.
    #[must_use]
    pub const fn stage(&self) -> TxnStage {
        self.stage
    }

    /// Wraps `cause` as a partial failure at the current stage.
    #[must_use]
    pub fn fail(&self, cause: GachaError) -> GachaError {
        tracing::warn!(
            currency = self.currency,
            draw_count = self.draw_count,
            stage = ?self.stage,
            %cause,
            "transaction failed after debit"
        );
        GachaError::PartialFailure {
            stage: self.stage,
            source: Box::new(cause),
        }
    }
}

/// Settled outcome of a draw batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Drawn items in draw order.
    pub items: Vec<Item>,
    /// Bonus item owed by a pity guarantee, if any.
    pub bonus: Option<PityReward>,
}
