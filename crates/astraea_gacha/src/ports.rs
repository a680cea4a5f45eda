//! # Collaborator Interfaces
//!
//! The engine's boundary with the rest of the server: currency ledger,
//! inventory storage and pity persistence. Implementations are injected
//! into the coordinator at construction - there are no ambient singletons,
//! which keeps the engine testable with in-memory fakes.
//!
//! The async methods are the only points where a transaction suspends; the
//! sampling and pity steps are pure in-memory computation.

use std::future::Future;

use crate::catalog::{CurrencyId, Item};
use crate::error::GachaResult;
use crate::pity::PityState;

/// Read/debit access to the player's currency balances.
pub trait Ledger: Send + Sync {
    /// Whether the player holds at least `amount` of `currency`.
    fn has_balance(&self, currency: CurrencyId, amount: u64) -> bool;

    /// Debits `amount` of `currency`. Must commit before any sampling is
    /// performed; a failure after commit surfaces as a partial failure.
    fn debit(
        &self,
        currency: CurrencyId,
        amount: u64,
    ) -> impl Future<Output = GachaResult<()>> + Send;
}

/// Item storage on the receiving end of a draw.
pub trait InventorySink: Send + Sync {
    /// Whether `slots` more items fit.
    fn has_capacity(&self, slots: u32) -> bool;

    /// Grants `items` to the player.
    fn grant(&self, items: Vec<Item>) -> impl Future<Output = GachaResult<()>> + Send;
}

/// Durable storage for per-currency pity counters.
pub trait PityStore: Send + Sync {
    /// Loads the persisted state for `currency`; a currency never drawn on
    /// before starts from the default (all zero/false) state.
    fn load_state(&self, currency: CurrencyId) -> PityState;

    /// Persists `state`. Called after every apply/claim pair; a batch only
    /// reports success once its counters are durable.
    fn save_state(
        &self,
        currency: CurrencyId,
        state: PityState,
    ) -> impl Future<Output = GachaResult<()>> + Send;
}
