//! # ASTRAEA Gacha Engine
//!
//! Pure Rust summon logic for the ASTRAEA game server.
//!
//! ## Design Principles
//!
//! 1. **Server authoritative** - client-side rolls are untrusted and ignored
//! 2. **Deterministic sampling** - seedable ChaCha20 streams, one per currency
//! 3. **Transactional settlement** - the debit lands before sampling; anything
//!    failing afterwards surfaces as a partial failure, never a blind retry
//! 4. **External configuration** - all balance data in TOML files
//!
//! ## Example
//!
//! ```rust,ignore
//! use astraea_gacha::{Catalog, GachaCoordinator};
//!
//! let catalog = Catalog::from_toml_str(&std::fs::read_to_string("data/gacha.toml")?)?;
//! let coordinator = GachaCoordinator::new(&catalog, ledger, inventory, store, &seed)?;
//!
//! // Ten premium draws: debit, sample, pity pass, grants, persistence.
//! let outcome = coordinator.execute(PREMIUM, 10).await?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod catalog;
pub mod coordinator;
pub mod draw;
pub mod error;
pub mod events;
pub mod pity;
pub mod ports;
pub mod rng;
pub mod transaction;
pub mod weights;

pub use catalog::{
    BaseWeights, Catalog, CurrencyConfig, CurrencyId, GraduatedShift, GuaranteeRule, Item, ItemId,
    Rarity,
};
pub use coordinator::GachaCoordinator;
pub use draw::{DrawEngine, DrawStatistics, SOFT_PITY_BATCH};
pub use error::{GachaError, GachaResult};
pub use events::GachaEvent;
pub use pity::{GuaranteeTier, PityEngine, PityReward, PityState};
pub use ports::{InventorySink, Ledger, PityStore};
pub use rng::currency_rng;
pub use transaction::{BatchOutcome, DrawTransaction, TxnStage};
pub use weights::{WeightEntry, WeightTable};
