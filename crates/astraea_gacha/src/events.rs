//! # Observer Events
//!
//! In-process events describing settled draws, buffered by the coordinator
//! and drained by the presentation layer once per frame. The engine never
//! blocks on observers; a full buffer is the observer's problem to drain.

use crate::catalog::{CurrencyId, ItemId, Rarity};
use crate::pity::GuaranteeTier;

/// Events emitted by settled draw batches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GachaEvent {
    /// A draw batch settled.
    BatchSettled {
        /// The currency drawn on.
        currency: CurrencyId,
        /// Drawn item ids in draw order.
        item_ids: Vec<ItemId>,
        /// Bonus item id, when a guarantee paid out.
        bonus: Option<ItemId>,
    },
    /// A pity guarantee paid out.
    GuaranteePaid {
        /// The currency whose guarantee fired.
        currency: CurrencyId,
        /// The granted bonus item.
        item_id: ItemId,
        /// The guarantee tier that paid.
        tier: GuaranteeTier,
    },
    /// A top-rarity item landed in the sampled batch (special
    /// presentation).
    TopRarityHit {
        /// The currency drawn on.
        currency: CurrencyId,
        /// The landed item.
        item_id: ItemId,
        /// Its rarity tier.
        rarity: Rarity,
    },
}
