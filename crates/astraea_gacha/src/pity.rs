//! # Pity Engine
//!
//! The stateful correction pass behind every draw batch.
//!
//! Conceptually each currency moves through four states: `Normal`,
//! `HalfOwed`, `HardOwed` and `HardOwedDeferred`. The engine advances the
//! per-currency counter item by item in draw order, triggers the graduated
//! weight shift past the half-threshold, and decides whether a bonus
//! guarantee item is owed once the whole batch is processed.
//!
//! Invariants the engine maintains:
//!
//! - the counter stays in `[0, threshold]` after processing, never negative
//!   (every decrement clamps at zero)
//! - overflow progress is never lost: a top-rarity hit past the threshold
//!   flags the deferred-hard path instead of dropping the owed payout
//! - at most one bonus per batch, priority deferred-hard > hard > half
//! - the half guarantee pays once per cycle; only a top-rarity hit opens a
//!   new cycle

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::{CurrencyConfig, GuaranteeRule, Item, Rarity};
use crate::weights::WeightTable;

/// Per-currency pity counters and flags.
///
/// Loaded from persistence at currency initialization, mutated only by
/// [`PityEngine`], and never destroyed - only reset to zero/false.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PityState {
    /// Draws since the counter was last zeroed by a top-rarity hit.
    pub count: u32,
    /// Whether the half-threshold guarantee was paid out this cycle.
    pub half_claimed: bool,
    /// The counter reached the full threshold; a hard guarantee is owed.
    pub hard_pending: bool,
    /// A top-rarity item landed in the same batch that crossed the
    /// threshold; the hard guarantee is still owed, paid on the deferred
    /// path alongside that hit.
    pub hard_deferred_by_top: bool,
}

/// Which guarantee tier paid out a bonus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuaranteeTier {
    /// Full-threshold (or deferred full-threshold) guarantee.
    Hard,
    /// Half-threshold guarantee.
    Half,
}

/// A bonus item owed by a pity guarantee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PityReward {
    /// The granted item.
    pub item: Item,
    /// The guarantee tier that paid it.
    pub tier: GuaranteeTier,
}

/// The stateful pity pass: consumes drawn items, mutates [`PityState`],
/// triggers weight redistribution, and decides whether a bonus is owed.
pub struct PityEngine;

impl PityEngine {
    /// Processes a batch of drawn items in draw order.
    ///
    /// Per item: the counter advances; a top-rarity hit satisfies every
    /// outstanding guarantee (flagging the deferred path when the counter
    /// had already crossed the threshold), zeroes the counter and restores
    /// baseline weights; landing exactly on the threshold arms the hard
    /// guarantee and rolls the counter over; otherwise, currencies with
    /// graduated shift move sampling mass toward the top tier once the
    /// counter passes the half-threshold.
    pub fn apply_draws(
        config: &CurrencyConfig,
        state: &mut PityState,
        table: &mut WeightTable,
        items: &[Item],
    ) {
        let threshold = config.pity_threshold;
        let half = config.half_threshold();

        for item in items {
            state.count = state.count.saturating_add(1);

            if item.rarity == Rarity::TOP {
                if state.count > threshold {
                    // The hard payout was already owed when this top-rarity
                    // item landed; pay it on the deferred path instead of
                    // dropping it.
                    state.hard_deferred_by_top = true;
                    tracing::debug!(
                        currency = config.id,
                        count = state.count,
                        "hard guarantee deferred by top-rarity hit"
                    );
                }
                state.hard_pending = false;
                state.half_claimed = false;
                state.count = 0;
                table.reset_to_baseline();
                continue;
            }

            if state.count == threshold {
                state.count = state.count.saturating_sub(threshold);
                state.hard_pending = true;
                tracing::debug!(currency = config.id, "hard guarantee armed");
                continue;
            }

            if let Some(shift) = &config.graduated_shift {
                if state.count > half {
                    table.redistribute_toward_top(
                        state.count - half,
                        shift.increase_per_excess,
                    );
                }
            }
        }

        debug_assert!(state.count <= threshold);
    }

    /// Resolves at most one owed bonus after a batch is processed.
    ///
    /// The branches are mutually exclusive and checked in priority order:
    /// deferred-hard, then hard, then half. Paying a hard guarantee also
    /// reopens the half guarantee for the new cycle.
    pub fn claim_pity_reward<R: Rng>(
        config: &CurrencyConfig,
        state: &mut PityState,
        pool: &[Item],
        rng: &mut R,
    ) -> Option<PityReward> {
        if state.hard_deferred_by_top {
            state.hard_deferred_by_top = false;
            state.half_claimed = false;
            return Self::resolve(&config.hard_guarantee, pool, rng).map(|item| PityReward {
                item,
                tier: GuaranteeTier::Hard,
            });
        }

        if state.hard_pending {
            state.hard_pending = false;
            state.half_claimed = false;
            return Self::resolve(&config.hard_guarantee, pool, rng).map(|item| PityReward {
                item,
                tier: GuaranteeTier::Hard,
            });
        }

        if !state.half_claimed && state.count >= config.half_threshold() {
            state.half_claimed = true;
            return Self::resolve(&config.half_guarantee, pool, rng).map(|item| PityReward {
                item,
                tier: GuaranteeTier::Half,
            });
        }

        None
    }

    /// Uniform pick among the pool's items of the rule's resolved rarity,
    /// independent of the live weight table.
    fn resolve<R: Rng>(rule: &GuaranteeRule, pool: &[Item], rng: &mut R) -> Option<Item> {
        let rarity = match rule {
            GuaranteeRule::Fixed { rarity } => *rarity,
            GuaranteeRule::TopOrFallback {
                top_percent,
                fallback,
            } => {
                if rng.gen_range(0.0..100.0) < *top_percent {
                    Rarity::TOP
                } else {
                    *fallback
                }
            }
        };

        let candidates: Vec<&Item> = pool.iter().filter(|item| item.rarity == rarity).collect();
        candidates.choose(rng).map(|&item| item.clone())
    }
}
