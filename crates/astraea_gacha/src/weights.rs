//! # Weight Tables
//!
//! The mutable sampling mass behind one currency's summon pool.
//!
//! A table is built once at currency initialization from the catalog pool
//! and the configured per-rarity base weights: every item starts at
//! `base_weight(rarity) / count_of_rarity`. The pity engine is the only
//! mutator - it shifts mass toward the top tier past the half-threshold and
//! restores the baseline when a top-rarity item lands.
//!
//! Invariants:
//!
//! - every weight stays `>= 0` (decreases clamp at zero)
//! - entries stay index-aligned with the pool they were built from
//! - the baseline never changes after construction, so
//!   [`WeightTable::reset_to_baseline`] is idempotent

use crate::catalog::{BaseWeights, Item, ItemId, Rarity};
use crate::error::{GachaError, GachaResult};

/// One `(item, weight)` pair of a currency's sampling table.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightEntry {
    /// The referenced catalog item.
    pub item_id: ItemId,
    /// The item's rarity tier (copied from the catalog for cheap scans).
    pub rarity: Rarity,
    weight: f64,
    baseline: f64,
}

impl WeightEntry {
    /// Current sampling weight.
    #[inline]
    #[must_use]
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    /// Weight this entry was initialized with.
    #[inline]
    #[must_use]
    pub const fn baseline(&self) -> f64 {
        self.baseline
    }
}

/// Per-currency sampling table: an ordered list of `(item, weight)` entries
/// index-aligned with the pool it was built from.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightTable {
    entries: Vec<WeightEntry>,
}

impl WeightTable {
    /// Builds the baseline table for a currency pool.
    ///
    /// Each item's baseline is its rarity's configured mass divided by the
    /// number of pool items sharing that rarity.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::InvalidConfig`] if the resulting total mass is
    /// not strictly positive - such a table could never satisfy a draw.
    pub fn from_pool(pool: &[Item], base: &BaseWeights) -> GachaResult<Self> {
        let mut counts = [0u32; Rarity::ALL.len()];
        for item in pool {
            counts[item.rarity as usize] += 1;
        }

        let entries: Vec<WeightEntry> = pool
            .iter()
            .map(|item| {
                let share = base.of(item.rarity) / f64::from(counts[item.rarity as usize]);
                WeightEntry {
                    item_id: item.id,
                    rarity: item.rarity,
                    weight: share,
                    baseline: share,
                }
            })
            .collect();

        let table = Self { entries };
        if table.total() <= 0.0 {
            return Err(GachaError::InvalidConfig(
                "weight table has no positive sampling mass".to_string(),
            ));
        }
        Ok(table)
    }

    /// The ordered entries.
    #[must_use]
    pub fn entries(&self) -> &[WeightEntry] {
        &self.entries
    }

    /// Total sampling mass - the denominator of every draw.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.entries.iter().map(WeightEntry::weight).sum()
    }

    /// Current weight of one item, if present.
    #[must_use]
    pub fn weight_of(&self, item_id: ItemId) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.item_id == item_id)
            .map(WeightEntry::weight)
    }

    /// Restores every weight to its baseline.
    pub fn reset_to_baseline(&mut self) {
        for entry in &mut self.entries {
            entry.weight = entry.baseline;
        }
    }

    /// Shifts sampling mass toward the top tier.
    ///
    /// For `excess_draws` past the half-threshold, the top tier gains
    /// `increase_per_excess * excess_draws`, split evenly over its items;
    /// every other tier loses a quarter of that gain, split evenly over its
    /// items and floored at zero. Never fails - decreases clamp.
    pub fn redistribute_toward_top(&mut self, excess_draws: u32, increase_per_excess: f64) {
        if excess_draws == 0 {
            return;
        }
        let mut counts = [0u32; Rarity::ALL.len()];
        for entry in &self.entries {
            counts[entry.rarity as usize] += 1;
        }
        let top_count = counts[Rarity::TOP as usize];
        if top_count == 0 {
            return;
        }

        let gain = increase_per_excess * f64::from(excess_draws);
        let loss = gain / 4.0;
        for entry in &mut self.entries {
            if entry.rarity == Rarity::TOP {
                entry.weight += gain / f64::from(top_count);
            } else {
                let share = loss / f64::from(counts[entry.rarity as usize]);
                entry.weight = (entry.weight - share).max(0.0);
            }
        }
    }
}
