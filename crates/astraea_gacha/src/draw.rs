//! # Draw Engine
//!
//! Stateless weighted sampling over a weight-table snapshot.
//!
//! The engine holds no state of its own: it reads the table, consumes
//! randomness from the caller's stream, and returns items. Pity bookkeeping
//! happens afterwards in [`crate::pity::PityEngine`] - the sampler neither
//! reads nor writes counters.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};

use crate::catalog::{CurrencyConfig, CurrencyId, Item, ItemId, Rarity};
use crate::error::{GachaError, GachaResult};
use crate::weights::WeightTable;

/// Batch size at which soft pity arms for currencies that configure it.
pub const SOFT_PITY_BATCH: usize = 10;

/// The stateless weighted sampler.
pub struct DrawEngine;

impl DrawEngine {
    /// Samples one item from the pool.
    ///
    /// Rolls uniformly in `[0, total)` and walks the entry list
    /// accumulating weight; the first entry whose cumulative weight exceeds
    /// the roll wins. `pool` must be the pool the table was built from
    /// (entries are index-aligned).
    ///
    /// # Errors
    ///
    /// [`GachaError::ExhaustedWeights`] if the table's total mass is not
    /// strictly positive. The table invariant makes this unreachable in a
    /// validated catalog; it is treated as fatal, not retried.
    pub fn draw_one<R: Rng>(
        pool: &[Item],
        table: &WeightTable,
        currency: CurrencyId,
        rng: &mut R,
    ) -> GachaResult<Item> {
        let total = table.total();
        if total <= 0.0 {
            return Err(GachaError::ExhaustedWeights(currency));
        }

        let roll = rng.gen_range(0.0..total);
        let mut cumulative = 0.0;
        for (index, entry) in table.entries().iter().enumerate() {
            cumulative += entry.weight();
            if roll < cumulative {
                return Ok(pool[index].clone());
            }
        }

        // Float accumulation can land the walk a hair short of `total`; the
        // last positively weighted entry absorbs the remainder.
        let index = table
            .entries()
            .iter()
            .rposition(|e| e.weight() > 0.0)
            .ok_or(GachaError::ExhaustedWeights(currency))?;
        Ok(pool[index].clone())
    }

    /// Samples an ordered batch of `count` items.
    ///
    /// For soft-pity currencies, a batch of [`SOFT_PITY_BATCH`] or more in
    /// which no sampled item reached Rare gets its **final slot** replaced
    /// by a uniform pick among the pool's Rare items. The substitution is
    /// post-hoc: it consumes one uniform index, never an extra weighted
    /// sample, and the pity engine sees the substituted batch like any
    /// other.
    ///
    /// # Errors
    ///
    /// Propagates [`GachaError::ExhaustedWeights`] from the underlying
    /// samples.
    pub fn draw_many<R: Rng>(
        pool: &[Item],
        table: &WeightTable,
        config: &CurrencyConfig,
        rng: &mut R,
        count: u32,
    ) -> GachaResult<Vec<Item>> {
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            items.push(Self::draw_one(pool, table, config.id, rng)?);
        }

        if config.soft_pity
            && items.len() >= SOFT_PITY_BATCH
            && items.iter().all(|item| item.rarity < Rarity::Rare)
        {
            let rares: Vec<&Item> = pool
                .iter()
                .filter(|item| item.rarity == Rarity::Rare)
                .collect();
            if let Some(substitute) = rares.choose(rng) {
                let last = items.len() - 1;
                items[last] = (*substitute).clone();
            }
        }

        Ok(items)
    }

    /// Runs `iterations` single draws against the table for balance
    /// verification, without touching pity state or the live stream.
    ///
    /// # Errors
    ///
    /// Propagates [`GachaError::ExhaustedWeights`].
    pub fn simulate<R: Rng>(
        pool: &[Item],
        table: &WeightTable,
        currency: CurrencyId,
        rng: &mut R,
        iterations: u32,
    ) -> GachaResult<DrawStatistics> {
        let mut stats = DrawStatistics::default();
        for _ in 0..iterations {
            let item = Self::draw_one(pool, table, currency, rng)?;
            stats.total_draws += 1;
            *stats.rarity_counts.entry(item.rarity).or_insert(0) += 1;
            *stats.item_counts.entry(item.id).or_insert(0) += 1;
        }
        Ok(stats)
    }
}

/// Rarity and item histograms from a simulated run.
#[derive(Clone, Debug, Default)]
pub struct DrawStatistics {
    /// Total draws performed.
    pub total_draws: u64,
    /// Draw counts per rarity tier.
    pub rarity_counts: BTreeMap<Rarity, u64>,
    /// Draw counts per item.
    pub item_counts: HashMap<ItemId, u64>,
}

impl DrawStatistics {
    /// Fraction of draws that landed on `rarity`.
    #[must_use]
    pub fn share_of(&self, rarity: Rarity) -> f64 {
        if self.total_draws == 0 {
            return 0.0;
        }
        let hits = self.rarity_counts.get(&rarity).copied().unwrap_or(0);
        hits as f64 / self.total_draws as f64
    }
}
