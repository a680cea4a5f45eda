//! # Catalog and Balance Configuration
//!
//! Static summon data: rarity tiers, the item catalog, and per-currency
//! tuning (draw cost, pity threshold, base weights, guarantee rules).
//!
//! Everything here is loaded once at server startup from an external TOML
//! file and validated up front, so the draw path never has to second-guess
//! the data it samples from. A catalog that passes [`Catalog::from_toml_str`]
//! guarantees:
//!
//! - every currency pool is non-empty and carries positive sampling mass
//! - every rarity a guarantee rule can resolve to exists in that pool
//! - soft-pity currencies have at least one Rare item to substitute

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::{GachaError, GachaResult};

/// Unique identifier for an item type.
pub type ItemId = u32;

/// Unique identifier for a summon currency (an independent gacha economy).
pub type CurrencyId = u32;

/// Rarity tier for summonable items.
///
/// The ordering is load-bearing: soft pity checks `>= Rare`, and guarantee
/// rules resolve against the top of this scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Rarity {
    /// Common items (gray) - the bulk of every pool.
    Common = 0,
    /// Rare items (blue).
    Rare = 1,
    /// Super-rare items (purple).
    SuperRare = 2,
    /// Legendary items (gold) - the top tier.
    Legendary = 3,
}

impl Rarity {
    /// All tiers, lowest first.
    pub const ALL: [Self; 4] = [Self::Common, Self::Rare, Self::SuperRare, Self::Legendary];

    /// The top rarity tier. Landing one of these resets a currency's pity
    /// cycle.
    pub const TOP: Self = Self::Legendary;
}

/// An immutable catalog entry for a summonable item.
///
/// Items belong to the global catalog and are referenced, never owned, by
/// weight tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Rarity tier.
    pub rarity: Rarity,
    /// Currencies whose pools contain this item.
    pub currencies: Vec<CurrencyId>,
}

/// Base sampling mass carried by each rarity tier of a currency.
///
/// The per-item baseline weight is the tier's mass divided by the number of
/// pool items sharing that tier.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseWeights {
    /// Total mass of the common tier.
    pub common: f64,
    /// Total mass of the rare tier.
    pub rare: f64,
    /// Total mass of the super-rare tier.
    pub super_rare: f64,
    /// Total mass of the legendary tier.
    pub legendary: f64,
}

impl BaseWeights {
    /// The configured mass for one tier.
    #[inline]
    #[must_use]
    pub const fn of(self, rarity: Rarity) -> f64 {
        match rarity {
            Rarity::Common => self.common,
            Rarity::Rare => self.rare,
            Rarity::SuperRare => self.super_rare,
            Rarity::Legendary => self.legendary,
        }
    }
}

/// Graduated weight-shift tuning for a currency.
///
/// Only currencies carrying this block shift sampling mass toward the top
/// tier as the pity counter advances past the half-threshold.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraduatedShift {
    /// Mass moved to the top tier per draw past the half-threshold.
    pub increase_per_excess: f64,
}

/// How a pity guarantee resolves the rarity of its bonus item.
///
/// The bonus item itself is always a uniform pick among the currency pool's
/// items of the resolved rarity, independent of the live weight table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuaranteeRule {
    /// Always resolve to a fixed rarity.
    Fixed {
        /// The guaranteed rarity.
        rarity: Rarity,
    },
    /// Roll `top_percent` for the top tier, otherwise the fallback tier.
    TopOrFallback {
        /// Chance of the top tier, in percent (0-100).
        top_percent: f64,
        /// Rarity granted when the top roll misses.
        fallback: Rarity,
    },
}

impl GuaranteeRule {
    /// Every rarity this rule can resolve to.
    fn reachable(self) -> Vec<Rarity> {
        match self {
            Self::Fixed { rarity } => vec![rarity],
            Self::TopOrFallback { fallback, .. } => vec![Rarity::TOP, fallback],
        }
    }
}

/// Balance configuration for one summon currency.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrencyConfig {
    /// Unique identifier.
    pub id: CurrencyId,
    /// Display name ("standard", "premium", ...).
    pub name: String,
    /// Currency units consumed per draw.
    pub cost_per_draw: u64,
    /// Draw count at which the hard guarantee triggers.
    pub pity_threshold: u32,
    /// Base sampling mass per rarity tier.
    pub base_weights: BaseWeights,
    /// Whether 10-draw batches substitute a Rare into the final slot when
    /// the whole batch lands below Rare.
    #[serde(default)]
    pub soft_pity: bool,
    /// Graduated weight-shift tuning; absent for currencies that keep their
    /// baseline weights all cycle.
    #[serde(default)]
    pub graduated_shift: Option<GraduatedShift>,
    /// Resolution rule for the full-threshold guarantee.
    pub hard_guarantee: GuaranteeRule,
    /// Resolution rule for the half-threshold guarantee.
    pub half_guarantee: GuaranteeRule,
}

impl CurrencyConfig {
    /// The half-pity threshold (integer floor of half the hard threshold).
    #[inline]
    #[must_use]
    pub const fn half_threshold(&self) -> u32 {
        self.pity_threshold / 2
    }
}

/// Raw TOML shape: `[[currency]]` and `[[item]]` array-of-table blocks.
#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default, rename = "currency")]
    currencies: Vec<CurrencyConfig>,
    #[serde(default, rename = "item")]
    items: Vec<Item>,
}

/// The validated item catalog plus per-currency balance data.
#[derive(Clone, Debug)]
pub struct Catalog {
    currencies: BTreeMap<CurrencyId, CurrencyConfig>,
    items: Vec<Item>,
    pools: BTreeMap<CurrencyId, Vec<usize>>,
}

impl Catalog {
    /// Parses and validates a catalog from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::InvalidConfig`] on parse failure or any
    /// violated catalog invariant.
    pub fn from_toml_str(raw: &str) -> GachaResult<Self> {
        let raw: RawCatalog =
            toml::from_str(raw).map_err(|e| GachaError::InvalidConfig(e.to_string()))?;
        Self::new(raw.currencies, raw.items)
    }

    /// Builds a catalog from already-deserialized parts, validating every
    /// invariant the draw path relies on.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::InvalidConfig`] describing the first violated
    /// invariant.
    pub fn new(currencies: Vec<CurrencyConfig>, items: Vec<Item>) -> GachaResult<Self> {
        if currencies.is_empty() {
            return Err(GachaError::InvalidConfig(
                "catalog defines no currencies".to_string(),
            ));
        }

        let mut by_id = BTreeMap::new();
        for config in currencies {
            validate_currency(&config)?;
            if by_id.insert(config.id, config.clone()).is_some() {
                return Err(GachaError::InvalidConfig(format!(
                    "duplicate currency id {}",
                    config.id
                )));
            }
        }

        let mut seen_items = HashSet::new();
        let mut pools: BTreeMap<CurrencyId, Vec<usize>> =
            by_id.keys().map(|&id| (id, Vec::new())).collect();
        for (index, item) in items.iter().enumerate() {
            if !seen_items.insert(item.id) {
                return Err(GachaError::InvalidConfig(format!(
                    "duplicate item id {}",
                    item.id
                )));
            }
            if item.currencies.is_empty() {
                return Err(GachaError::InvalidConfig(format!(
                    "item {} belongs to no currency pool",
                    item.id
                )));
            }
            for currency in &item.currencies {
                let pool = pools.get_mut(currency).ok_or_else(|| {
                    GachaError::InvalidConfig(format!(
                        "item {} references unknown currency {currency}",
                        item.id
                    ))
                })?;
                pool.push(index);
            }
        }

        let catalog = Self {
            currencies: by_id,
            items,
            pools,
        };
        for config in catalog.currencies.values() {
            catalog.validate_pool(config)?;
        }
        Ok(catalog)
    }

    /// Cross-checks one currency's pool against its configuration.
    fn validate_pool(&self, config: &CurrencyConfig) -> GachaResult<()> {
        let pool = &self.pools[&config.id];
        if pool.is_empty() {
            return Err(GachaError::InvalidConfig(format!(
                "currency {} has an empty item pool",
                config.id
            )));
        }

        let has_rarity =
            |rarity: Rarity| pool.iter().any(|&i| self.items[i].rarity == rarity);

        let mass: f64 = Rarity::ALL
            .iter()
            .filter(|&&r| has_rarity(r))
            .map(|&r| config.base_weights.of(r))
            .sum();
        if mass <= 0.0 {
            return Err(GachaError::InvalidConfig(format!(
                "currency {} carries no positive sampling mass",
                config.id
            )));
        }

        for rule in [&config.hard_guarantee, &config.half_guarantee] {
            for rarity in rule.reachable() {
                if !has_rarity(rarity) {
                    return Err(GachaError::InvalidConfig(format!(
                        "currency {} guarantee resolves to {rarity:?} but its pool has none",
                        config.id
                    )));
                }
            }
        }

        if config.soft_pity && !has_rarity(Rarity::Rare) {
            return Err(GachaError::InvalidConfig(format!(
                "currency {} enables soft pity without a Rare item to substitute",
                config.id
            )));
        }
        if config.graduated_shift.is_some() && !has_rarity(Rarity::TOP) {
            return Err(GachaError::InvalidConfig(format!(
                "currency {} enables graduated shift without a top-rarity item",
                config.id
            )));
        }
        Ok(())
    }

    /// Configuration for one currency.
    #[must_use]
    pub fn currency(&self, id: CurrencyId) -> Option<&CurrencyConfig> {
        self.currencies.get(&id)
    }

    /// All configured currencies, in id order.
    pub fn currencies(&self) -> impl Iterator<Item = &CurrencyConfig> {
        self.currencies.values()
    }

    /// The ordered item pool for a currency (catalog order).
    ///
    /// Returns owned clones: callers snapshot the pool at initialization
    /// and the catalog stays immutable afterwards.
    #[must_use]
    pub fn items_for_currency(&self, id: CurrencyId) -> Vec<Item> {
        self.pools
            .get(&id)
            .map(|pool| pool.iter().map(|&i| self.items[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Pool items of one rarity for a currency, in catalog order.
    #[must_use]
    pub fn items_of_rarity(&self, id: CurrencyId, rarity: Rarity) -> Vec<&Item> {
        self.pools
            .get(&id)
            .map(|pool| {
                pool.iter()
                    .map(|&i| &self.items[i])
                    .filter(|item| item.rarity == rarity)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Validates a single currency's standalone tuning values.
fn validate_currency(config: &CurrencyConfig) -> GachaResult<()> {
    if config.cost_per_draw == 0 {
        return Err(GachaError::InvalidConfig(format!(
            "currency {} has a zero draw cost",
            config.id
        )));
    }
    if config.pity_threshold < 2 {
        return Err(GachaError::InvalidConfig(format!(
            "currency {} pity threshold must be at least 2",
            config.id
        )));
    }
    for rarity in Rarity::ALL {
        let mass = config.base_weights.of(rarity);
        if !mass.is_finite() || mass < 0.0 {
            return Err(GachaError::InvalidConfig(format!(
                "currency {} base weight for {rarity:?} must be finite and non-negative",
                config.id
            )));
        }
    }
    if let Some(shift) = &config.graduated_shift {
        if !shift.increase_per_excess.is_finite() || shift.increase_per_excess <= 0.0 {
            return Err(GachaError::InvalidConfig(format!(
                "currency {} graduated shift must move positive mass",
                config.id
            )));
        }
    }
    for rule in [&config.hard_guarantee, &config.half_guarantee] {
        if let GuaranteeRule::TopOrFallback { top_percent, .. } = rule {
            if !top_percent.is_finite() || !(0.0..=100.0).contains(top_percent) {
                return Err(GachaError::InvalidConfig(format!(
                    "currency {} guarantee percentage {top_percent} out of range",
                    config.id
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[currency]]
        id = 1
        name = "standard"
        cost_per_draw = 100
        pity_threshold = 100
        soft_pity = true
        base_weights = { common = 70.0, rare = 20.0, super_rare = 8.0, legendary = 2.0 }
        hard_guarantee = { kind = "top_or_fallback", top_percent = 50.0, fallback = "super_rare" }
        half_guarantee = { kind = "fixed", rarity = "super_rare" }

        [[currency]]
        id = 2
        name = "premium"
        cost_per_draw = 150
        pity_threshold = 90
        graduated_shift = { increase_per_excess = 0.5 }
        base_weights = { common = 60.0, rare = 25.0, super_rare = 12.0, legendary = 3.0 }
        hard_guarantee = { kind = "fixed", rarity = "legendary" }
        half_guarantee = { kind = "top_or_fallback", top_percent = 25.0, fallback = "super_rare" }

        [[item]]
        id = 10
        name = "Ember Blade"
        rarity = "common"
        currencies = [1, 2]

        [[item]]
        id = 11
        name = "Gale Charm"
        rarity = "rare"
        currencies = [1, 2]

        [[item]]
        id = 12
        name = "Tide Sigil"
        rarity = "super_rare"
        currencies = [1, 2]

        [[item]]
        id = 13
        name = "Sun Regalia"
        rarity = "legendary"
        currencies = [1, 2]
    "#;

    #[test]
    fn rarity_ordering_is_ascending() {
        assert!(Rarity::Common < Rarity::Rare);
        assert!(Rarity::Rare < Rarity::SuperRare);
        assert!(Rarity::SuperRare < Rarity::Legendary);
        assert_eq!(Rarity::TOP, Rarity::Legendary);
    }

    #[test]
    fn parses_sample_catalog() {
        let catalog = Catalog::from_toml_str(SAMPLE).unwrap();
        assert_eq!(catalog.currencies().count(), 2);

        let standard = catalog.currency(1).unwrap();
        assert!(standard.soft_pity);
        assert!(standard.graduated_shift.is_none());
        assert_eq!(standard.half_threshold(), 50);

        let premium = catalog.currency(2).unwrap();
        assert_eq!(premium.cost_per_draw, 150);
        assert!(premium.graduated_shift.is_some());

        assert_eq!(catalog.items_for_currency(1).len(), 4);
        assert_eq!(catalog.items_of_rarity(2, Rarity::Legendary).len(), 1);
    }

    #[test]
    fn rejects_unknown_currency_reference() {
        let broken = SAMPLE.replace("currencies = [1, 2]", "currencies = [1, 9]");
        let err = Catalog::from_toml_str(&broken).unwrap_err();
        assert!(matches!(err, GachaError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_guarantee_without_matching_pool_item() {
        // Remove the only legendary item; currency 2's hard guarantee can
        // no longer resolve.
        let truncated = &SAMPLE[..SAMPLE.find("[[item]]\n        id = 13").unwrap()];
        let err = Catalog::from_toml_str(truncated).unwrap_err();
        assert!(matches!(err, GachaError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_out_of_range_percentage() {
        let broken = SAMPLE.replace("top_percent = 50.0", "top_percent = 140.0");
        let err = Catalog::from_toml_str(&broken).unwrap_err();
        assert!(matches!(err, GachaError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_empty_catalog() {
        let err = Catalog::from_toml_str("").unwrap_err();
        assert!(matches!(err, GachaError::InvalidConfig(_)));
    }
}
