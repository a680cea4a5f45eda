//! # Transaction Coordinator
//!
//! **THE DESK** - every summon settles here or not at all.
//!
//! The coordinator owns all mutable per-currency state and orchestrates the
//! full draw cycle against the injected collaborators:
//!
//! ```text
//! execute(currency, n)
//!     │
//!     ├── capacity check (n + 1 slots)      ── fail fast, no side effects
//!     ├── funds check (cost * n)            ── fail fast, no side effects
//!     │
//!     ├── debit ledger          ┐
//!     ├── sample n items        │  per-currency lock held,
//!     ├── pity pass             │  failures surface as
//!     ├── grant items           │  PartialFailure(stage)
//!     ├── grant bonus (if owed) │
//!     └── persist pity state    ┘
//! ```
//!
//! ## Concurrency
//!
//! One transaction per currency at a time: each currency's book sits behind
//! its own async mutex, held from the debit through persistence. A second
//! request for the same currency is rejected with `TransactionInProgress`;
//! requests for different currencies proceed independently since their
//! state is fully partitioned. There is no cancellation mid-transaction -
//! once the debit commits, the batch runs to completion or surfaces a
//! partial failure for reconciliation.

use std::collections::HashMap;
use std::sync::Arc;

use rand_chacha::ChaCha20Rng;
use tokio::sync::Mutex;

use crate::catalog::{Catalog, CurrencyConfig, CurrencyId, Item, ItemId, Rarity};
use crate::draw::{DrawEngine, DrawStatistics};
use crate::error::{GachaError, GachaResult};
use crate::events::GachaEvent;
use crate::pity::{PityEngine, PityReward, PityState};
use crate::ports::{InventorySink, Ledger, PityStore};
use crate::rng::currency_rng;
use crate::transaction::{BatchOutcome, DrawTransaction, TxnStage};
use crate::weights::WeightTable;

/// Mutable per-currency state: the pool snapshot, its weight table, pity
/// counters and the currency's draw stream. One book exists per catalog
/// currency, each behind its own lock.
struct CurrencyBook {
    config: CurrencyConfig,
    pool: Vec<Item>,
    weights: WeightTable,
    pity: PityState,
    rng: ChaCha20Rng,
}

/// The transaction coordinator for one player's summons.
///
/// ## Thread safety
///
/// The coordinator is `Send + Sync`: per-currency books live behind async
/// mutexes, the observer buffer behind a synchronous lock, and the
/// collaborators are required to be `Send + Sync` themselves.
pub struct GachaCoordinator<L, I, P> {
    books: HashMap<CurrencyId, Arc<Mutex<CurrencyBook>>>,
    ledger: L,
    inventory: I,
    store: P,
    events: parking_lot::Mutex<Vec<GachaEvent>>,
}

impl<L, I, P> GachaCoordinator<L, I, P>
where
    L: Ledger,
    I: InventorySink,
    P: PityStore,
{
    /// Builds a coordinator from a validated catalog and a 32-byte master
    /// seed. Each currency gets its baseline weight table, its persisted
    /// pity counters, and its own ChaCha20 draw stream.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::InvalidConfig`] if a currency pool cannot form
    /// a positive-mass weight table.
    pub fn new(
        catalog: &Catalog,
        ledger: L,
        inventory: I,
        store: P,
        master_seed: &[u8; 32],
    ) -> GachaResult<Self> {
        let mut books = HashMap::new();
        for config in catalog.currencies() {
            let pool = catalog.items_for_currency(config.id);
            let weights = WeightTable::from_pool(&pool, &config.base_weights)?;
            let pity = store.load_state(config.id);
            let rng = currency_rng(master_seed, config.id);
            books.insert(
                config.id,
                Arc::new(Mutex::new(CurrencyBook {
                    config: config.clone(),
                    pool,
                    weights,
                    pity,
                    rng,
                })),
            );
        }
        Ok(Self {
            books,
            ledger,
            inventory,
            store,
            events: parking_lot::Mutex::new(Vec::new()),
        })
    }

    /// Executes one draw batch: precondition checks, ledger debit, weighted
    /// sampling, pity pass, inventory grants and pity persistence.
    ///
    /// # Errors
    ///
    /// - [`GachaError::UnknownCurrency`] for an unconfigured currency
    /// - [`GachaError::TransactionInProgress`] when the currency's book is
    ///   already held by another transaction
    /// - [`GachaError::InsufficientCapacity`] / [`GachaError::InsufficientFunds`]
    ///   from the precondition checks; nothing was mutated
    /// - [`GachaError::PartialFailure`] for anything failing after the
    ///   debit; the stage names where it died and the batch must be
    ///   reconciled, never blindly retried
    pub async fn execute(
        &self,
        currency: CurrencyId,
        draw_count: u32,
    ) -> GachaResult<BatchOutcome> {
        if draw_count == 0 {
            return Err(GachaError::InvalidConfig(
                "draw batch must contain at least one draw".to_string(),
            ));
        }

        let book = self
            .books
            .get(&currency)
            .ok_or(GachaError::UnknownCurrency(currency))?;
        let mut book = book
            .try_lock()
            .map_err(|_| GachaError::TransactionInProgress(currency))?;
        let book = &mut *book;

        // Preconditions fail fast with no side effects. The +1 reserves
        // room for a possible bonus item.
        let slots = draw_count.saturating_add(1);
        if !self.inventory.has_capacity(slots) {
            return Err(GachaError::InsufficientCapacity { required: slots });
        }
        let cost = book.config.cost_per_draw.saturating_mul(u64::from(draw_count));
        if !self.ledger.has_balance(currency, cost) {
            return Err(GachaError::InsufficientFunds {
                currency,
                required: cost,
            });
        }

        let mut txn = DrawTransaction::begin(currency, draw_count);

        // Money moves before sampling: a crash can only leave an
        // over-debit to reconcile, never an unpaid grant.
        self.ledger
            .debit(currency, cost)
            .await
            .map_err(|e| txn.fail(e))?;

        txn.advance(TxnStage::Draw);
        let items = DrawEngine::draw_many(
            &book.pool,
            &book.weights,
            &book.config,
            &mut book.rng,
            draw_count,
        )
        .map_err(|e| txn.fail(e))?;

        txn.advance(TxnStage::PityUpdate);
        PityEngine::apply_draws(&book.config, &mut book.pity, &mut book.weights, &items);

        txn.advance(TxnStage::Grant);
        self.inventory
            .grant(items.clone())
            .await
            .map_err(|e| txn.fail(e))?;

        txn.advance(TxnStage::BonusGrant);
        let bonus =
            PityEngine::claim_pity_reward(&book.config, &mut book.pity, &book.pool, &mut book.rng);
        if let Some(reward) = &bonus {
            self.inventory
                .grant(vec![reward.item.clone()])
                .await
                .map_err(|e| txn.fail(e))?;
        }

        txn.advance(TxnStage::Persist);
        self.store
            .save_state(currency, book.pity)
            .await
            .map_err(|e| txn.fail(e))?;

        self.record_events(currency, &items, bonus.as_ref());
        tracing::info!(
            currency,
            draw_count,
            bonus = bonus.is_some(),
            "draw batch settled"
        );

        Ok(BatchOutcome { items, bonus })
    }

    /// Queues observer events for a settled batch.
    fn record_events(&self, currency: CurrencyId, items: &[Item], bonus: Option<&PityReward>) {
        let mut events = self.events.lock();
        events.push(GachaEvent::BatchSettled {
            currency,
            item_ids: items.iter().map(|item| item.id).collect(),
            bonus: bonus.map(|reward| reward.item.id),
        });
        for item in items.iter().filter(|item| item.rarity == Rarity::TOP) {
            events.push(GachaEvent::TopRarityHit {
                currency,
                item_id: item.id,
                rarity: item.rarity,
            });
        }
        if let Some(reward) = bonus {
            events.push(GachaEvent::GuaranteePaid {
                currency,
                item_id: reward.item.id,
                tier: reward.tier,
            });
        }
    }

    /// Drains all pending observer events.
    pub fn drain_events(&self) -> Vec<GachaEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Current pity counters for `currency` (debug UI).
    ///
    /// # Errors
    ///
    /// [`GachaError::UnknownCurrency`] for an unconfigured currency.
    pub async fn pity_state(&self, currency: CurrencyId) -> GachaResult<PityState> {
        let book = self
            .books
            .get(&currency)
            .ok_or(GachaError::UnknownCurrency(currency))?;
        Ok(book.lock().await.pity)
    }

    /// Snapshot of `currency`'s ordered `(item, weight)` list (debug UI).
    ///
    /// # Errors
    ///
    /// [`GachaError::UnknownCurrency`] for an unconfigured currency.
    pub async fn weights(&self, currency: CurrencyId) -> GachaResult<Vec<(ItemId, f64)>> {
        let book = self
            .books
            .get(&currency)
            .ok_or(GachaError::UnknownCurrency(currency))?;
        let book = book.lock().await;
        Ok(book
            .weights
            .entries()
            .iter()
            .map(|entry| (entry.item_id, entry.weight()))
            .collect())
    }

    /// Runs an offline rarity-histogram simulation against `currency`'s
    /// current table, on a stream derived from `seed` - the live draw
    /// stream is never consumed.
    ///
    /// # Errors
    ///
    /// [`GachaError::UnknownCurrency`] for an unconfigured currency;
    /// propagates [`GachaError::ExhaustedWeights`] from sampling.
    pub async fn simulate(
        &self,
        currency: CurrencyId,
        iterations: u32,
        seed: &[u8; 32],
    ) -> GachaResult<DrawStatistics> {
        let book = self
            .books
            .get(&currency)
            .ok_or(GachaError::UnknownCurrency(currency))?;
        let book = book.lock().await;
        let mut rng = currency_rng(seed, currency);
        DrawEngine::simulate(&book.pool, &book.weights, currency, &mut rng, iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use tokio::sync::Semaphore;

    const SEED: [u8; 32] = [42u8; 32];
    const STANDARD: CurrencyId = 1;
    const PREMIUM: CurrencyId = 2;

    const CATALOG_TOML: &str = r#"
        [[currency]]
        id = 1
        name = "standard"
        cost_per_draw = 100
        pity_threshold = 10
        soft_pity = true
        base_weights = { common = 70.0, rare = 20.0, super_rare = 8.0, legendary = 0.0 }
        hard_guarantee = { kind = "fixed", rarity = "legendary" }
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

    fn catalog() -> Catalog {
        Catalog::from_toml_str(CATALOG_TOML).unwrap()
    }

    #[derive(Default)]
    struct FakeLedger {
        balances: SyncMutex<HashMap<CurrencyId, u64>>,
        debits: SyncMutex<Vec<(CurrencyId, u64)>>,
    }

    impl FakeLedger {
        fn with_balance(currency: CurrencyId, amount: u64) -> Self {
            let ledger = Self::default();
            ledger.balances.lock().insert(currency, amount);
            ledger
        }
    }

    impl Ledger for FakeLedger {
        fn has_balance(&self, currency: CurrencyId, amount: u64) -> bool {
            self.balances.lock().get(&currency).copied().unwrap_or(0) >= amount
        }

        async fn debit(&self, currency: CurrencyId, amount: u64) -> GachaResult<()> {
            let mut balances = self.balances.lock();
            let balance = balances.entry(currency).or_insert(0);
            *balance = balance.saturating_sub(amount);
            drop(balances);
            self.debits.lock().push((currency, amount));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeInventory {
        capacity: Option<u32>,
        granted: SyncMutex<Vec<Item>>,
        fail_grants: bool,
    }

    impl InventorySink for FakeInventory {
        fn has_capacity(&self, slots: u32) -> bool {
            self.capacity.map_or(true, |cap| slots <= cap)
        }

        async fn grant(&self, items: Vec<Item>) -> GachaResult<()> {
            if self.fail_grants {
                return Err(GachaError::Collaborator("inventory offline".into()));
            }
            self.granted.lock().extend(items);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        states: SyncMutex<HashMap<CurrencyId, PityState>>,
        saves: SyncMutex<Vec<(CurrencyId, PityState)>>,
    }

    impl PityStore for FakeStore {
        fn load_state(&self, currency: CurrencyId) -> PityState {
            self.states.lock().get(&currency).copied().unwrap_or_default()
        }

        async fn save_state(&self, currency: CurrencyId, state: PityState) -> GachaResult<()> {
            self.states.lock().insert(currency, state);
            self.saves.lock().push((currency, state));
            Ok(())
        }
    }

    #[tokio::test]
    async fn ten_draw_batch_settles_and_persists() {
        let coordinator = GachaCoordinator::new(
            &catalog(),
            FakeLedger::with_balance(STANDARD, 10_000),
            FakeInventory::default(),
            FakeStore::default(),
            &SEED,
        )
        .unwrap();

        let outcome = coordinator.execute(STANDARD, 10).await.unwrap();
        assert_eq!(outcome.items.len(), 10);

        // The standard pool carries zero legendary mass, so ten draws land
        // exactly on the threshold and the hard guarantee pays out.
        let bonus = outcome.bonus.unwrap();
        assert_eq!(bonus.item.rarity, Rarity::Legendary);

        assert_eq!(*coordinator.ledger.debits.lock(), vec![(STANDARD, 1000)]);
        assert_eq!(coordinator.inventory.granted.lock().len(), 11);
        assert_eq!(coordinator.store.saves.lock().len(), 1);

        let pity = coordinator.pity_state(STANDARD).await.unwrap();
        assert_eq!(pity.count, 0);
        assert!(!pity.hard_pending);
    }

    #[tokio::test]
    async fn soft_pity_guarantees_a_rare_in_the_batch() {
        let coordinator = GachaCoordinator::new(
            &catalog(),
            FakeLedger::with_balance(STANDARD, 10_000),
            FakeInventory::default(),
            FakeStore::default(),
            &SEED,
        )
        .unwrap();

        let outcome = coordinator.execute(STANDARD, 10).await.unwrap();
        // Whatever the stream produced, the batch cannot be all-common.
        assert!(outcome.items.iter().any(|item| item.rarity >= Rarity::Rare));
    }

    #[tokio::test]
    async fn insufficient_funds_touches_nothing() {
        let coordinator = GachaCoordinator::new(
            &catalog(),
            FakeLedger::with_balance(STANDARD, 500),
            FakeInventory::default(),
            FakeStore::default(),
            &SEED,
        )
        .unwrap();

        let err = coordinator.execute(STANDARD, 10).await.unwrap_err();
        assert_eq!(
            err,
            GachaError::InsufficientFunds {
                currency: STANDARD,
                required: 1000,
            }
        );
        assert!(coordinator.ledger.debits.lock().is_empty());
        assert!(coordinator.inventory.granted.lock().is_empty());
        assert!(coordinator.store.saves.lock().is_empty());
        assert_eq!(
            coordinator.pity_state(STANDARD).await.unwrap(),
            PityState::default()
        );
    }

    #[tokio::test]
    async fn insufficient_capacity_reserves_the_bonus_slot() {
        let coordinator = GachaCoordinator::new(
            &catalog(),
            FakeLedger::with_balance(STANDARD, 10_000),
            FakeInventory {
                capacity: Some(10),
                ..FakeInventory::default()
            },
            FakeStore::default(),
            &SEED,
        )
        .unwrap();

        // Ten drawn items would fit, but the bonus reservation pushes the
        // requirement to eleven.
        let err = coordinator.execute(STANDARD, 10).await.unwrap_err();
        assert_eq!(err, GachaError::InsufficientCapacity { required: 11 });
        assert!(coordinator.ledger.debits.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_currency_is_rejected() {
        let coordinator = GachaCoordinator::new(
            &catalog(),
            FakeLedger::default(),
            FakeInventory::default(),
            FakeStore::default(),
            &SEED,
        )
        .unwrap();

        let err = coordinator.execute(99, 1).await.unwrap_err();
        assert_eq!(err, GachaError::UnknownCurrency(99));
    }

    #[tokio::test]
    async fn zero_draws_are_rejected() {
        let coordinator = GachaCoordinator::new(
            &catalog(),
            FakeLedger::with_balance(STANDARD, 10_000),
            FakeInventory::default(),
            FakeStore::default(),
            &SEED,
        )
        .unwrap();

        let err = coordinator.execute(STANDARD, 0).await.unwrap_err();
        assert!(matches!(err, GachaError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn grant_failure_after_debit_is_partial() {
        let coordinator = GachaCoordinator::new(
            &catalog(),
            FakeLedger::with_balance(STANDARD, 10_000),
            FakeInventory {
                fail_grants: true,
                ..FakeInventory::default()
            },
            FakeStore::default(),
            &SEED,
        )
        .unwrap();

        let err = coordinator.execute(STANDARD, 10).await.unwrap_err();
        match err {
            GachaError::PartialFailure { stage, .. } => assert_eq!(stage, TxnStage::Grant),
            other => panic!("expected partial failure, got {other:?}"),
        }
        // The debit committed: the caller can see money moved without items.
        assert_eq!(*coordinator.ledger.debits.lock(), vec![(STANDARD, 1000)]);
        assert!(coordinator.store.saves.lock().is_empty());
    }

    /// Ledger that parks the debit of one currency until released,
    /// signalling entry through a semaphore.
    struct HoldLedger {
        hold: CurrencyId,
        entered: Semaphore,
        release: Semaphore,
    }

    impl HoldLedger {
        fn new(hold: CurrencyId) -> Self {
            Self {
                hold,
                entered: Semaphore::new(0),
                release: Semaphore::new(0),
            }
        }
    }

    impl Ledger for HoldLedger {
        fn has_balance(&self, _currency: CurrencyId, _amount: u64) -> bool {
            true
        }

        async fn debit(&self, currency: CurrencyId, _amount: u64) -> GachaResult<()> {
            if currency == self.hold {
                self.entered.add_permits(1);
                self.release
                    .acquire()
                    .await
                    .map_err(|e| GachaError::Collaborator(e.to_string()))?
                    .forget();
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn same_currency_contention_is_rejected_while_others_proceed() {
        let coordinator = Arc::new(
            GachaCoordinator::new(
                &catalog(),
                HoldLedger::new(STANDARD),
                FakeInventory::default(),
                FakeStore::default(),
                &SEED,
            )
            .unwrap(),
        );

        let background = Arc::clone(&coordinator);
        let held = tokio::spawn(async move { background.execute(STANDARD, 1).await });

        // Wait until the first transaction is parked inside its debit,
        // holding the standard book.
        coordinator
            .ledger
            .entered
            .acquire()
            .await
            .unwrap()
            .forget();

        let err = coordinator.execute(STANDARD, 1).await.unwrap_err();
        assert_eq!(err, GachaError::TransactionInProgress(STANDARD));

        // A different currency's state is fully partitioned and proceeds.
        let outcome = coordinator.execute(PREMIUM, 1).await.unwrap();
        assert_eq!(outcome.items.len(), 1);

        coordinator.ledger.release.add_permits(1);
        let first = held.await.unwrap().unwrap();
        assert_eq!(first.items.len(), 1);
    }

    #[tokio::test]
    async fn events_are_buffered_and_drained() {
        let coordinator = GachaCoordinator::new(
            &catalog(),
            FakeLedger::with_balance(STANDARD, 10_000),
            FakeInventory::default(),
            FakeStore::default(),
            &SEED,
        )
        .unwrap();

        let outcome = coordinator.execute(STANDARD, 10).await.unwrap();
        let events = coordinator.drain_events();
        assert!(events
            .iter()
            .any(|event| matches!(event, GachaEvent::BatchSettled { currency, .. } if *currency == STANDARD)));
        if outcome.bonus.is_some() {
            assert!(events
                .iter()
                .any(|event| matches!(event, GachaEvent::GuaranteePaid { .. })));
        }
        assert!(coordinator.drain_events().is_empty());
    }

    #[tokio::test]
    async fn simulation_leaves_the_live_stream_untouched() {
        let catalog = catalog();
        let make = || {
            GachaCoordinator::new(
                &catalog,
                FakeLedger::with_balance(PREMIUM, 10_000),
                FakeInventory::default(),
                FakeStore::default(),
                &SEED,
            )
            .unwrap()
        };

        let simulated = make();
        let stats = simulated.simulate(PREMIUM, 1000, &[7u8; 32]).await.unwrap();
        assert_eq!(stats.total_draws, 1000);
        let with_sim = simulated.execute(PREMIUM, 10).await.unwrap();

        let control = make();
        let without_sim = control.execute(PREMIUM, 10).await.unwrap();

        assert_eq!(with_sim.items, without_sim.items);
    }
}
