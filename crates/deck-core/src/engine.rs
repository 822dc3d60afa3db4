//! Order engine: a persisted, no-repeat traversal over a changing pool.
//!
//! The engine keeps one `OrderState` in the store: a permutation of the pool
//! and a cursor naming the last item handed out. Walking the order front to
//! back visits every live item once; falling off the end triggers a full
//! reshuffle. Pool changes between calls are absorbed by reconciliation:
//! stale ids are dropped, new ids join the unvisited tail, and only that tail
//! is reshuffled, so the visited head keeps its history.
//!
//! Every read-modify-write runs under one in-process mutex and is committed
//! with a compare-and-swap on the state version, retried a bounded number of
//! times. Nothing is cached between calls.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{DeckError, Result};
use crate::pool::Pool;
use crate::state::OrderState;
use crate::store::StateStore;
use crate::types::{ItemId, ReshuffleMode};

pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Reconciliation (pure)
// ---------------------------------------------------------------------------

/// Rebuild `state` against the live pool using `mode`.
///
/// Returns the new state and the mode actually applied: a partial reshuffle
/// escalates to a full one when the cursor no longer resolves to a live item.
/// The version is carried over unchanged; the store bumps it on save.
pub fn reshuffle(
    state: &OrderState,
    live: &[ItemId],
    mode: ReshuffleMode,
    rng: &mut StdRng,
) -> (OrderState, ReshuffleMode) {
    if live.is_empty() {
        let next = OrderState {
            order: Vec::new(),
            cursor: None,
            cursor_dispatched: false,
            last_known_pool_size: 0,
            version: state.version,
            reshuffled_at: Some(Utc::now()),
        };
        return (next, mode);
    }

    match mode {
        ReshuffleMode::Full => (full(state, live, rng), ReshuffleMode::Full),
        ReshuffleMode::PartialTail => match partial_tail(state, live, rng) {
            Some(next) => (next, ReshuffleMode::PartialTail),
            None => (full(state, live, rng), ReshuffleMode::Full),
        },
    }
}

fn full(state: &OrderState, live: &[ItemId], rng: &mut StdRng) -> OrderState {
    let mut order = live.to_vec();
    order.shuffle(rng);
    OrderState {
        cursor: order.first().copied(),
        order,
        cursor_dispatched: false,
        last_known_pool_size: live.len() as u64,
        version: state.version,
        reshuffled_at: Some(Utc::now()),
    }
}

/// `None` when the cursor is unset or points at an item that left the pool.
fn partial_tail(state: &OrderState, live: &[ItemId], rng: &mut StdRng) -> Option<OrderState> {
    let live_set: HashSet<ItemId> = live.iter().copied().collect();
    let original_pos = state.cursor_position();

    let mut seen = HashSet::with_capacity(state.order.len());
    let mut kept = Vec::with_capacity(state.order.len());
    let mut dropped_before_cursor = 0usize;
    for (i, &id) in state.order.iter().enumerate() {
        if live_set.contains(&id) && seen.insert(id) {
            kept.push(id);
        } else if original_pos.is_some_and(|p| i < p) {
            dropped_before_cursor += 1;
        }
    }

    let cursor = state.cursor.filter(|c| seen.contains(c))?;
    let pos = kept.iter().position(|&id| id == cursor)?;
    if dropped_before_cursor > 0 {
        tracing::debug!(
            dropped = dropped_before_cursor,
            cursor = %cursor,
            position = pos,
            "stale ids pruned from visited head"
        );
    }

    let mut tail = kept.split_off(pos + 1);
    // Newly appeared ids have not been visited this cycle.
    tail.extend(live.iter().copied().filter(|id| !seen.contains(id)));
    tail.shuffle(rng);
    kept.extend(tail);

    Some(OrderState {
        order: kept,
        cursor: Some(cursor),
        cursor_dispatched: state.cursor_dispatched,
        last_known_pool_size: live.len() as u64,
        version: state.version,
        reshuffled_at: Some(Utc::now()),
    })
}

/// True when the stored order can no longer be trusted for the given pool.
fn needs_reconcile(state: &OrderState, live: &[ItemId]) -> bool {
    if state.last_known_pool_size != live.len() as u64
        || state.order.is_empty()
        || state.cursor_position().is_none()
    {
        return true;
    }
    // Same size but different membership (one item swapped for another).
    let live_set: HashSet<ItemId> = live.iter().copied().collect();
    state.order.iter().any(|id| !live_set.contains(id))
}

// ---------------------------------------------------------------------------
// OrderEngine
// ---------------------------------------------------------------------------

pub struct OrderEngine<P, S> {
    pool: Arc<P>,
    store: Arc<S>,
    max_conflict_retries: u32,
    /// Guards the read-modify-write of the order state; also owns the RNG.
    rng: Mutex<StdRng>,
}

impl<P: Pool, S: StateStore> OrderEngine<P, S> {
    pub fn new(pool: Arc<P>, store: Arc<S>) -> Self {
        Self {
            pool,
            store,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic shuffles, for tests and reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn pool(&self) -> &Arc<P> {
        &self.pool
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn current_pool_size(&self) -> Result<u64> {
        self.pool.size()
    }

    /// Read-only snapshot of the persisted order state.
    pub fn state(&self) -> Result<OrderState> {
        self.store.load_order_state()
    }

    /// Reconcile the stored order with the pool, reshuffle it with `mode` and
    /// persist the result. Returns the new order.
    pub fn reconcile_and_reshuffle(&self, mode: ReshuffleMode) -> Result<Vec<ItemId>> {
        self.transact(|rng| {
            let live = self.pool.all_ids()?;
            let state = self.store.load_order_state()?;
            let (next, applied) = reshuffle(&state, &live, mode, rng);
            log_reshuffle(mode, applied, &next);
            let order = next.order.clone();
            Ok((Some(next), order))
        })
    }

    /// Operator-triggered full reshuffle, regardless of cursor position.
    pub fn admin_reshuffle(&self) -> Result<Vec<ItemId>> {
        self.reconcile_and_reshuffle(ReshuffleMode::Full)
    }

    /// Hand out the next item of the cycle, or `None` if the pool is empty.
    pub fn next(&self) -> Result<Option<ItemId>> {
        self.transact(|rng| {
            let live = self.pool.all_ids()?;
            if live.is_empty() {
                tracing::debug!("pool is empty, nothing to hand out");
                return Ok((None, None));
            }

            let mut state = self.store.load_order_state()?;
            if needs_reconcile(&state, &live) {
                let (next, applied) = reshuffle(&state, &live, ReshuffleMode::PartialTail, rng);
                log_reshuffle(ReshuffleMode::PartialTail, applied, &next);
                state = next;
            }

            let Some(pos) = state.cursor_position() else {
                // Unreachable with a non-empty pool; refuse rather than guess.
                return Err(DeckError::Persistence(
                    "order state has no cursor after reconciliation".into(),
                ));
            };

            let pick = if !state.cursor_dispatched {
                state.order[pos]
            } else if pos + 1 >= state.order.len() {
                let (next, _) = reshuffle(&state, &live, ReshuffleMode::Full, rng);
                tracing::info!(items = next.order.len(), "cycle complete, full reshuffle");
                state = next;
                state.order[0]
            } else {
                state.order[pos + 1]
            };

            state.cursor = Some(pick);
            state.cursor_dispatched = true;
            state.last_known_pool_size = live.len() as u64;
            Ok((Some(state), Some(pick)))
        })
    }

    /// Run `op` under the engine lock and commit the state it returns.
    ///
    /// `op` must re-read everything it needs: on a version conflict it is
    /// invoked again from scratch.
    fn transact<T>(
        &self,
        mut op: impl FnMut(&mut StdRng) -> Result<(Option<OrderState>, T)>,
    ) -> Result<T> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let mut attempt = 0u32;
        loop {
            let (state, out) = op(&mut *rng)?;
            let Some(state) = state else {
                return Ok(out);
            };
            match self.store.save_order_state(&state) {
                Ok(_) => return Ok(out),
                Err(DeckError::Conflict { expected, found })
                    if attempt < self.max_conflict_retries =>
                {
                    attempt += 1;
                    tracing::warn!(expected, found, attempt, "order state conflict, retrying");
                }
                Err(DeckError::Conflict { .. }) => {
                    return Err(DeckError::Persistence(format!(
                        "order state kept changing underneath us after {attempt} retries"
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn log_reshuffle(requested: ReshuffleMode, applied: ReshuffleMode, state: &OrderState) {
    if requested != applied {
        tracing::info!(
            items = state.order.len(),
            "cursor no longer in pool, escalated to full reshuffle"
        );
    } else if applied == ReshuffleMode::Full {
        tracing::info!(items = state.order.len(), "full reshuffle");
    } else {
        tracing::debug!(
            items = state.order.len(),
            remaining = state.remaining(),
            "tail reshuffled"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DeckDb;
    use crate::pool::MemoryPool;
    use crate::state::Pin;
    use crate::types::{DayKey, RequesterId};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tempfile::TempDir;

    fn ids(v: &[u64]) -> Vec<ItemId> {
        v.iter().copied().map(ItemId).collect()
    }

    fn sorted(mut v: Vec<ItemId>) -> Vec<ItemId> {
        v.sort();
        v
    }

    fn setup(pool_ids: &[u64]) -> (TempDir, OrderEngine<MemoryPool, DeckDb>) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(DeckDb::open(&dir.path().join("deck.db")).unwrap());
        let pool = Arc::new(MemoryPool::with_ids(pool_ids.iter().copied()));
        (dir, OrderEngine::new(pool, db).with_seed(7))
    }

    fn draw(engine: &OrderEngine<MemoryPool, DeckDb>, n: usize) -> Vec<ItemId> {
        (0..n).map(|_| engine.next().unwrap().unwrap()).collect()
    }

    fn seed_state(engine: &OrderEngine<MemoryPool, DeckDb>, order: &[u64], cursor: u64) {
        let current = engine.store().load_order_state().unwrap();
        let state = OrderState {
            order: ids(order),
            cursor: Some(ItemId(cursor)),
            cursor_dispatched: true,
            last_known_pool_size: order.len() as u64,
            version: current.version,
            reshuffled_at: None,
        };
        engine.store().save_order_state(&state).unwrap();
    }

    #[test]
    fn one_cycle_visits_every_item_once() {
        let (_dir, engine) = setup(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let cycle = draw(&engine, 10);
        assert_eq!(sorted(cycle), ids(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]));
    }

    #[test]
    fn consecutive_cycles_are_each_permutations() {
        let (_dir, engine) = setup(&[0, 1, 2, 3, 4]);
        for _ in 0..4 {
            assert_eq!(sorted(draw(&engine, 5)), ids(&[0, 1, 2, 3, 4]));
        }
    }

    #[test]
    fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deck.db");
        let pool = Arc::new(MemoryPool::with_ids(0..6));

        let first: Vec<ItemId> = {
            let db = Arc::new(DeckDb::open(&path).unwrap());
            let engine = OrderEngine::new(pool.clone(), db).with_seed(1);
            (0..3).map(|_| engine.next().unwrap().unwrap()).collect()
        };
        let db = Arc::new(DeckDb::open(&path).unwrap());
        let engine = OrderEngine::new(pool, db).with_seed(99);
        let rest: Vec<ItemId> = (0..3).map(|_| engine.next().unwrap().unwrap()).collect();

        let mut all = first;
        all.extend(rest);
        assert_eq!(sorted(all), ids(&[0, 1, 2, 3, 4, 5]));
    }

    #[test]
    fn growth_mid_cycle_visits_new_item_without_repeating_head() {
        let (_dir, engine) = setup(&[0, 1, 2]);
        let a = engine.next().unwrap().unwrap();
        engine.pool().insert(ItemId(3), Vec::new());

        let rest = draw(&engine, 3);
        assert!(!rest.contains(&a), "visited item came back early: {rest:?}");
        let mut expected: Vec<ItemId> =
            ids(&[0, 1, 2, 3]).into_iter().filter(|&x| x != a).collect();
        expected.sort();
        assert_eq!(sorted(rest), expected);
    }

    #[test]
    fn shrink_mid_cycle_never_returns_deleted_items() {
        let (_dir, engine) = setup(&[0, 1, 2, 3]);
        seed_state(&engine, &[0, 1, 2, 3], 1);
        engine.pool().remove(ItemId(0));
        engine.pool().remove(ItemId(3));

        assert_eq!(engine.next().unwrap(), Some(ItemId(2)));
        for _ in 0..10 {
            let pick = engine.next().unwrap().unwrap();
            assert!(pick == ItemId(1) || pick == ItemId(2), "got {pick}");
        }
    }

    #[test]
    fn same_size_swap_prunes_stale_id() {
        let (_dir, engine) = setup(&[0, 1, 2]);
        seed_state(&engine, &[0, 1, 2], 0);
        engine.pool().remove(ItemId(2));
        engine.pool().insert(ItemId(3), Vec::new());

        let picks = draw(&engine, 2);
        assert_eq!(sorted(picks), ids(&[1, 3]));
    }

    #[test]
    fn partial_reshuffle_keeps_visited_head() {
        let (_dir, engine) = setup(&[0, 1, 2, 3, 4, 5]);
        seed_state(&engine, &[0, 1, 2, 3, 4, 5], 2);

        let order = engine
            .reconcile_and_reshuffle(ReshuffleMode::PartialTail)
            .unwrap();
        assert_eq!(&order[..3], &ids(&[0, 1, 2])[..]);
        assert_eq!(sorted(order[3..].to_vec()), ids(&[3, 4, 5]));
        assert_eq!(engine.state().unwrap().cursor, Some(ItemId(2)));
    }

    #[test]
    fn stale_head_entries_shift_cursor_left() {
        let (_dir, engine) = setup(&[0, 1, 2, 3]);
        seed_state(&engine, &[0, 1, 2, 3], 2);
        engine.pool().remove(ItemId(0));
        engine.pool().remove(ItemId(1));

        let order = engine
            .reconcile_and_reshuffle(ReshuffleMode::PartialTail)
            .unwrap();
        assert_eq!(order, ids(&[2, 3]));
        let state = engine.state().unwrap();
        assert_eq!(state.cursor_position(), Some(0));
        assert_eq!(state.last_known_pool_size, 2);
    }

    #[test]
    fn deleted_cursor_escalates_to_full_reshuffle() {
        let (_dir, engine) = setup(&[0, 1, 2]);
        seed_state(&engine, &[0, 1, 2], 1);
        engine.pool().remove(ItemId(1));

        let order = engine
            .reconcile_and_reshuffle(ReshuffleMode::PartialTail)
            .unwrap();
        assert_eq!(sorted(order.clone()), ids(&[0, 2]));
        let state = engine.state().unwrap();
        assert_eq!(state.cursor, Some(order[0]));
        assert!(!state.cursor_dispatched);

        // The fresh cycle starts with the cursor item itself.
        assert_eq!(engine.next().unwrap(), Some(order[0]));
        assert_eq!(engine.next().unwrap(), Some(order[1]));
    }

    #[test]
    fn empty_pool_yields_none_and_writes_nothing() {
        let (_dir, engine) = setup(&[]);
        assert_eq!(engine.next().unwrap(), None);
        assert_eq!(engine.next().unwrap(), None);
        assert_eq!(engine.state().unwrap().version, 0);

        engine.pool().insert(ItemId(5), Vec::new());
        assert_eq!(engine.next().unwrap(), Some(ItemId(5)));
    }

    #[test]
    fn pool_emptied_mid_cycle_then_refilled() {
        let (_dir, engine) = setup(&[0, 1]);
        engine.next().unwrap();
        engine.pool().remove(ItemId(0));
        engine.pool().remove(ItemId(1));
        assert_eq!(engine.next().unwrap(), None);

        let order = engine
            .reconcile_and_reshuffle(ReshuffleMode::PartialTail)
            .unwrap();
        assert!(order.is_empty());
        assert_eq!(engine.state().unwrap().cursor, None);

        engine.pool().insert(ItemId(2), Vec::new());
        assert_eq!(engine.next().unwrap(), Some(ItemId(2)));
    }

    #[test]
    fn single_item_is_always_returned() {
        let (_dir, engine) = setup(&[9]);
        for _ in 0..4 {
            assert_eq!(engine.next().unwrap(), Some(ItemId(9)));
        }
        assert_eq!(engine.admin_reshuffle().unwrap(), ids(&[9]));
        assert_eq!(engine.next().unwrap(), Some(ItemId(9)));
    }

    #[test]
    fn admin_reshuffle_mid_cycle_starts_a_full_fresh_cycle() {
        let (_dir, engine) = setup(&[0, 1, 2, 3]);
        draw(&engine, 2);
        let order = engine.admin_reshuffle().unwrap();
        assert_eq!(sorted(order.clone()), ids(&[0, 1, 2, 3]));
        assert_eq!(draw(&engine, 4), order);
    }

    // -- concurrency ----------------------------------------------------------

    /// Simulates another writer committing right before our first save.
    struct RacingStore {
        inner: DeckDb,
        raced: AtomicBool,
    }

    impl StateStore for RacingStore {
        fn load_order_state(&self) -> Result<OrderState> {
            self.inner.load_order_state()
        }
        fn save_order_state(&self, state: &OrderState) -> Result<OrderState> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                let theirs = self.inner.load_order_state()?;
                self.inner.save_order_state(&theirs)?;
            }
            self.inner.save_order_state(state)
        }
        fn load_pin(&self, requester: RequesterId) -> Result<Option<Pin>> {
            self.inner.load_pin(requester)
        }
        fn save_pin(&self, pin: &Pin) -> Result<()> {
            self.inner.save_pin(pin)
        }
        fn delete_pin(&self, requester: RequesterId) -> Result<bool> {
            self.inner.delete_pin(requester)
        }
        fn delete_pins_except(&self, today: &DayKey) -> Result<usize> {
            self.inner.delete_pins_except(today)
        }
        fn list_pins(&self) -> Result<Vec<Pin>> {
            self.inner.list_pins()
        }
    }

    /// Every save loses the race.
    struct AlwaysConflict {
        saves: AtomicU32,
    }

    impl StateStore for AlwaysConflict {
        fn load_order_state(&self) -> Result<OrderState> {
            Ok(OrderState::empty())
        }
        fn save_order_state(&self, state: &OrderState) -> Result<OrderState> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Err(DeckError::Conflict {
                expected: state.version,
                found: state.version + 1,
            })
        }
        fn load_pin(&self, _: RequesterId) -> Result<Option<Pin>> {
            Ok(None)
        }
        fn save_pin(&self, _: &Pin) -> Result<()> {
            Ok(())
        }
        fn delete_pin(&self, _: RequesterId) -> Result<bool> {
            Ok(false)
        }
        fn delete_pins_except(&self, _: &DayKey) -> Result<usize> {
            Ok(0)
        }
        fn list_pins(&self) -> Result<Vec<Pin>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn conflict_is_retried_against_fresh_state() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RacingStore {
            inner: DeckDb::open(&dir.path().join("deck.db")).unwrap(),
            raced: AtomicBool::new(false),
        });
        let pool = Arc::new(MemoryPool::with_ids(0..3));
        let engine = OrderEngine::new(pool, store.clone()).with_seed(3);

        let pick = engine.next().unwrap().unwrap();
        let state = store.load_order_state().unwrap();
        assert_eq!(state.cursor, Some(pick));
        assert_eq!(state.version, 2);
    }

    #[test]
    fn persistent_conflict_surfaces_as_persistence_failure() {
        let store = Arc::new(AlwaysConflict {
            saves: AtomicU32::new(0),
        });
        let pool = Arc::new(MemoryPool::with_ids(0..3));
        let engine = OrderEngine::new(pool, store.clone()).with_max_conflict_retries(2);

        let err = engine.next().unwrap_err();
        assert!(matches!(err, DeckError::Persistence(_)), "got {err:?}");
        assert_eq!(store.saves.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn concurrent_callers_never_share_an_item_within_a_cycle() {
        let (_dir, engine) = setup(&(0..40).collect::<Vec<u64>>());
        let engine = Arc::new(engine);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .map(|_| engine.next().unwrap().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<ItemId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        assert_eq!(all, (0..40).map(ItemId).collect::<Vec<_>>());
    }
}
