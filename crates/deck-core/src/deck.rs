//! Selection facade: the next item, the item of the day per requester, and
//! admin reshuffles on top of the order engine.

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::db::DeckDb;
use crate::engine::OrderEngine;
use crate::error::Result;
use crate::library::Library;
use crate::paths;
use crate::pool::Pool;
use crate::state::{OrderState, Pin};
use crate::store::StateStore;
use crate::types::{DayKey, ItemId, RequesterId};

pub struct Deck<P, S> {
    engine: OrderEngine<P, S>,
}

impl Deck<Library, DeckDb> {
    /// Open the deck rooted at `root`: `.deck/deck.db` plus the configured
    /// library folder.
    pub fn open(root: &Path, config: &Config) -> Result<Self> {
        let db = Arc::new(DeckDb::open(&paths::db_path(root))?);
        let library = Arc::new(Library::new(
            db.clone(),
            config.library_dir(root),
            config.library.clone(),
        ));
        let engine = OrderEngine::new(library, db)
            .with_max_conflict_retries(config.engine.max_conflict_retries);
        Ok(Self::new(engine))
    }

    pub fn library(&self) -> &Library {
        self.engine.pool()
    }

    pub fn db(&self) -> &DeckDb {
        self.engine.store()
    }
}

impl<P: Pool, S: StateStore> Deck<P, S> {
    pub fn new(engine: OrderEngine<P, S>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &OrderEngine<P, S> {
        &self.engine
    }

    pub fn next(&self) -> Result<Option<ItemId>> {
        self.engine.next()
    }

    pub fn admin_reshuffle(&self) -> Result<Vec<ItemId>> {
        self.engine.admin_reshuffle()
    }

    pub fn current_pool_size(&self) -> Result<u64> {
        self.engine.current_pool_size()
    }

    pub fn order_state(&self) -> Result<OrderState> {
        self.engine.state()
    }

    pub fn pins(&self) -> Result<Vec<Pin>> {
        self.engine.store().list_pins()
    }

    /// The requester's item for `today`.
    ///
    /// Idempotent within a day as long as the pinned item stays in the pool.
    /// Every call first sweeps pins left over from other days.
    pub fn get_daily_item(
        &self,
        requester: RequesterId,
        today: &DayKey,
    ) -> Result<Option<ItemId>> {
        let store = self.engine.store();
        let swept = store.delete_pins_except(today)?;
        if swept > 0 {
            tracing::info!(swept, day = %today, "cleaned up old daily pins");
        }

        if let Some(pin) = store.load_pin(requester)? {
            if pin.day == *today {
                if self.engine.pool().exists(pin.item)? {
                    return Ok(Some(pin.item));
                }
                tracing::debug!(
                    requester = %requester,
                    item = %pin.item,
                    "pinned item gone, repicking"
                );
                store.delete_pin(requester)?;
            }
        }

        let Some(item) = self.engine.next()? else {
            return Ok(None);
        };
        store.save_pin(&Pin::new(requester, item, today.clone()))?;
        Ok(Some(item))
    }
}
