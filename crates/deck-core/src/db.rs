//! Persistent storage for the deck using redb.
//!
//! # Table design
//!
//! ```text
//! items        u64 item id        -> JSON ItemRecord
//! order_state  "order" (single)   -> JSON OrderState
//! pins         i64 requester id   -> JSON Pin
//! settings     setting name       -> JSON value
//! ```
//!
//! Item ids are `u64` keys, so a table scan yields them in ascending order.
//! The next id to hand out is kept in `settings` under `next_item_id` so ids
//! stay unique even after the newest item is removed. Every mutation runs inside
//! one redb write transaction; redb serializes writers, which is what makes
//! the order-state compare-and-swap atomic.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{DeckError, Result};
use crate::library::ItemRecord;
use crate::state::{OrderState, Pin};
use crate::store::StateStore;
use crate::types::{DayKey, ItemId, RequesterId};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const ITEMS: TableDefinition<u64, &[u8]> = TableDefinition::new("items");
const ORDER_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("order_state");
const PINS: TableDefinition<i64, &[u8]> = TableDefinition::new("pins");
const SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");

const ORDER_KEY: &str = "order";

const NEXT_ITEM_ID: &str = "next_item_id";

pub const ALLOW_USER_ADD: &str = "allow_user_add";

// ---------------------------------------------------------------------------
// DeckDb
// ---------------------------------------------------------------------------

/// The deck's single database file: item registry, order state, pins, settings.
pub struct DeckDb {
    db: Database,
}

impl DeckDb {
    /// Open or create the redb database at `path`.
    ///
    /// Creates every table if it doesn't already exist so reads never fail
    /// on a fresh file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(DeckError::db)?;
        let wt = db.begin_write().map_err(DeckError::db)?;
        wt.open_table(ITEMS).map_err(DeckError::db)?;
        wt.open_table(ORDER_STATE).map_err(DeckError::db)?;
        wt.open_table(PINS).map_err(DeckError::db)?;
        wt.open_table(SETTINGS).map_err(DeckError::db)?;
        wt.commit().map_err(DeckError::db)?;
        Ok(Self { db })
    }

    // -- item registry -------------------------------------------------------

    /// Register `file` under a fresh id. If a record for the same file name
    /// exists, it is returned unchanged.
    ///
    /// Ids are never handed out twice: the counter in `settings` only moves
    /// forward, and databases written before it existed fall back to the
    /// highest live id.
    pub fn insert_item(&self, file: &str, added_at: DateTime<Utc>) -> Result<ItemRecord> {
        let wt = self.db.begin_write().map_err(DeckError::db)?;
        let record = {
            let mut table = wt.open_table(ITEMS).map_err(DeckError::db)?;
            let mut settings = wt.open_table(SETTINGS).map_err(DeckError::db)?;
            let mut existing = None;
            for entry in table.iter().map_err(DeckError::db)? {
                let (_, v) = entry.map_err(DeckError::db)?;
                let record: ItemRecord = serde_json::from_slice(v.value())?;
                if record.file == file {
                    existing = Some(record);
                    break;
                }
            }
            match existing {
                Some(record) => record,
                None => {
                    let after_last = match table.last().map_err(DeckError::db)? {
                        Some((k, _)) => k.value() + 1,
                        None => 0,
                    };
                    let high_water = match settings.get(NEXT_ITEM_ID).map_err(DeckError::db)? {
                        Some(v) => serde_json::from_slice::<u64>(v.value())?,
                        None => 0,
                    };
                    let next_id = high_water.max(after_last);
                    let counter = serde_json::to_vec(&(next_id + 1))?;
                    settings
                        .insert(NEXT_ITEM_ID, counter.as_slice())
                        .map_err(DeckError::db)?;
                    let record = ItemRecord {
                        id: ItemId(next_id),
                        file: file.to_string(),
                        added_at,
                    };
                    let value = serde_json::to_vec(&record)?;
                    table
                        .insert(next_id, value.as_slice())
                        .map_err(DeckError::db)?;
                    record
                }
            }
        };
        wt.commit().map_err(DeckError::db)?;
        Ok(record)
    }

    pub fn remove_item(&self, id: ItemId) -> Result<Option<ItemRecord>> {
        let wt = self.db.begin_write().map_err(DeckError::db)?;
        let removed = {
            let mut table = wt.open_table(ITEMS).map_err(DeckError::db)?;
            let guard = table.remove(id.get()).map_err(DeckError::db)?;
            let record = match guard {
                Some(v) => Some(serde_json::from_slice::<ItemRecord>(v.value())?),
                None => None,
            };
            record
        };
        wt.commit().map_err(DeckError::db)?;
        Ok(removed)
    }

    pub fn get_item(&self, id: ItemId) -> Result<Option<ItemRecord>> {
        let rt = self.db.begin_read().map_err(DeckError::db)?;
        let table = rt.open_table(ITEMS).map_err(DeckError::db)?;
        let Some(v) = table.get(id.get()).map_err(DeckError::db)? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(v.value())?;
        Ok(Some(record))
    }

    /// All item records, ascending by id.
    pub fn list_items(&self) -> Result<Vec<ItemRecord>> {
        let rt = self.db.begin_read().map_err(DeckError::db)?;
        let table = rt.open_table(ITEMS).map_err(DeckError::db)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(DeckError::db)? {
            let (_, v) = entry.map_err(DeckError::db)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    pub fn item_ids(&self) -> Result<Vec<ItemId>> {
        let rt = self.db.begin_read().map_err(DeckError::db)?;
        let table = rt.open_table(ITEMS).map_err(DeckError::db)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(DeckError::db)? {
            let (k, _) = entry.map_err(DeckError::db)?;
            result.push(ItemId(k.value()));
        }
        Ok(result)
    }

    pub fn count_items(&self) -> Result<u64> {
        let rt = self.db.begin_read().map_err(DeckError::db)?;
        let table = rt.open_table(ITEMS).map_err(DeckError::db)?;
        table.len().map_err(DeckError::db)
    }

    // -- settings ------------------------------------------------------------

    pub fn get_setting<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let rt = self.db.begin_read().map_err(DeckError::db)?;
        let table = rt.open_table(SETTINGS).map_err(DeckError::db)?;
        let Some(v) = table.get(name).map_err(DeckError::db)? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(v.value())?;
        Ok(Some(value))
    }

    pub fn set_setting<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        let wt = self.db.begin_write().map_err(DeckError::db)?;
        {
            let mut table = wt.open_table(SETTINGS).map_err(DeckError::db)?;
            table
                .insert(name, bytes.as_slice())
                .map_err(DeckError::db)?;
        }
        wt.commit().map_err(DeckError::db)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

impl StateStore for DeckDb {
    fn load_order_state(&self) -> Result<OrderState> {
        let rt = self.db.begin_read().map_err(DeckError::db)?;
        let table = rt.open_table(ORDER_STATE).map_err(DeckError::db)?;
        let Some(v) = table.get(ORDER_KEY).map_err(DeckError::db)? else {
            return Ok(OrderState::empty());
        };
        let state = serde_json::from_slice(v.value())?;
        Ok(state)
    }

    fn save_order_state(&self, state: &OrderState) -> Result<OrderState> {
        let wt = self.db.begin_write().map_err(DeckError::db)?;
        let stored = {
            let mut table = wt.open_table(ORDER_STATE).map_err(DeckError::db)?;
            let current = match table.get(ORDER_KEY).map_err(DeckError::db)? {
                Some(v) => serde_json::from_slice::<OrderState>(v.value())?.version,
                None => 0,
            };
            if current != state.version {
                // Dropping `wt` without commit aborts the transaction.
                return Err(DeckError::Conflict {
                    expected: state.version,
                    found: current,
                });
            }
            let mut next = state.clone();
            next.version = current + 1;
            let value = serde_json::to_vec(&next)?;
            table
                .insert(ORDER_KEY, value.as_slice())
                .map_err(DeckError::db)?;
            next
        };
        wt.commit().map_err(DeckError::db)?;
        Ok(stored)
    }

    fn load_pin(&self, requester: RequesterId) -> Result<Option<Pin>> {
        let rt = self.db.begin_read().map_err(DeckError::db)?;
        let table = rt.open_table(PINS).map_err(DeckError::db)?;
        let Some(v) = table.get(requester.0).map_err(DeckError::db)? else {
            return Ok(None);
        };
        let pin = serde_json::from_slice(v.value())?;
        Ok(Some(pin))
    }

    fn save_pin(&self, pin: &Pin) -> Result<()> {
        let value = serde_json::to_vec(pin)?;
        let wt = self.db.begin_write().map_err(DeckError::db)?;
        {
            let mut table = wt.open_table(PINS).map_err(DeckError::db)?;
            table
                .insert(pin.requester.0, value.as_slice())
                .map_err(DeckError::db)?;
        }
        wt.commit().map_err(DeckError::db)?;
        Ok(())
    }

    fn delete_pin(&self, requester: RequesterId) -> Result<bool> {
        let wt = self.db.begin_write().map_err(DeckError::db)?;
        let removed = {
            let mut table = wt.open_table(PINS).map_err(DeckError::db)?;
            let removed = table.remove(requester.0).map_err(DeckError::db)?.is_some();
            removed
        };
        wt.commit().map_err(DeckError::db)?;
        Ok(removed)
    }

    fn delete_pins_except(&self, today: &DayKey) -> Result<usize> {
        let wt = self.db.begin_write().map_err(DeckError::db)?;
        let count = {
            let mut table = wt.open_table(PINS).map_err(DeckError::db)?;
            let mut stale = Vec::new();
            for entry in table.iter().map_err(DeckError::db)? {
                let (k, v) = entry.map_err(DeckError::db)?;
                let pin: Pin = serde_json::from_slice(v.value())?;
                if pin.day != *today {
                    stale.push(k.value());
                }
            }
            for key in &stale {
                table.remove(*key).map_err(DeckError::db)?;
            }
            stale.len()
        };
        wt.commit().map_err(DeckError::db)?;
        Ok(count)
    }

    fn list_pins(&self) -> Result<Vec<Pin>> {
        let rt = self.db.begin_read().map_err(DeckError::db)?;
        let table = rt.open_table(PINS).map_err(DeckError::db)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(DeckError::db)? {
            let (_, v) = entry.map_err(DeckError::db)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, DeckDb) {
        let dir = TempDir::new().unwrap();
        let db = DeckDb::open(&dir.path().join("deck.db")).unwrap();
        (dir, db)
    }

    fn day(s: &str) -> DayKey {
        DayKey::parse(s).unwrap()
    }

    #[test]
    fn item_ids_are_assigned_in_order_from_zero() {
        let (_dir, db) = open_tmp();
        let a = db.insert_item("a.png", Utc::now()).unwrap();
        let b = db.insert_item("b.png", Utc::now()).unwrap();
        assert_eq!(a.id, ItemId(0));
        assert_eq!(b.id, ItemId(1));
        assert_eq!(db.item_ids().unwrap(), vec![ItemId(0), ItemId(1)]);
        assert_eq!(db.count_items().unwrap(), 2);
    }

    #[test]
    fn insert_item_is_idempotent_per_file() {
        let (_dir, db) = open_tmp();
        let first = db.insert_item("cat.jpg", Utc::now()).unwrap();
        let again = db.insert_item("cat.jpg", Utc::now()).unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(db.count_items().unwrap(), 1);
    }

    #[test]
    fn ids_are_never_reused_after_removing_a_middle_item() {
        let (_dir, db) = open_tmp();
        db.insert_item("a.png", Utc::now()).unwrap();
        db.insert_item("b.png", Utc::now()).unwrap();
        let removed = db.remove_item(ItemId(0)).unwrap();
        assert_eq!(removed.map(|r| r.file).as_deref(), Some("a.png"));
        let c = db.insert_item("c.png", Utc::now()).unwrap();
        assert_eq!(c.id, ItemId(2));
        assert!(db.get_item(ItemId(0)).unwrap().is_none());
    }

    #[test]
    fn ids_are_never_reused_after_removing_the_newest_item() {
        let (_dir, db) = open_tmp();
        db.insert_item("a.png", Utc::now()).unwrap();
        let b = db.insert_item("b.png", Utc::now()).unwrap();
        db.remove_item(b.id).unwrap();

        let c = db.insert_item("c.png", Utc::now()).unwrap();
        assert_eq!(c.id, ItemId(2));
        assert!(db.get_item(b.id).unwrap().is_none());

        db.remove_item(ItemId(0)).unwrap();
        db.remove_item(c.id).unwrap();
        let d = db.insert_item("d.png", Utc::now()).unwrap();
        assert_eq!(d.id, ItemId(3));
    }

    #[test]
    fn id_counter_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deck.db");
        {
            let db = DeckDb::open(&path).unwrap();
            let a = db.insert_item("a.png", Utc::now()).unwrap();
            db.remove_item(a.id).unwrap();
        }
        let db = DeckDb::open(&path).unwrap();
        assert_eq!(db.insert_item("b.png", Utc::now()).unwrap().id, ItemId(1));
    }

    #[test]
    fn fresh_order_state_is_empty() {
        let (_dir, db) = open_tmp();
        let state = db.load_order_state().unwrap();
        assert_eq!(state, OrderState::empty());
    }

    #[test]
    fn save_order_state_bumps_version_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deck.db");
        {
            let db = DeckDb::open(&path).unwrap();
            let mut state = db.load_order_state().unwrap();
            state.order = vec![ItemId(1), ItemId(0)];
            state.cursor = Some(ItemId(1));
            let stored = db.save_order_state(&state).unwrap();
            assert_eq!(stored.version, 1);
        }
        let db = DeckDb::open(&path).unwrap();
        let loaded = db.load_order_state().unwrap();
        assert_eq!(loaded.order, vec![ItemId(1), ItemId(0)]);
        assert_eq!(loaded.cursor, Some(ItemId(1)));
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn stale_version_is_rejected() {
        let (_dir, db) = open_tmp();
        let snapshot = db.load_order_state().unwrap();
        db.save_order_state(&snapshot).unwrap();

        let err = db.save_order_state(&snapshot).unwrap_err();
        match err {
            DeckError::Conflict { expected, found } => {
                assert_eq!(expected, 0);
                assert_eq!(found, 1);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
        assert_eq!(db.load_order_state().unwrap().version, 1);
    }

    #[test]
    fn pins_overwrite_and_sweep() {
        let (_dir, db) = open_tmp();
        db.save_pin(&Pin::new(RequesterId(1), ItemId(4), day("2024-01-01")))
            .unwrap();
        db.save_pin(&Pin::new(RequesterId(2), ItemId(5), day("2024-01-02")))
            .unwrap();
        db.save_pin(&Pin::new(RequesterId(1), ItemId(6), day("2024-01-01")))
            .unwrap();
        assert_eq!(db.load_pin(RequesterId(1)).unwrap().unwrap().item, ItemId(6));

        let swept = db.delete_pins_except(&day("2024-01-02")).unwrap();
        assert_eq!(swept, 1);
        assert!(db.load_pin(RequesterId(1)).unwrap().is_none());
        assert_eq!(db.list_pins().unwrap().len(), 1);

        assert!(db.delete_pin(RequesterId(2)).unwrap());
        assert!(!db.delete_pin(RequesterId(2)).unwrap());
    }

    #[test]
    fn settings_roundtrip() {
        let (_dir, db) = open_tmp();
        assert_eq!(db.get_setting::<bool>(ALLOW_USER_ADD).unwrap(), None);
        db.set_setting(ALLOW_USER_ADD, &false).unwrap();
        assert_eq!(db.get_setting::<bool>(ALLOW_USER_ADD).unwrap(), Some(false));
    }
}
