//! Read-side contract over the live item pool.
//!
//! The order engine never owns items. It observes the pool through this trait,
//! and the pool may change between any two calls.

use crate::error::Result;
use crate::types::ItemId;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

pub trait Pool: Send + Sync {
    fn size(&self) -> Result<u64>;

    /// All live ids, ascending, no duplicates.
    fn all_ids(&self) -> Result<Vec<ItemId>>;

    fn exists(&self, id: ItemId) -> Result<bool>;

    /// Payload bytes, or `None` when the item (or its content) is gone.
    fn get_payload(&self, id: ItemId) -> Result<Option<Vec<u8>>>;
}

// ---------------------------------------------------------------------------
// MemoryPool
// ---------------------------------------------------------------------------

/// In-process pool. Handy for embedding the engine without a library folder
/// and for driving pool mutations from tests.
#[derive(Debug, Default)]
pub struct MemoryPool {
    items: Mutex<BTreeMap<ItemId, Vec<u8>>>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        let pool = Self::new();
        for id in ids {
            pool.insert(ItemId(id), Vec::new());
        }
        pool
    }

    pub fn insert(&self, id: ItemId, payload: Vec<u8>) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, payload);
    }

    pub fn remove(&self, id: ItemId) -> bool {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }
}

impl Pool for MemoryPool {
    fn size(&self) -> Result<u64> {
        Ok(self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64)
    }

    fn all_ids(&self) -> Result<Vec<ItemId>> {
        Ok(self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect())
    }

    fn exists(&self, id: ItemId) -> Result<bool> {
        Ok(self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id))
    }

    fn get_payload(&self, id: ItemId) -> Result<Option<Vec<u8>>> {
        Ok(self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}
