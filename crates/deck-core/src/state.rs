use crate::types::{DayKey, ItemId, RequesterId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OrderState
// ---------------------------------------------------------------------------

/// The singleton traversal state persisted by the order engine.
///
/// `cursor` is `None` only when `order` is empty; otherwise it names an id
/// inside `order`. Its position is always derived by lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderState {
    #[serde(default)]
    pub order: Vec<ItemId>,
    #[serde(default)]
    pub cursor: Option<ItemId>,
    /// False right after a full reshuffle: the cursor names the first item of
    /// the fresh order and it has not been handed out yet.
    #[serde(default)]
    pub cursor_dispatched: bool,
    #[serde(default)]
    pub last_known_pool_size: u64,
    /// Optimistic concurrency token. Bumped by the store on every save.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub reshuffled_at: Option<DateTime<Utc>>,
}

impl Default for OrderState {
    fn default() -> Self {
        Self::empty()
    }
}

impl OrderState {
    pub fn empty() -> Self {
        Self {
            order: Vec::new(),
            cursor: None,
            cursor_dispatched: false,
            last_known_pool_size: 0,
            version: 0,
            reshuffled_at: None,
        }
    }

    pub fn position_of(&self, id: ItemId) -> Option<usize> {
        self.order.iter().position(|&x| x == id)
    }

    pub fn cursor_position(&self) -> Option<usize> {
        self.cursor.and_then(|c| self.position_of(c))
    }

    /// Items after the cursor, i.e. the ones still to be visited this cycle.
    pub fn remaining(&self) -> usize {
        match self.cursor_position() {
            Some(pos) if self.cursor_dispatched => self.order.len() - pos - 1,
            Some(pos) => self.order.len() - pos,
            None => self.order.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pin
// ---------------------------------------------------------------------------

/// A requester's item of the day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub requester: RequesterId,
    pub item: ItemId,
    pub day: DayKey,
}

impl Pin {
    pub fn new(requester: RequesterId, item: ItemId, day: DayKey) -> Self {
        Self {
            requester,
            item,
            day,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
