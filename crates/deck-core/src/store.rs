//! Persistence contract for the order state and per-requester pins.

use crate::error::Result;
use crate::state::{OrderState, Pin};
use crate::types::{DayKey, RequesterId};

pub trait StateStore: Send + Sync {
    /// Load the singleton order state, creating the empty default on first use.
    fn load_order_state(&self) -> Result<OrderState>;

    /// Compare-and-swap write of the order state.
    ///
    /// Succeeds only if the persisted version still equals `state.version`;
    /// otherwise returns `DeckError::Conflict`. Returns the state as stored,
    /// with its version bumped.
    fn save_order_state(&self, state: &OrderState) -> Result<OrderState>;

    fn load_pin(&self, requester: RequesterId) -> Result<Option<Pin>>;

    /// Insert or overwrite the requester's pin.
    fn save_pin(&self, pin: &Pin) -> Result<()>;

    /// Returns true if a pin was removed.
    fn delete_pin(&self, requester: RequesterId) -> Result<bool>;

    /// Delete every pin whose day is not `today`. Returns the number removed.
    fn delete_pins_except(&self, today: &DayKey) -> Result<usize>;

    fn list_pins(&self) -> Result<Vec<Pin>>;
}
