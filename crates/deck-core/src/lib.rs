pub mod access;
pub mod config;
pub mod db;
pub mod deck;
pub mod engine;
pub mod error;
pub mod io;
pub mod library;
pub mod paths;
pub mod pool;
pub mod state;
pub mod store;
pub mod types;

pub use deck::Deck;
pub use error::{DeckError, Result};
