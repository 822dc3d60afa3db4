pub mod access;
pub mod count;
pub mod daily;
pub mod init;
pub mod item;
pub mod next;
pub mod reshuffle;
pub mod state;
pub mod sync;

use anyhow::Context;
use deck_core::{
    config::Config, db::DeckDb, library::Library, types::ItemId, Deck,
};
use serde::Serialize;
use std::path::Path;

pub type LibraryDeck = Deck<Library, DeckDb>;

/// Load the config and open the deck at `root`.
pub fn open(root: &Path) -> anyhow::Result<(Config, LibraryDeck)> {
    let config = Config::load(root).context("failed to load config")?;
    let deck = Deck::open(root, &config).context("failed to open deck database")?;
    Ok((config, deck))
}

/// An item as shown to the operator.
#[derive(Serialize)]
pub struct ItemView {
    pub id: ItemId,
    pub file: String,
    pub path: String,
}

impl ItemView {
    pub fn lookup(deck: &LibraryDeck, id: ItemId) -> anyhow::Result<Self> {
        let record = deck.library().require(id)?;
        Ok(Self {
            id,
            path: deck.library().path_of(&record).display().to_string(),
            file: record.file,
        })
    }
}
