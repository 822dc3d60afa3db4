use super::ItemView;
use crate::output::print_json;
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, deck) = super::open(root)?;
    deck.library().sync_folder()?;
    let picked = deck.next().context("failed to pick the next item")?;

    let view = match picked {
        Some(id) => Some(ItemView::lookup(&deck, id)?),
        None => None,
    };

    if json {
        print_json(&serde_json::json!({ "item": view }))?;
    } else {
        match view {
            Some(v) => println!("[{}] {}", v.id, v.path),
            None => println!("No items available."),
        }
    }
    Ok(())
}
