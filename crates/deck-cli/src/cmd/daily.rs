use super::ItemView;
use crate::output::print_json;
use anyhow::Context;
use deck_core::types::{DayKey, RequesterId};
use std::path::Path;

pub fn run(root: &Path, requester: i64, date: Option<&str>, json: bool) -> anyhow::Result<()> {
    let today = match date {
        Some(d) => DayKey::parse(d)?,
        None => DayKey::today(),
    };
    let (_, deck) = super::open(root)?;
    deck.library().sync_folder()?;
    let picked = deck
        .get_daily_item(RequesterId(requester), &today)
        .with_context(|| format!("failed to pick the item of the day for {requester}"))?;

    let view = match picked {
        Some(id) => Some(ItemView::lookup(&deck, id)?),
        None => None,
    };

    if json {
        print_json(&serde_json::json!({
            "requester": requester,
            "day": today,
            "item": view,
        }))?;
    } else {
        match view {
            Some(v) => println!("{today} {requester}: [{}] {}", v.id, v.path),
            None => println!("No items available."),
        }
    }
    Ok(())
}
