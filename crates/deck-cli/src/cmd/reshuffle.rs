use crate::output::print_json;
use anyhow::Context;
use deck_core::access::AccessList;
use std::path::Path;

pub fn run(root: &Path, user: &str, json: bool) -> anyhow::Result<()> {
    let (config, deck) = super::open(root)?;
    AccessList::from_config(&config).require_admin(user)?;
    deck.library().sync_folder()?;
    let order = deck.admin_reshuffle().context("failed to reshuffle")?;

    if json {
        print_json(&serde_json::json!({ "order": order }))?;
    } else {
        println!("Reshuffled {} item(s).", order.len());
    }
    Ok(())
}
