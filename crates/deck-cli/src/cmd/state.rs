use crate::output::{print_json, print_table};
use anyhow::Context;
use deck_core::access::AccessList;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (config, deck) = super::open(root)?;
    let state = deck.order_state().context("failed to load order state")?;
    let pins = deck.pins()?;
    let pool_size = deck.current_pool_size()?;
    let allow_user_add = AccessList::from_config(&config).allow_user_add(deck.db())?;

    if json {
        print_json(&serde_json::json!({
            "pool_size": pool_size,
            "order": &state.order,
            "cursor": state.cursor,
            "cursor_dispatched": state.cursor_dispatched,
            "remaining": state.remaining(),
            "last_known_pool_size": state.last_known_pool_size,
            "version": state.version,
            "reshuffled_at": state.reshuffled_at,
            "allow_user_add": allow_user_add,
            "pins": &pins,
        }))?;
        return Ok(());
    }

    println!("Pool:      {pool_size} item(s)");
    match state.cursor {
        Some(c) => println!(
            "Cursor:    {c} ({} of {}, {} remaining this cycle)",
            state.cursor_position().map(|p| p + 1).unwrap_or(0),
            state.order.len(),
            state.remaining()
        ),
        None => println!("Cursor:    (none)"),
    }
    let order: Vec<String> = state.order.iter().map(|id| id.to_string()).collect();
    println!("Order:     [{}]", order.join(", "));
    if let Some(at) = state.reshuffled_at {
        println!("Reshuffled: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!(
        "Additions: {}",
        if allow_user_add { "open" } else { "admins only" }
    );

    if !pins.is_empty() {
        println!("\nDaily pins:");
        let rows = pins
            .iter()
            .map(|p| vec![p.requester.to_string(), p.item.to_string(), p.day.to_string()])
            .collect();
        print_table(&["REQUESTER", "ITEM", "DAY"], rows);
    }
    Ok(())
}
