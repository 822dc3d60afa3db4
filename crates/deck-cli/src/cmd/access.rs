use crate::output::print_json;
use deck_core::access::AccessList;
use std::path::Path;

pub fn run(root: &Path, user: &str, allow: bool, json: bool) -> anyhow::Result<()> {
    let (config, deck) = super::open(root)?;
    AccessList::from_config(&config).set_allow_user_add(deck.db(), user, allow)?;

    if json {
        print_json(&serde_json::json!({ "allow_user_add": allow }))?;
    } else if allow {
        println!("Everyone may add items.");
    } else {
        println!("Only admins may add items.");
    }
    Ok(())
}
