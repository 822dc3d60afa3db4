use crate::output::print_json;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, deck) = super::open(root)?;
    deck.library().sync_folder()?;
    let count = deck.current_pool_size()?;

    if json {
        print_json(&serde_json::json!({ "count": count }))?;
    } else {
        println!("{count} item(s) available.");
    }
    Ok(())
}
