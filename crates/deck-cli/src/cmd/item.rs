use super::ItemView;
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use deck_core::{access::AccessList, paths, types::ItemId};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum ItemSubcommand {
    /// Copy a file into the library and register it
    Add {
        file: PathBuf,
        /// Acting user name (used for the stored file name and the lock check)
        #[arg(long = "as", default_value = "local")]
        user: String,
    },
    /// Delete an item and its file (admin)
    Rm {
        id: u64,
        #[arg(long = "as")]
        user: String,
    },
    /// List all items
    List,
    /// Show one item
    Show { id: u64 },
}

pub fn run(root: &Path, subcmd: ItemSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ItemSubcommand::Add { file, user } => add(root, &file, &user, json),
        ItemSubcommand::Rm { id, user } => rm(root, ItemId(id), &user, json),
        ItemSubcommand::List => list(root, json),
        ItemSubcommand::Show { id } => show(root, ItemId(id), json),
    }
}

fn add(root: &Path, file: &Path, user: &str, json: bool) -> anyhow::Result<()> {
    let (config, deck) = super::open(root)?;
    let access = AccessList::from_config(&config);
    access.require_can_add(user, access.allow_user_add(deck.db())?)?;

    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("not a file: {}", file.display()))?;
    let ext = paths::extension_of(name)
        .with_context(|| format!("'{name}' has no extension"))?;
    let bytes =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let record = deck.library().ingest(&bytes, &ext, user)?;
    let view = ItemView::lookup(&deck, record.id)?;

    if json {
        print_json(&view)?;
    } else {
        println!("Added item [{}]: {}", view.id, view.file);
    }
    Ok(())
}

fn rm(root: &Path, id: ItemId, user: &str, json: bool) -> anyhow::Result<()> {
    let (config, deck) = super::open(root)?;
    AccessList::from_config(&config).require_admin(user)?;
    let record = deck
        .library()
        .remove(id)
        .with_context(|| format!("failed to remove item {id}"))?;

    if json {
        print_json(&serde_json::json!({ "id": id, "file": record.file, "removed": true }))?;
    } else {
        println!("Removed item [{id}]: {}", record.file);
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, deck) = super::open(root)?;
    let items = deck.library().list()?;

    if json {
        print_json(&items)?;
        return Ok(());
    }
    if items.is_empty() {
        println!("No items. Drop files into the library folder and run: deck sync");
        return Ok(());
    }
    let rows = items
        .iter()
        .map(|r| {
            vec![
                r.id.to_string(),
                r.file.clone(),
                r.added_at.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "FILE", "ADDED"], rows);
    Ok(())
}

fn show(root: &Path, id: ItemId, json: bool) -> anyhow::Result<()> {
    let (_, deck) = super::open(root)?;
    let view = ItemView::lookup(&deck, id)?;

    if json {
        print_json(&view)?;
    } else {
        println!("[{}] {}", view.id, view.file);
        println!("path: {}", view.path);
    }
    Ok(())
}
