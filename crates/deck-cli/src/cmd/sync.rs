use crate::output::print_json;
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, deck) = super::open(root)?;
    let report = deck
        .library()
        .sync_folder()
        .context("failed to sync library folder")?;

    if json {
        print_json(&report)?;
    } else {
        println!(
            "Scanned {} file(s), registered {} new item(s).",
            report.scanned, report.added
        );
    }
    Ok(())
}
