use anyhow::Context;
use deck_core::{config::Config, db::DeckDb, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing deck in: {}", root.display());

    io::ensure_dir(&paths::deck_dir(root))
        .with_context(|| format!("failed to create {}", paths::DECK_DIR))?;

    let config = if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root).context("failed to load config")?
    } else {
        let cfg = Config::default();
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg
    };

    let library = config.library_dir(root);
    if library.is_dir() {
        println!("  exists:  {}", library.display());
    } else {
        io::ensure_dir(&library)
            .with_context(|| format!("failed to create {}", library.display()))?;
        println!("  created: {}", library.display());
    }

    let db_path = paths::db_path(root);
    let existed = db_path.exists();
    DeckDb::open(&db_path).context("failed to create deck database")?;
    if existed {
        println!("  exists:  {}", paths::DB_FILE);
    } else {
        println!("  created: {}", paths::DB_FILE);
    }

    println!("\nDone. Drop files into the library folder and run: deck sync");
    Ok(())
}
