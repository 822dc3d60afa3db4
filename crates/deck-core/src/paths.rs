use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const DECK_DIR: &str = ".deck";
pub const CONFIG_FILE: &str = ".deck/config.yaml";
pub const DB_FILE: &str = ".deck/deck.db";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn deck_dir(root: &Path) -> PathBuf {
    root.join(DECK_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}

/// Resolve the library folder. Relative folders are anchored at `root`.
pub fn library_dir(root: &Path, folder: &Path) -> PathBuf {
    if folder.is_absolute() {
        folder.to_path_buf()
    } else {
        root.join(folder)
    }
}

/// Lowercased extension of `file_name`, without the dot.
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
