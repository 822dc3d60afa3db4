use crate::error::{DeckError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// LibraryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Folder holding item payloads. Relative paths are resolved against the root.
    #[serde(default = "default_folder")]
    pub folder: PathBuf,
    /// Accepted payload extensions, lowercase, without the dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_folder() -> PathBuf {
    PathBuf::from("memes")
}

fn default_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            folder: default_folder(),
            extensions: default_extensions(),
        }
    }
}

impl LibraryConfig {
    pub fn accepts(&self, file_name: &str) -> bool {
        match paths::extension_of(file_name) {
            Some(ext) => self.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How many times a version conflict on the order state is retried
    /// before the operation fails.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

fn default_max_conflict_retries() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub library: LibraryConfig,
    /// User names allowed to run admin operations.
    #[serde(default)]
    pub admins: Vec<String>,
    /// Initial value of the "non-admins may add items" switch. Once toggled
    /// with lock/unlock the persisted setting wins.
    #[serde(default = "default_allow_user_add")]
    pub allow_user_add: bool,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_version() -> u32 {
    1
}

fn default_allow_user_add() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            library: LibraryConfig::default(),
            admins: Vec::new(),
            allow_user_add: default_allow_user_add(),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(DeckError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn library_dir(&self, root: &Path) -> PathBuf {
        paths::library_dir(root, &self.library.folder)
    }
}
