//! The item library: registry records in the deck database, payload files in
//! a folder on disk. This is the concrete `Pool` the CLI runs against.

use crate::config::LibraryConfig;
use crate::db::DeckDb;
use crate::error::{DeckError, Result};
use crate::pool::Pool;
use crate::types::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    /// Payload file name inside the library folder.
    pub file: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Accepted files found in the folder.
    pub scanned: usize,
    /// Files registered by this sync.
    pub added: usize,
}

pub struct Library {
    db: Arc<DeckDb>,
    folder: PathBuf,
    config: LibraryConfig,
}

impl Library {
    pub fn new(db: Arc<DeckDb>, folder: impl Into<PathBuf>, config: LibraryConfig) -> Self {
        Self {
            db,
            folder: folder.into(),
            config,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn path_of(&self, record: &ItemRecord) -> PathBuf {
        self.folder.join(&record.file)
    }

    pub fn get(&self, id: ItemId) -> Result<Option<ItemRecord>> {
        self.db.get_item(id)
    }

    /// Like `get`, but an unknown id is an error.
    pub fn require(&self, id: ItemId) -> Result<ItemRecord> {
        self.get(id)?.ok_or(DeckError::ItemNotFound(id))
    }

    pub fn list(&self) -> Result<Vec<ItemRecord>> {
        self.db.list_items()
    }

    /// Register a file that already sits in the library folder.
    pub fn add(&self, file_name: &str) -> Result<ItemRecord> {
        if !self.config.accepts(file_name) {
            return Err(DeckError::UnsupportedExtension(file_name.to_string()));
        }
        let record = self.db.insert_item(file_name, Utc::now())?;
        tracing::debug!(id = %record.id, file = %record.file, "item registered");
        Ok(record)
    }

    /// Store a new payload in the folder and register it.
    ///
    /// The file is named `<uploader>_<unix-seconds>.<ext>` (uploader reduced to
    /// `[A-Za-z0-9_-]`); a numeric suffix is appended when several uploads
    /// land in the same second.
    pub fn ingest(&self, bytes: &[u8], extension: &str, uploader: &str) -> Result<ItemRecord> {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        if !self.config.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            return Err(DeckError::UnsupportedExtension(ext));
        }
        let uploader: String = uploader
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        let stamp = Utc::now().timestamp();
        let mut attempt = 0u32;
        let file_name = loop {
            let candidate = if attempt == 0 {
                format!("{uploader}_{stamp}.{ext}")
            } else {
                format!("{uploader}_{stamp}_{attempt}.{ext}")
            };
            match crate::io::atomic_write_new(&self.folder.join(&candidate), bytes) {
                Ok(()) => break candidate,
                Err(DeckError::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };
        let record = self.db.insert_item(&file_name, Utc::now())?;
        tracing::info!(id = %record.id, file = %record.file, "item ingested");
        Ok(record)
    }

    /// Unregister an item and delete its payload.
    pub fn remove(&self, id: ItemId) -> Result<ItemRecord> {
        let Some(record) = self.db.remove_item(id)? else {
            return Err(DeckError::ItemNotFound(id));
        };
        match std::fs::remove_file(self.path_of(&record)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(id = %id, file = %record.file, "payload already missing");
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(id = %id, file = %record.file, "item removed");
        Ok(record)
    }

    /// Register every accepted file in the folder that is not yet known.
    /// Records whose files vanished are left alone.
    pub fn sync_folder(&self) -> Result<SyncReport> {
        if !self.folder.is_dir() {
            return Ok(SyncReport::default());
        }
        let mut files: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&self.folder)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if self.config.accepts(&name) {
                files.push(name);
            }
        }
        // Directory order is platform-dependent; sort so ids are reproducible.
        files.sort();

        let known: std::collections::HashSet<String> =
            self.db.list_items()?.into_iter().map(|r| r.file).collect();
        let mut report = SyncReport {
            scanned: files.len(),
            added: 0,
        };
        for name in files.iter().filter(|f| !known.contains(*f)) {
            self.db.insert_item(name, Utc::now())?;
            report.added += 1;
        }
        if report.added > 0 {
            tracing::info!(added = report.added, "synced new items from folder");
        }
        Ok(report)
    }
}

impl Pool for Library {
    fn size(&self) -> Result<u64> {
        self.db.count_items()
    }

    fn all_ids(&self) -> Result<Vec<ItemId>> {
        self.db.item_ids()
    }

    fn exists(&self, id: ItemId) -> Result<bool> {
        Ok(self.db.get_item(id)?.is_some())
    }

    fn get_payload(&self, id: ItemId) -> Result<Option<Vec<u8>>> {
        let Some(record) = self.db.get_item(id)? else {
            return Ok(None);
        };
        match std::fs::read(self.path_of(&record)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
