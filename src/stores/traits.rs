use crate::error::Result;
use crate::models::{FieldSnapshot, HistoryEntry, ImportStats, PreviewRecord, PropertiesInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    pub modified: Option<DateTime<Utc>>,
}

/// Filesystem-like access to the archive area.
///
/// The engine only reaches disk through this trait, so tests can swap in
/// [`super::MemoryArchiveStore`].
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Whole contents of the file at `path`
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the file at `path`. The parent directory must exist.
    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Create `path` and any missing parents
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Whether a file or directory exists at `path`
    async fn exists(&self, path: &Path) -> bool;

    /// Whether `path` is an existing directory
    async fn is_dir(&self, path: &Path) -> bool;

    /// Direct children of `path`, sorted by path
    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Delete the directory at `path` and everything below it
    async fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// Last-imported state per listing. Read by the diff engine, written only when
/// an import run is confirmed.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Last-imported summary per property id
    async fn history(&self) -> Result<BTreeMap<String, HistoryEntry>>;

    /// Last-imported field snapshot per property id
    async fn history_details(&self) -> Result<BTreeMap<String, FieldSnapshot>>;

    /// Store summary and snapshot for each imported listing, replacing any
    /// earlier entry with the same id
    async fn record_import(&self, entries: Vec<(HistoryEntry, FieldSnapshot)>) -> Result<()>;
}

/// State carried between the steps of one operator session
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Metadata of the most recent merged document, if any
    async fn properties_info(&self) -> Result<Option<PropertiesInfo>>;

    /// Replace the merged document metadata
    async fn save_properties_info(&self, info: PropertiesInfo) -> Result<()>;

    /// Records of the latest preview
    async fn preview(&self) -> Result<Vec<PreviewRecord>>;

    /// Replace the preview snapshot
    async fn save_preview(&self, records: Vec<PreviewRecord>) -> Result<()>;

    /// Positions the operator selected, in selection order
    async fn selection(&self) -> Result<Vec<usize>>;

    /// Replace the selected positions
    async fn save_selection(&self, positions: Vec<usize>) -> Result<()>;

    /// Counts reported by the last confirmed import, if any
    async fn last_import_stats(&self) -> Result<Option<ImportStats>>;

    /// Replace the last import counts
    async fn save_import_stats(&self, stats: ImportStats) -> Result<()>;
}
