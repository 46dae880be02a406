//! Dated archive directories holding one import batch each.
//!
//! An archive contains the feed ZIP (`properties.zip`), the listing files
//! extracted from it and, once merged, `properties.xml`.

use crate::error::{EngineError, Result};
use crate::models::ArchiveSummary;
use crate::stores::ArchiveStore;
use chrono::{DateTime, Utc};
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const MERGED_FILE_NAME: &str = "properties.xml";
pub const ZIP_FILE_NAME: &str = "properties.zip";

const ARCHIVE_NAME_FORMAT: &str = "%d-%m-%Y_%H-%M-%S";
const MIN_ZIP_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub name: String,
    pub path: PathBuf,
}

impl Archive {
    fn at(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, path }
    }

    pub fn merged_path(&self) -> PathBuf {
        self.path.join(MERGED_FILE_NAME)
    }

    pub fn zip_path(&self) -> PathBuf {
        self.path.join(ZIP_FILE_NAME)
    }
}

/// Archive operations on top of an injected [`ArchiveStore`]
#[derive(Clone)]
pub struct ArchiveManager {
    store: Arc<dyn ArchiveStore>,
    root: PathBuf,
}

impl ArchiveManager {
    pub fn new(store: Arc<dyn ArchiveStore>, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &dyn ArchiveStore {
        self.store.as_ref()
    }

    /// Create (or reuse) the archive directory named after `now`
    pub async fn create(&self, now: DateTime<Utc>) -> Result<Archive> {
        let archive = Archive::at(self.root.join(now.format(ARCHIVE_NAME_FORMAT).to_string()));

        if !self.store.is_dir(&archive.path).await {
            self.store
                .create_dir_all(&archive.path)
                .await
                .map_err(|source| EngineError::DirectoryCreation {
                    path: archive.path.clone(),
                    source,
                })?;
        }

        debug!("Using archive directory {}", archive.path.display());
        Ok(archive)
    }

    /// Store a feed ZIP in a new archive and extract it there
    pub async fn import_zip(&self, zip: &[u8], now: DateTime<Utc>) -> Result<(Archive, Vec<PathBuf>)> {
        validate_zip(zip)?;
        let archive = self.create(now).await?;

        let zip_path = archive.zip_path();
        self.store
            .write(&zip_path, zip)
            .await
            .map_err(|source| EngineError::FileWrite {
                path: zip_path.clone(),
                source,
            })?;

        let files = self.extract_zip(&archive).await?;
        Ok((archive, files))
    }

    /// Extract the archive's stored ZIP in place, returning its listing files
    pub async fn extract_zip(&self, archive: &Archive) -> Result<Vec<PathBuf>> {
        let zip_path = archive.zip_path();
        let bytes = self
            .store
            .read(&zip_path)
            .await
            .map_err(|source| EngineError::FileRead {
                path: zip_path.clone(),
                source,
            })?;

        let entries = read_zip_entries(&bytes)?;
        for (name, contents) in &entries {
            let target = archive.path.join(name);
            if let Some(parent) = target.parent() {
                if !self.store.is_dir(parent).await {
                    self.store.create_dir_all(parent).await.map_err(|source| {
                        EngineError::DirectoryCreation {
                            path: parent.to_path_buf(),
                            source,
                        }
                    })?;
                }
            }
            self.store
                .write(&target, contents)
                .await
                .map_err(|source| EngineError::FileWrite {
                    path: target.clone(),
                    source,
                })?;
        }

        let files = self.xml_files(&archive.path).await?;
        info!(
            "ZIP extracted successfully. Found {} XML file(s) in {}",
            files.len(),
            archive.name
        );
        Ok(files)
    }

    /// Listing files under `dir`, recursively, sorted by path.
    ///
    /// The archive's own merged document is not a listing file.
    pub async fn xml_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let merged = dir.join(MERGED_FILE_NAME);
        let mut pending = vec![dir.to_path_buf()];
        let mut files = Vec::new();

        while let Some(current) = pending.pop() {
            let entries = self
                .store
                .list_dir(&current)
                .await
                .map_err(|err| EngineError::Store(format!("{}: {err}", current.display())))?;

            for entry in entries {
                if entry.is_dir {
                    pending.push(entry.path);
                } else if is_xml(&entry.path) && entry.path != merged {
                    files.push(entry.path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// All archives, newest first
    pub async fn list(&self) -> Result<Vec<ArchiveSummary>> {
        if !self.store.is_dir(&self.root).await {
            return Ok(Vec::new());
        }

        let entries = self
            .store
            .list_dir(&self.root)
            .await
            .map_err(|err| EngineError::Store(format!("{}: {err}", self.root.display())))?;

        let mut summaries = Vec::new();
        for entry in entries.into_iter().filter(|e| e.is_dir) {
            let archive = Archive::at(entry.path);
            let count = self.xml_files(&archive.path).await?.len();
            let has_merged = self.store.exists(&archive.merged_path()).await;
            summaries.push(ArchiveSummary {
                name: archive.name,
                path: archive.path,
                count,
                has_merged,
                date: entry.modified,
            });
        }

        summaries.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.name.cmp(&a.name)));
        Ok(summaries)
    }

    /// Resolve a caller-supplied path to an existing archive under the root
    pub async fn open(&self, path: &Path) -> Result<Archive> {
        let inside_root = path.starts_with(&self.root)
            && path != self.root
            && !path.components().any(|c| matches!(c, Component::ParentDir));
        if !inside_root {
            return Err(EngineError::InvalidArchivePath(path.to_path_buf()));
        }
        if !self.store.is_dir(path).await {
            return Err(EngineError::ArchiveNotFound(path.to_path_buf()));
        }
        Ok(Archive::at(path.to_path_buf()))
    }

    /// Recursively delete an archive
    pub async fn delete(&self, path: &Path) -> Result<()> {
        let archive = self.open(path).await?;
        self.store
            .remove_dir_all(&archive.path)
            .await
            .map_err(|err| EngineError::Store(format!("Failed to delete archive: {err}")))?;
        info!("Deleted archive {}", archive.name);
        Ok(())
    }
}

fn is_xml(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("xml"))
        .unwrap_or(false)
}

/// Reject payloads that cannot be a ZIP before touching the store
pub fn validate_zip(bytes: &[u8]) -> Result<()> {
    if bytes.len() < MIN_ZIP_SIZE {
        return Err(EngineError::InvalidZip(
            "file is too small or empty".to_string(),
        ));
    }
    if !bytes.starts_with(b"PK") {
        return Err(EngineError::InvalidZip(
            "file is not a ZIP archive".to_string(),
        ));
    }
    Ok(())
}

fn read_zip_entries(bytes: &[u8]) -> Result<Vec<(PathBuf, Vec<u8>)>> {
    validate_zip(bytes)?;
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| EngineError::InvalidZip(err.to_string()))?;

    let mut entries = Vec::new();
    for index in 0..zip.len() {
        let mut file = zip
            .by_index(index)
            .map_err(|err| EngineError::InvalidZip(err.to_string()))?;
        if file.is_dir() {
            continue;
        }
        let Some(name) = file.enclosed_name() else {
            warn!("Skipping ZIP entry with unsafe path: {}", file.name());
            continue;
        };

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|err| EngineError::InvalidZip(format!("{}: {err}", name.display())))?;
        entries.push((name, contents));
    }
    Ok(entries)
}
