use super::traits::{ArchiveStore, DirEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryFs {
    files: BTreeMap<PathBuf, (Vec<u8>, DateTime<Utc>)>,
    dirs: BTreeMap<PathBuf, DateTime<Utc>>,
}

impl MemoryFs {
    fn add_dir_all(&mut self, path: &Path) {
        let now = Utc::now();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            self.dirs.entry(ancestor.to_path_buf()).or_insert(now);
        }
    }

    fn parent_exists(&self, path: &Path) -> bool {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.dirs.contains_key(parent),
            _ => true,
        }
    }
}

/// In-memory [`ArchiveStore`] for tests.
///
/// Mirrors filesystem semantics where the engine depends on them: writes need
/// an existing parent directory, and a read-only store fails every mutation.
#[derive(Debug, Default)]
pub struct MemoryArchiveStore {
    fs: Mutex<MemoryFs>,
    read_only: bool,
    unreadable: BTreeSet<PathBuf>,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write, mkdir and delete with `PermissionDenied`
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Make reads of `path` fail even though the file is listed
    pub fn with_unreadable(mut self, path: impl Into<PathBuf>) -> Self {
        self.unreadable.insert(path.into());
        self
    }

    /// Seed a file, creating its parent directories
    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl AsRef<[u8]>) -> Self {
        self.insert_file(path, contents);
        self
    }

    pub fn insert_file(&self, path: impl Into<PathBuf>, contents: impl AsRef<[u8]>) {
        let path = path.into();
        let mut fs = self.lock();
        if let Some(parent) = path.parent() {
            fs.add_dir_all(parent);
        }
        fs.files
            .insert(path, (contents.as_ref().to_vec(), Utc::now()));
    }

    pub fn file_count(&self) -> usize {
        self.lock().files.len()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryFs> {
        self.fs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "store is read-only",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        if self.unreadable.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file is not readable",
            ));
        }
        self.lock()
            .files
            .get(path)
            .map(|(contents, _)| contents.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.check_writable()?;
        let mut fs = self.lock();
        if !fs.parent_exists(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "parent directory does not exist",
            ));
        }
        fs.files
            .insert(path.to_path_buf(), (contents.to_vec(), Utc::now()));
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.check_writable()?;
        self.lock().add_dir_all(path);
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        let fs = self.lock();
        fs.files.contains_key(path) || fs.dirs.contains_key(path)
    }

    async fn is_dir(&self, path: &Path) -> bool {
        self.lock().dirs.contains_key(path)
    }

    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let fs = self.lock();
        if !fs.dirs.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory"));
        }

        let dirs = fs.dirs.iter().map(|(p, modified)| (p, true, *modified));
        let files = fs.files.iter().map(|(p, (_, modified))| (p, false, *modified));

        let mut entries: Vec<DirEntry> = dirs
            .chain(files)
            .filter(|(p, _, _)| p.parent() == Some(path))
            .map(|(p, is_dir, modified)| DirEntry {
                path: p.clone(),
                is_dir,
                modified: Some(modified),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.check_writable()?;
        let mut fs = self.lock();
        if !fs.dirs.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory"));
        }
        fs.files.retain(|p, _| !p.starts_with(path));
        fs.dirs.retain(|p, _| !p.starts_with(path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_requires_parent_directory() {
        let store = MemoryArchiveStore::new();
        let file = Path::new("/a/b/out.xml");
        assert!(store.write(file, b"x").await.is_err());

        store.create_dir_all(Path::new("/a/b")).await.unwrap();
        store.write(file, b"x").await.unwrap();
        assert_eq!(store.read(file).await.unwrap(), b"x");
        assert!(store.is_dir(Path::new("/a")).await);
    }

    #[tokio::test]
    async fn lists_direct_children_only() {
        let store = MemoryArchiveStore::new()
            .with_file("/root/one/a.xml", "a")
            .with_file("/root/one/deep/b.xml", "b")
            .with_file("/root/two.xml", "c");

        let entries = store.list_dir(Path::new("/root")).await.unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/root/one"), PathBuf::from("/root/two.xml")]
        );
        assert!(entries[0].is_dir);
        assert!(!entries[1].is_dir);
    }

    #[tokio::test]
    async fn read_only_rejects_mutation() {
        let store = MemoryArchiveStore::new().with_file("/x/a.xml", "a").read_only();
        assert!(store.create_dir_all(Path::new("/y")).await.is_err());
        assert!(store.write(Path::new("/x/a.xml"), b"b").await.is_err());
        assert!(store.remove_dir_all(Path::new("/x")).await.is_err());
        assert_eq!(store.read(Path::new("/x/a.xml")).await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn remove_dir_all_drops_subtree() {
        let store = MemoryArchiveStore::new()
            .with_file("/r/keep/a.xml", "a")
            .with_file("/r/gone/b.xml", "b");
        store.remove_dir_all(Path::new("/r/gone")).await.unwrap();
        assert_eq!(store.file_count(), 1);
        assert!(!store.exists(Path::new("/r/gone")).await);
    }
}
