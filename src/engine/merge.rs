use crate::error::{EngineError, Result};
use crate::stores::ArchiveStore;
use crate::xml::{Element, ListingDocument, XmlDocument};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Root element of a merged document
pub const MERGED_ROOT: &str = "properties";

/// Outcome of a merge that wrote at least one listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergeReport {
    pub total: usize,
    pub processed_count: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
    pub output_file: PathBuf,
}

impl MergeReport {
    pub fn message(&self) -> String {
        let mut message = format!(
            "Successfully merged {} of {} selected properties.",
            self.processed_count, self.total
        );
        match self.error_count {
            0 => {}
            1 => message.push_str(" 1 file had errors."),
            n => message.push_str(&format!(" {n} files had errors.")),
        }
        message
    }
}

/// Merge the listing element of every source, in order, into one document at
/// `output`.
///
/// Sources that cannot be read or parsed are reported in
/// [`MergeReport::errors`] and skipped. If none survive nothing is written and
/// [`EngineError::NoValidRecords`] is returned.
pub async fn merge(
    store: &dyn ArchiveStore,
    sources: &[PathBuf],
    output: &Path,
) -> Result<MergeReport> {
    if sources.is_empty() {
        return Err(EngineError::EmptySelection);
    }

    info!("Merging {} listing files into {}", sources.len(), output.display());

    let mut root = Element::new(MERGED_ROOT);
    let mut errors = Vec::new();

    for source in sources {
        match load_listing(store, source).await {
            Ok(listing) => root.push_element(listing),
            Err(err) => {
                warn!("Skipping {}: {}", source.display(), err);
                errors.push(format!("File {}: {}", file_label(source), err));
            }
        }
    }

    let processed_count = root.children.len();
    if processed_count == 0 {
        return Err(EngineError::NoValidRecords {
            attempted: sources.len(),
            errors,
        });
    }

    let bytes = XmlDocument::new(root).to_pretty_bytes()?;
    write_output(store, output, &bytes).await?;

    let report = MergeReport {
        total: sources.len(),
        processed_count,
        error_count: errors.len(),
        errors,
        output_file: output.to_path_buf(),
    };
    info!("{}", report.message());
    Ok(report)
}

/// Deep copy of the listing element of one source file.
///
/// The parsed source is dropped on return; only the copy survives. Namespace
/// declarations of enclosing elements move onto the copy so it stays bound
/// inside the merged document.
pub async fn load_listing(store: &dyn ArchiveStore, path: &Path) -> Result<Element> {
    let bytes = store
        .read(path)
        .await
        .map_err(|source| EngineError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
    let document = ListingDocument::parse(&bytes)?;
    document.detached_property_node()
}

async fn write_output(store: &dyn ArchiveStore, output: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !store.is_dir(parent).await {
            debug!("Creating output directory {}", parent.display());
            store
                .create_dir_all(parent)
                .await
                .map_err(|source| EngineError::DirectoryCreation {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
    }

    store
        .write(output, bytes)
        .await
        .map_err(|source| EngineError::FileWrite {
            path: output.to_path_buf(),
            source,
        })
}

pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryArchiveStore;

    fn listing(id: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<RealEstateProperty>\
             <PropertyInfo><PublicReferenceNumber>{id}</PublicReferenceNumber></PropertyInfo>\
             </RealEstateProperty>"
        )
    }

    fn merged_ids(bytes: &[u8]) -> Vec<String> {
        let doc = ListingDocument::parse(bytes).unwrap();
        doc.property_nodes()
            .into_iter()
            .map(|node| crate::xml::paths::PROPERTY_ID.first(node).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn keeps_caller_order_and_wraps_in_root() {
        let store = MemoryArchiveStore::new()
            .with_file("/in/b.xml", listing("B"))
            .with_file("/in/a.xml", listing("A"));
        let sources = vec![PathBuf::from("/in/b.xml"), PathBuf::from("/in/a.xml")];
        let output = Path::new("/out/properties.xml");

        let report = merge(&store, &sources, output).await.unwrap();
        assert_eq!(report.processed_count, 2);
        assert_eq!(report.error_count, 0);

        let bytes = store.read(output).await.unwrap();
        let doc = ListingDocument::parse(&bytes).unwrap();
        assert_eq!(doc.root().name, MERGED_ROOT);
        assert_eq!(merged_ids(&bytes), vec!["B", "A"]);
    }

    #[tokio::test]
    async fn skips_broken_files_and_reports_them() {
        let store = MemoryArchiveStore::new()
            .with_file("/in/a.xml", listing("A"))
            .with_file("/in/bad.xml", "<RealEstateProperty><x></RealEstateProperty>")
            .with_file("/in/empty.xml", "<Export/>");
        let sources = vec![
            PathBuf::from("/in/a.xml"),
            PathBuf::from("/in/bad.xml"),
            PathBuf::from("/in/missing.xml"),
            PathBuf::from("/in/empty.xml"),
        ];

        let report = merge(&store, &sources, Path::new("/in/properties.xml"))
            .await
            .unwrap();
        assert_eq!(report.processed_count, 1);
        assert_eq!(report.error_count, 3);
        assert!(report.errors[0].starts_with("File bad.xml: Failed to parse XML"));
        assert!(report.errors[1].starts_with("File missing.xml: Unable to read"));
        assert!(report.errors[2].contains("RealEstateProperty node not found"));
        assert!(report.message().ends_with("3 files had errors."));
    }

    #[tokio::test]
    async fn all_failures_write_nothing() {
        let store = MemoryArchiveStore::new()
            .with_file("/in/a.xml", "<broken")
            .with_file("/in/b.xml", "also broken");
        let sources = vec![PathBuf::from("/in/a.xml"), PathBuf::from("/in/b.xml")];
        let output = Path::new("/in/properties.xml");

        let err = merge(&store, &sources, output).await.unwrap_err();
        assert!(matches!(err, EngineError::NoValidRecords { attempted: 2, .. }));
        assert_eq!(err.file_errors().len(), 2);
        assert!(!store.exists(output).await);
    }

    #[tokio::test]
    async fn empty_source_list_is_rejected() {
        let store = MemoryArchiveStore::new();
        let err = merge(&store, &[], Path::new("/out/p.xml")).await.unwrap_err();
        assert!(matches!(err, EngineError::EmptySelection));
    }

    #[tokio::test]
    async fn directory_creation_failure_is_distinct() {
        let store = MemoryArchiveStore::new()
            .with_file("/in/a.xml", listing("A"))
            .read_only();
        let err = merge(&store, &[PathBuf::from("/in/a.xml")], Path::new("/new/p.xml"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DirectoryCreation { .. }));
    }

    #[tokio::test]
    async fn write_failure_is_distinct() {
        let store = MemoryArchiveStore::new()
            .with_file("/in/a.xml", listing("A"))
            .read_only();
        let err = merge(&store, &[PathBuf::from("/in/a.xml")], Path::new("/in/p.xml"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::FileWrite { .. }));
    }

    #[tokio::test]
    async fn same_input_gives_identical_bytes() {
        let store = MemoryArchiveStore::new()
            .with_file("/in/a.xml", listing("A"))
            .with_file("/in/b.xml", listing("B"));
        let sources = vec![PathBuf::from("/in/a.xml"), PathBuf::from("/in/b.xml")];

        merge(&store, &sources, Path::new("/out/one.xml")).await.unwrap();
        merge(&store, &sources, Path::new("/out/two.xml")).await.unwrap();

        assert_eq!(
            store.read(Path::new("/out/one.xml")).await.unwrap(),
            store.read(Path::new("/out/two.xml")).await.unwrap()
        );
    }

    #[tokio::test]
    async fn namespaced_listings_keep_their_declarations() {
        let store = MemoryArchiveStore::new()
            .with_file(
                "/in/p.xml",
                "<k:Export xmlns:k=\"urn:kolibri\"><k:RealEstateProperty><k:PropertyInfo>\
                 <k:PublicReferenceNumber>P</k:PublicReferenceNumber></k:PropertyInfo>\
                 </k:RealEstateProperty></k:Export>",
            )
            .with_file(
                "/in/d.xml",
                "<Export xmlns=\"urn:kolibri\"><RealEstateProperty><PropertyInfo>\
                 <PublicReferenceNumber>D</PublicReferenceNumber></PropertyInfo>\
                 </RealEstateProperty></Export>",
            );
        let sources = vec![PathBuf::from("/in/p.xml"), PathBuf::from("/in/d.xml")];
        let output = Path::new("/out/properties.xml");

        merge(&store, &sources, output).await.unwrap();

        let bytes = store.read(output).await.unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("<k:RealEstateProperty xmlns:k=\"urn:kolibri\">"));
        assert!(text.contains("<RealEstateProperty xmlns=\"urn:kolibri\">"));

        let doc = ListingDocument::parse(&bytes).unwrap();
        assert!(doc.root().attributes.is_empty());
        assert_eq!(merged_ids(&bytes), vec!["P", "D"]);
    }
}
