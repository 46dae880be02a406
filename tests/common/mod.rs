#![allow(dead_code)]

use listing_importer::stores::{FsArchiveStore, StateStore};
use listing_importer::{ArchiveManager, ImportService};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Builder for one listing XML document
#[derive(Debug, Clone, Default)]
pub struct ListingXml {
    id: Option<String>,
    address: Option<String>,
    city: Option<String>,
    purchase_price: Option<String>,
    rent_price: Option<String>,
    modified: Option<String>,
    images: Vec<String>,
}

impl ListingXml {
    pub fn new(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            address: Some("Kerkstraat 1".to_string()),
            city: Some("Utrecht".to_string()),
            ..Default::default()
        }
    }

    pub fn address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    pub fn purchase_price(mut self, price: &str) -> Self {
        self.purchase_price = Some(price.to_string());
        self
    }

    pub fn rent_price(mut self, price: &str) -> Self {
        self.rent_price = Some(price.to_string());
        self
    }

    pub fn modified(mut self, modified: &str) -> Self {
        self.modified = Some(modified.to_string());
        self
    }

    pub fn image(mut self, url: &str) -> Self {
        self.images.push(url.to_string());
        self
    }

    pub fn build(&self) -> String {
        let translated = |tag: &str, value: &Option<String>| {
            value
                .as_ref()
                .map(|v| format!("<{tag}><Translation>{v}</Translation></{tag}>"))
                .unwrap_or_default()
        };
        let plain = |tag: &str, value: &Option<String>| {
            value
                .as_ref()
                .map(|v| format!("<{tag}>{v}</{tag}>"))
                .unwrap_or_default()
        };

        let attachments: String = self
            .images
            .iter()
            .map(|url| format!("<Attachment><URLNormalizedFile>{url}</URLNormalizedFile></Attachment>"))
            .collect();

        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <RealEstateProperty>\n\
             <PropertyInfo>{}{}</PropertyInfo>\n\
             <Location><Address>{}{}</Address></Location>\n\
             <Financials>{}{}</Financials>\n\
             <Attachments>{}</Attachments>\n\
             </RealEstateProperty>\n",
            plain("PublicReferenceNumber", &self.id),
            plain("ModificationDateTime", &self.modified),
            translated("AddressLine1", &self.address),
            translated("CityName", &self.city),
            plain("PurchasePrice", &self.purchase_price),
            plain("RentPrice", &self.rent_price),
            attachments,
        )
    }
}

pub fn zip_of(files: &[(&str, String)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, contents) in files {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Service over a temporary data directory
pub struct Workspace {
    pub dir: TempDir,
    pub state: Arc<StateStore>,
    pub service: ImportService,
}

impl Workspace {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(
            StateStore::open(dir.path().join("state.json"))
                .await
                .unwrap(),
        );
        let archives = ArchiveManager::new(Arc::new(FsArchiveStore::new()), dir.path().join("archived"));
        let service = ImportService::new(archives, state.clone(), state.clone());
        Self { dir, state, service }
    }

    pub fn archive_root(&self) -> PathBuf {
        self.dir.path().join("archived")
    }

    /// Write loose listing files into a named archive directory
    pub fn seed_archive(&self, name: &str, files: &[(&str, String)]) -> (PathBuf, Vec<PathBuf>) {
        let archive = self.archive_root().join(name);
        std::fs::create_dir_all(&archive).unwrap();
        let paths = files
            .iter()
            .map(|(file, contents)| write_file(&archive, file, contents))
            .collect();
        (archive, paths)
    }
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}
