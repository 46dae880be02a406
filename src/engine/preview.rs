use super::merge::file_label;
use crate::error::{EngineError, Result};
use crate::models::{PreviewRecord, NOT_AVAILABLE};
use crate::stores::ArchiveStore;
use crate::xml::{paths, price_with_fallback, Element, ListingDocument};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Preview records plus the per-file failures that were skipped
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PreviewReport {
    pub records: Vec<PreviewRecord>,
    pub total_files: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
}

impl PreviewReport {
    pub fn message(&self) -> String {
        format!(
            "Found {} valid properties out of {} XML files.",
            self.records.len(),
            self.total_files
        )
    }
}

/// Flatten one listing element into a preview record
pub fn project(scope: &Element, position: usize) -> PreviewRecord {
    let text = |path: paths::FieldPath| path.first(scope);
    let or_na = |value: Option<String>| value.unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let purchase_price = text(paths::PURCHASE_PRICE);
    let rent_price = text(paths::RENT_PRICE);
    let price = price_with_fallback(purchase_price.as_deref(), rent_price.as_deref());

    PreviewRecord {
        position,
        property_id: or_na(text(paths::PROPERTY_ID)),
        address: or_na(text(paths::ADDRESS)),
        city: or_na(text(paths::CITY)),
        postal_code: text(paths::POSTAL_CODE).unwrap_or_default(),
        country: text(paths::COUNTRY).unwrap_or_default(),
        price: or_na(price),
        purchase_price: purchase_price.unwrap_or_default(),
        rent_price: rent_price.unwrap_or_default(),
        property_type: text(paths::PROPERTY_TYPE).unwrap_or_default(),
        status: text(paths::STATUS).unwrap_or_default(),
        living_area: text(paths::LIVING_AREA).unwrap_or_default(),
        plot_area: text(paths::PLOT_AREA).unwrap_or_default(),
        rooms: text(paths::ROOMS).unwrap_or_default(),
        bedrooms: text(paths::BEDROOMS).unwrap_or_default(),
        bathrooms: text(paths::BATHROOMS).unwrap_or_default(),
        description: text(paths::DESCRIPTION).unwrap_or_default(),
        image_url: text(paths::THUMBNAIL_URL).unwrap_or_default(),
        last_modified: text(paths::LAST_MODIFIED).unwrap_or_default(),
        ..Default::default()
    }
}

/// Preview loose listing files without merging them.
///
/// `position` is the 1-based index in `files`. Unusable files are skipped; the
/// call only fails when no file yields a record.
pub async fn preview_from_sources(
    store: &dyn ArchiveStore,
    files: &[PathBuf],
) -> Result<PreviewReport> {
    if files.is_empty() {
        return Err(EngineError::EmptySelection);
    }

    let mut report = PreviewReport {
        total_files: files.len(),
        ..Default::default()
    };

    for (index, file) in files.iter().enumerate() {
        match preview_file(store, file, index + 1).await {
            Ok(record) => report.records.push(record),
            Err(err) => {
                warn!("Skipping {} in preview: {}", file.display(), err);
                report.errors.push(format!("File {}: {}", file_label(file), err));
            }
        }
    }
    report.error_count = report.errors.len();

    if report.records.is_empty() {
        return Err(EngineError::NoValidRecords {
            attempted: files.len(),
            errors: report.errors,
        });
    }

    info!("{}", report.message());
    Ok(report)
}

async fn preview_file(store: &dyn ArchiveStore, file: &Path, position: usize) -> Result<PreviewRecord> {
    let bytes = store
        .read(file)
        .await
        .map_err(|source| EngineError::FileRead {
            path: file.to_path_buf(),
            source,
        })?;
    let document = ListingDocument::parse(&bytes)?;

    let mut record = project(document.property_node()?, position);
    record.file_name = Some(file_label(file));
    record.file_path = Some(file.to_path_buf());
    Ok(record)
}

/// Preview every listing of a merged document in document order
pub async fn preview_from_merged(store: &dyn ArchiveStore, merged: &Path) -> Result<PreviewReport> {
    let bytes = store
        .read(merged)
        .await
        .map_err(|source| EngineError::FileRead {
            path: merged.to_path_buf(),
            source,
        })?;
    let document = ListingDocument::parse(&bytes)?;

    let nodes = document.property_nodes();
    if nodes.is_empty() {
        return Err(EngineError::NoPropertyNode);
    }

    let records: Vec<PreviewRecord> = nodes
        .into_iter()
        .enumerate()
        .map(|(index, node)| project(node, index + 1))
        .collect();

    info!("Previewed {} properties from {}", records.len(), merged.display());
    Ok(PreviewReport {
        total_files: 1,
        records,
        error_count: 0,
        errors: Vec::new(),
    })
}
