use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Placeholder shown for identity and headline fields that a listing lacks.
pub const NOT_AVAILABLE: &str = "N/A";

/// Flattened projection of one listing, used for selection and diffing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PreviewRecord {
    /// 1-based ordinal within the merged document (or the input file list)
    pub position: usize,
    pub property_id: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    /// Purchase price, falling back to rent price
    pub price: String,
    pub purchase_price: String,
    pub rent_price: String,
    pub property_type: String,
    pub status: String,
    pub living_area: String,
    pub plot_area: String,
    pub rooms: String,
    pub bedrooms: String,
    pub bathrooms: String,
    pub description: String,
    pub image_url: String,
    pub last_modified: String,
    #[serde(default)]
    pub changed_fields: Vec<ChangedField>,
    #[serde(default)]
    pub is_updated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_message: Option<String>,
    /// Source file, only set for loose-file previews
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

impl PreviewRecord {
    pub fn field(&self, field: DiffField) -> &str {
        match field {
            DiffField::Address => &self.address,
            DiffField::City => &self.city,
            DiffField::PostalCode => &self.postal_code,
            DiffField::Country => &self.country,
            DiffField::PurchasePrice => &self.purchase_price,
            DiffField::RentPrice => &self.rent_price,
            DiffField::PropertyType => &self.property_type,
            DiffField::Status => &self.status,
            DiffField::LivingArea => &self.living_area,
            DiffField::PlotArea => &self.plot_area,
            DiffField::Rooms => &self.rooms,
            DiffField::Bedrooms => &self.bedrooms,
            DiffField::Bathrooms => &self.bathrooms,
            DiffField::Description => &self.description,
            DiffField::LastModified => &self.last_modified,
        }
    }

    /// Snapshot of every diffable field, as written to import history
    pub fn snapshot(&self) -> FieldSnapshot {
        let mut snapshot = FieldSnapshot::default();
        for field in DiffField::ALL {
            snapshot.set(field, self.field(field).to_string());
        }
        snapshot
    }
}

/// One field that differs from the last imported state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangedField {
    pub field_label: String,
    pub old_value: String,
    pub new_value: String,
}

/// Fields compared between a preview and the last import, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffField {
    Address,
    City,
    PostalCode,
    Country,
    PurchasePrice,
    RentPrice,
    PropertyType,
    Status,
    LivingArea,
    PlotArea,
    Rooms,
    Bedrooms,
    Bathrooms,
    Description,
    LastModified,
}

impl DiffField {
    pub const ALL: [DiffField; 15] = [
        DiffField::Address,
        DiffField::City,
        DiffField::PostalCode,
        DiffField::Country,
        DiffField::PurchasePrice,
        DiffField::RentPrice,
        DiffField::PropertyType,
        DiffField::Status,
        DiffField::LivingArea,
        DiffField::PlotArea,
        DiffField::Rooms,
        DiffField::Bedrooms,
        DiffField::Bathrooms,
        DiffField::Description,
        DiffField::LastModified,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DiffField::Address => "Address",
            DiffField::City => "City",
            DiffField::PostalCode => "Postal Code",
            DiffField::Country => "Country",
            DiffField::PurchasePrice => "Purchase Price",
            DiffField::RentPrice => "Rent Price",
            DiffField::PropertyType => "Property Type",
            DiffField::Status => "Status",
            DiffField::LivingArea => "Living Area",
            DiffField::PlotArea => "Plot Area",
            DiffField::Rooms => "Rooms",
            DiffField::Bedrooms => "Bedrooms",
            DiffField::Bathrooms => "Bathrooms",
            DiffField::Description => "Description",
            DiffField::LastModified => "Last Modified",
        }
    }
}

/// Last imported value of every diffable field for one listing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FieldSnapshot {
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub purchase_price: String,
    pub rent_price: String,
    pub property_type: String,
    pub status: String,
    pub living_area: String,
    pub plot_area: String,
    pub rooms: String,
    pub bedrooms: String,
    pub bathrooms: String,
    pub description: String,
    pub last_modified: String,
}

impl FieldSnapshot {
    pub fn get(&self, field: DiffField) -> &str {
        match field {
            DiffField::Address => &self.address,
            DiffField::City => &self.city,
            DiffField::PostalCode => &self.postal_code,
            DiffField::Country => &self.country,
            DiffField::PurchasePrice => &self.purchase_price,
            DiffField::RentPrice => &self.rent_price,
            DiffField::PropertyType => &self.property_type,
            DiffField::Status => &self.status,
            DiffField::LivingArea => &self.living_area,
            DiffField::PlotArea => &self.plot_area,
            DiffField::Rooms => &self.rooms,
            DiffField::Bedrooms => &self.bedrooms,
            DiffField::Bathrooms => &self.bathrooms,
            DiffField::Description => &self.description,
            DiffField::LastModified => &self.last_modified,
        }
    }

    pub fn set(&mut self, field: DiffField, value: String) {
        let slot = match field {
            DiffField::Address => &mut self.address,
            DiffField::City => &mut self.city,
            DiffField::PostalCode => &mut self.postal_code,
            DiffField::Country => &mut self.country,
            DiffField::PurchasePrice => &mut self.purchase_price,
            DiffField::RentPrice => &mut self.rent_price,
            DiffField::PropertyType => &mut self.property_type,
            DiffField::Status => &mut self.status,
            DiffField::LivingArea => &mut self.living_area,
            DiffField::PlotArea => &mut self.plot_area,
            DiffField::Rooms => &mut self.rooms,
            DiffField::Bedrooms => &mut self.bedrooms,
            DiffField::Bathrooms => &mut self.bathrooms,
            DiffField::Description => &mut self.description,
            DiffField::LastModified => &mut self.last_modified,
        };
        *slot = value;
    }
}

/// Summary of a listing as it was last imported
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub property_id: String,
    pub address: String,
    pub city: String,
    pub price: String,
    /// Feed modification timestamp at import time
    pub last_modified: String,
    pub last_imported: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_record(record: &PreviewRecord, imported_at: DateTime<Utc>) -> Self {
        Self {
            property_id: record.property_id.clone(),
            address: record.address.clone(),
            city: record.city.clone(),
            price: record.price.clone(),
            last_modified: record.last_modified.clone(),
            last_imported: imported_at,
        }
    }
}

/// Pass/fail counts reported back by the external import run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportStats {
    pub count: u64,
    pub imported: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub deleted: u64,
}

/// Metadata about the most recent merged `properties.xml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertiesInfo {
    pub total_properties: usize,
    pub created_at: DateTime<Utc>,
    pub archive_name: String,
    pub archive_path: PathBuf,
    pub output_file: PathBuf,
}

/// One dated archive directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveSummary {
    pub name: String,
    pub path: PathBuf,
    /// Number of raw listing files (the merged document is not counted)
    pub count: usize,
    pub has_merged: bool,
    pub date: Option<DateTime<Utc>>,
}
