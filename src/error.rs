use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the XML engine, the archive layer and the stores.
///
/// Boundary operations in [`crate::service`] never return these directly; they
/// fold them into a failed response carrying [`EngineError::to_string`] as the
/// user-facing message.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unable to read XML file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse XML: {}", .messages.join(", "))]
    Parse { messages: Vec<String> },

    #[error("RealEstateProperty node not found in XML file.")]
    NoPropertyNode,

    #[error("Failed to create output directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write merged XML file: {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No properties selected. Please select at least one property.")]
    EmptySelection,

    #[error("No valid properties found in {attempted} XML file(s).")]
    NoValidRecords {
        attempted: usize,
        errors: Vec<String>,
    },

    #[error("Invalid selection format: {0}")]
    InvalidSelection(String),

    #[error("Invalid archive path: {}", .0.display())]
    InvalidArchivePath(PathBuf),

    #[error("Archive not found: {}", .0.display())]
    ArchiveNotFound(PathBuf),

    #[error("Invalid ZIP archive: {0}")]
    InvalidZip(String),

    #[error("Failed to generate XML output: {0}")]
    Serialize(String),

    #[error("Storage error: {0}")]
    Store(String),
}

impl EngineError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            messages: vec![message.into()],
        }
    }

    /// Per-file errors collected before the operation failed, if any.
    pub fn file_errors(&self) -> &[String] {
        match self {
            Self::NoValidRecords { errors, .. } => errors,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
