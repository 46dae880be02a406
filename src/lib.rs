//! Real-estate feed importer.
//!
//! Takes per-listing XML files out of a feed ZIP, merges them into one
//! `properties.xml`, previews the listings for an operator and flags what
//! changed since the last confirmed import.

pub mod archive;
pub mod config;
pub mod engine;
pub mod error;
pub mod media;
pub mod models;
pub mod service;
pub mod stores;
pub mod trigger;
pub mod xml;

pub use archive::{Archive, ArchiveManager};
pub use config::Config;
pub use error::{EngineError, Result};
pub use service::ImportService;
