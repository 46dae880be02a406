//! Boundary operations.
//!
//! Every operation returns a serializable response with `success` and a
//! human-readable `message`. Failures never escape as `Err`; they are folded
//! into the response so the caller can show the message and let the operator
//! retry.

use crate::archive::{Archive, ArchiveManager, MERGED_FILE_NAME};
use crate::engine::{self, annotate_updates, diff_fields, PreviewReport};
use crate::error::{EngineError, Result};
use crate::media::MediaDownloader;
use crate::models::{
    ArchiveSummary, FieldSnapshot, HistoryEntry, ImportStats, PreviewRecord, PropertiesInfo,
    NOT_AVAILABLE,
};
use crate::stores::{HistoryStore, SessionStore};
use crate::trigger::ImportTrigger;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

trait Outcome: Default {
    fn set_status(&mut self, success: bool, message: String);

    fn failure(message: impl Display) -> Self {
        let message = message.to_string();
        warn!("{}", message);
        let mut response = Self::default();
        response.set_status(false, message);
        response
    }
}

macro_rules! outcome {
    ($($response:ty),+ $(,)?) => {
        $(impl Outcome for $response {
            fn set_status(&mut self, success: bool, message: String) {
                self.success = success;
                self.message = message;
            }
        })+
    };
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImportZipResponse {
    pub success: bool,
    pub message: String,
    pub archive_name: String,
    pub archive_path: PathBuf,
    pub xml_files: Vec<PathBuf>,
    pub xml_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MergeResponse {
    pub success: bool,
    pub message: String,
    pub properties: Vec<PreviewRecord>,
    pub total: usize,
    pub processed_count: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PreviewResponse {
    pub success: bool,
    pub message: String,
    pub properties: Vec<PreviewRecord>,
    pub total: usize,
    /// Whether the records came from the archive's merged document
    pub from_merged: bool,
    pub error_count: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SelectionResponse {
    pub success: bool,
    pub message: String,
    pub count: usize,
    pub positions: Vec<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegenerateResponse {
    pub success: bool,
    pub message: String,
    pub xml_count: usize,
    pub properties: Vec<PreviewRecord>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArchivesResponse {
    pub success: bool,
    pub message: String,
    pub archives: Vec<ArchiveSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfirmResponse {
    pub success: bool,
    pub message: String,
    pub recorded: usize,
    pub stats: ImportStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TriggerResponse {
    pub success: bool,
    pub message: String,
    pub processing_response: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaResponse {
    pub success: bool,
    pub message: String,
    pub downloaded_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionStatusResponse {
    pub success: bool,
    pub message: String,
    pub archive_root: PathBuf,
    pub media_dir: Option<PathBuf>,
    pub properties_info: Option<PropertiesInfo>,
    pub selected_count: usize,
    pub last_import_stats: Option<ImportStats>,
}

outcome!(
    SessionStatusResponse,
    ImportZipResponse,
    MergeResponse,
    PreviewResponse,
    SelectionResponse,
    RegenerateResponse,
    ArchivesResponse,
    StatusResponse,
    ConfirmResponse,
    TriggerResponse,
    MediaResponse,
);

impl StatusResponse {
    pub fn failed(message: impl Display) -> Self {
        Self::failure(message)
    }
}

/// Parse a comma-separated list of record positions.
///
/// Empty pieces and zeros are dropped and repeats keep their first
/// occurrence. Anything but digits and commas is rejected.
pub fn parse_selection(input: &str) -> Result<Vec<usize>> {
    static FORMAT: OnceLock<Regex> = OnceLock::new();
    let format = FORMAT.get_or_init(|| Regex::new(r"^[0-9,]+$").expect("valid selection regex"));

    if !format.is_match(input) {
        return Err(EngineError::InvalidSelection(input.to_string()));
    }

    let mut seen = HashSet::new();
    let mut positions = Vec::new();
    for piece in input.split(',').filter(|piece| !piece.is_empty()) {
        let position: usize = piece
            .parse()
            .map_err(|_| EngineError::InvalidSelection(input.to_string()))?;
        if position > 0 && seen.insert(position) {
            positions.push(position);
        }
    }

    if positions.is_empty() {
        return Err(EngineError::EmptySelection);
    }
    Ok(positions)
}

/// The operations an endpoint layer or the CLI calls
pub struct ImportService {
    archives: ArchiveManager,
    history: Arc<dyn HistoryStore>,
    session: Arc<dyn SessionStore>,
    trigger: Option<Arc<dyn ImportTrigger>>,
    media: Option<MediaDownloader>,
}

impl ImportService {
    pub fn new(
        archives: ArchiveManager,
        history: Arc<dyn HistoryStore>,
        session: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            archives,
            history,
            session,
            trigger: None,
            media: None,
        }
    }

    pub fn with_trigger(mut self, trigger: Arc<dyn ImportTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_media(mut self, media: MediaDownloader) -> Self {
        self.media = Some(media);
        self
    }

    /// Resolve an archive and the listing files it holds
    pub async fn archive_sources(&self, archive_path: &Path) -> Result<(Archive, Vec<PathBuf>)> {
        let archive = self.archives.open(archive_path).await?;
        let files = self.archives.xml_files(&archive.path).await?;
        Ok((archive, files))
    }

    /// Store a feed ZIP in a new dated archive and extract it
    pub async fn import_zip(&self, zip: &[u8]) -> ImportZipResponse {
        info!("Importing feed ZIP ({} bytes)", zip.len());

        match self.archives.import_zip(zip, Utc::now()).await {
            Ok((archive, files)) => ImportZipResponse {
                success: true,
                message: format!("ZIP extracted successfully. Found {} XML files.", files.len()),
                archive_name: archive.name,
                archive_path: archive.path,
                xml_count: files.len(),
                xml_files: files,
            },
            Err(err) => ImportZipResponse::failure(err),
        }
    }

    /// Merge the given listing files into `output` and preview the result
    pub async fn extract_and_merge(&self, sources: &[PathBuf], output: &Path) -> MergeResponse {
        let report = match engine::merge(self.archives.store(), sources, output).await {
            Ok(report) => report,
            Err(err) => {
                let errors = err.file_errors().to_vec();
                let mut response = MergeResponse::failure(&err);
                response.total = sources.len();
                response.error_count = errors.len();
                response.errors = errors;
                return response;
            }
        };

        let records = match self.preview_merged(output).await {
            Ok(preview) => preview.records,
            Err(err) => {
                let mut response = MergeResponse::failure(format!(
                    "Merged XML was written but could not be previewed: {err}"
                ));
                response.processed_count = report.processed_count;
                response.output_file = Some(report.output_file);
                return response;
            }
        };

        if let Err(err) = self.remember_merge(output, records.len()).await {
            return MergeResponse::failure(err);
        }

        MergeResponse {
            success: true,
            message: report.message(),
            total: records.len(),
            properties: records,
            processed_count: report.processed_count,
            error_count: report.error_count,
            errors: report.errors,
            output_file: Some(report.output_file),
        }
    }

    /// Preview an archive: its merged document when present, its loose
    /// listing files otherwise
    pub async fn preview_archive(&self, archive_path: &Path) -> PreviewResponse {
        let archive = match self.archives.open(archive_path).await {
            Ok(archive) => archive,
            Err(err) => return PreviewResponse::failure(err),
        };

        let merged = archive.merged_path();
        let from_merged = self.archives.store().exists(&merged).await;

        let result = if from_merged {
            self.preview_merged(&merged).await.map(|report| {
                let message = format!(
                    "Loaded {} properties from {}.",
                    report.records.len(),
                    MERGED_FILE_NAME
                );
                (report, message)
            })
        } else {
            self.preview_loose(&archive).await
        };

        match result {
            Ok((report, message)) => PreviewResponse {
                success: true,
                message,
                total: report.records.len(),
                properties: report.records,
                from_merged,
                error_count: report.error_count,
                errors: report.errors,
            },
            Err(err) => {
                let errors = err.file_errors().to_vec();
                let mut response = PreviewResponse::failure(err);
                response.from_merged = from_merged;
                response.error_count = errors.len();
                response.errors = errors;
                response
            }
        }
    }

    /// Validate and persist the operator's selected record positions
    pub async fn save_selection(&self, input: &str) -> SelectionResponse {
        let positions = match parse_selection(input) {
            Ok(positions) => positions,
            Err(err) => return SelectionResponse::failure(err),
        };

        if let Err(err) = self.session.save_selection(positions.clone()).await {
            return SelectionResponse::failure(err);
        }

        info!("Saved selection of {} properties", positions.len());
        SelectionResponse {
            success: true,
            message: format!("Selection saved: {} properties.", positions.len()),
            count: positions.len(),
            positions,
        }
    }

    /// Re-extract the archive's stored ZIP and rebuild `properties.xml`
    pub async fn regenerate(&self, archive_path: &Path) -> RegenerateResponse {
        match self.regenerate_archive(archive_path).await {
            Ok((xml_count, records)) => RegenerateResponse {
                success: true,
                message: format!(
                    "Regenerated {} with {} properties from {} XML files.",
                    MERGED_FILE_NAME,
                    records.len(),
                    xml_count
                ),
                xml_count,
                total: records.len(),
                properties: records,
            },
            Err(err) => RegenerateResponse::failure(err),
        }
    }

    async fn regenerate_archive(&self, archive_path: &Path) -> Result<(usize, Vec<PreviewRecord>)> {
        let archive = self.archives.open(archive_path).await?;
        let zip_path = archive.zip_path();
        if !self.archives.store().exists(&zip_path).await {
            return Err(EngineError::ArchiveNotFound(zip_path));
        }

        info!("Regenerating {}", archive.name);
        let files = self.archives.extract_zip(&archive).await?;
        let merged = archive.merged_path();
        engine::merge(self.archives.store(), &files, &merged).await?;

        let preview = self.preview_merged(&merged).await?;
        self.remember_merge(&merged, preview.records.len()).await?;
        Ok((files.len(), preview.records))
    }

    pub async fn list_archives(&self) -> ArchivesResponse {
        match self.archives.list().await {
            Ok(archives) => ArchivesResponse {
                success: true,
                message: format!("Found {} archives.", archives.len()),
                archives,
            },
            Err(err) => ArchivesResponse::failure(err),
        }
    }

    pub async fn delete_archive(&self, archive_path: &Path) -> StatusResponse {
        match self.archives.delete(archive_path).await {
            Ok(()) => StatusResponse {
                success: true,
                message: "Archive deleted successfully.".to_string(),
            },
            Err(err) => StatusResponse::failure(err),
        }
    }

    /// Record the selected records of the current preview as imported.
    ///
    /// This is the only writer of import history. With no selection every
    /// previewed record counts as imported.
    pub async fn confirm_import(&self, stats: ImportStats) -> ConfirmResponse {
        match self.record_history(&stats).await {
            Ok(recorded) => ConfirmResponse {
                success: true,
                message: format!("Recorded import of {recorded} properties."),
                recorded,
                stats,
            },
            Err(err) => ConfirmResponse::failure(err),
        }
    }

    async fn record_history(&self, stats: &ImportStats) -> Result<usize> {
        let preview = self.session.preview().await?;
        if preview.is_empty() {
            return Err(EngineError::EmptySelection);
        }

        let selection = self.session.selection().await?;
        let imported_at = Utc::now();
        let entries: Vec<(HistoryEntry, FieldSnapshot)> = preview
            .iter()
            .filter(|record| selection.is_empty() || selection.contains(&record.position))
            .filter(|record| record.property_id != NOT_AVAILABLE)
            .map(|record| (HistoryEntry::from_record(record, imported_at), record.snapshot()))
            .collect();

        let recorded = entries.len();
        self.history.record_import(entries).await?;
        self.session.save_import_stats(stats.clone()).await?;
        info!(
            "Import confirmed: {} recorded, {} created, {} updated, {} skipped",
            recorded, stats.created, stats.updated, stats.skipped
        );
        Ok(recorded)
    }

    /// Kick off the external import pipeline
    pub async fn trigger_import(&self) -> TriggerResponse {
        let Some(trigger) = &self.trigger else {
            return TriggerResponse::failure("Import trigger URLs are not configured.");
        };

        match trigger.trigger().await {
            Ok(outcome) => TriggerResponse {
                success: true,
                message: format!("{} started.", trigger.pipeline_name()),
                processing_response: outcome.processing_response,
            },
            Err(err) => TriggerResponse::failure(format!("Failed to trigger import: {err:#}")),
        }
    }

    /// Download the attachment images of the given listing files
    pub async fn download_media(&self, sources: &[PathBuf]) -> MediaResponse {
        let Some(media) = &self.media else {
            return MediaResponse::failure("Media downloads are not configured.");
        };
        if sources.is_empty() {
            return MediaResponse::failure(EngineError::EmptySelection);
        }

        let report = media.download(self.archives.store(), sources).await;
        MediaResponse {
            success: report.failed_count == 0,
            message: report.message(),
            downloaded_count: report.downloaded_count,
            failed_count: report.failed_count,
            errors: report.errors,
        }
    }

    /// Current session state: last merge, selection and last import counts
    pub async fn status(&self) -> SessionStatusResponse {
        match self.session_status().await {
            Ok(response) => response,
            Err(err) => SessionStatusResponse::failure(err),
        }
    }

    async fn session_status(&self) -> Result<SessionStatusResponse> {
        let properties_info = self.session.properties_info().await?;
        let selected_count = self.session.selection().await?.len();
        let last_import_stats = self.session.last_import_stats().await?;

        let message = match &properties_info {
            Some(info) => format!(
                "{} properties merged into {} at {}.",
                info.total_properties,
                info.archive_name,
                info.created_at.format("%d-%m-%Y %H:%M:%S")
            ),
            None => "No merged properties yet.".to_string(),
        };

        Ok(SessionStatusResponse {
            success: true,
            message,
            archive_root: self.archives.root().to_path_buf(),
            media_dir: self.media.as_ref().map(|media| media.media_dir().to_path_buf()),
            properties_info,
            selected_count,
            last_import_stats,
        })
    }

    async fn preview_merged(&self, merged: &Path) -> Result<PreviewReport> {
        let mut report = engine::preview_from_merged(self.archives.store(), merged).await?;
        self.annotate(&mut report.records).await?;
        self.session.save_preview(report.records.clone()).await?;
        Ok(report)
    }

    async fn preview_loose(&self, archive: &Archive) -> Result<(PreviewReport, String)> {
        let files = self.archives.xml_files(&archive.path).await?;
        let mut report = engine::preview_from_sources(self.archives.store(), &files).await?;
        self.annotate(&mut report.records).await?;
        self.session.save_preview(report.records.clone()).await?;
        let message = report.message();
        Ok((report, message))
    }

    async fn annotate(&self, records: &mut [PreviewRecord]) -> Result<()> {
        let history = self.history.history().await?;
        annotate_updates(records, &history);
        let details = self.history.history_details().await?;
        diff_fields(records, &details);
        Ok(())
    }

    async fn remember_merge(&self, output: &Path, total_properties: usize) -> Result<()> {
        let archive_path = output.parent().map(Path::to_path_buf).unwrap_or_default();
        let archive_name = archive_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.session
            .save_properties_info(PropertiesInfo {
                total_properties,
                created_at: Utc::now(),
                archive_name,
                archive_path,
                output_file: output.to_path_buf(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{MemoryArchiveStore, StateStore};
    use crate::trigger::TriggerOutcome;
    use async_trait::async_trait;

    const ROOT: &str = "/archives";
    const ARCHIVE: &str = "/archives/01-01-2024_10-00-00";

    fn listing(id: &str, price: &str, modified: &str) -> String {
        format!(
            "<RealEstateProperty><PropertyInfo><PublicReferenceNumber>{id}</PublicReferenceNumber>\
             <ModificationDateTime>{modified}</ModificationDateTime></PropertyInfo>\
             <Location><Address><CityName><Translation>Utrecht</Translation></CityName></Address></Location>\
             <Financials><PurchasePrice>{price}</PurchasePrice></Financials></RealEstateProperty>"
        )
    }

    fn service(store: MemoryArchiveStore) -> (ImportService, Arc<StateStore>) {
        let state = Arc::new(StateStore::in_memory());
        let archives = ArchiveManager::new(Arc::new(store), ROOT);
        let service = ImportService::new(archives, state.clone(), state.clone());
        (service, state)
    }

    fn seeded() -> MemoryArchiveStore {
        MemoryArchiveStore::new()
            .with_file(format!("{ARCHIVE}/a.xml"), listing("A", "100000", "2024-01-01"))
            .with_file(format!("{ARCHIVE}/b.xml"), listing("B", "200000", "2024-01-01"))
    }

    fn sources() -> Vec<PathBuf> {
        vec![
            PathBuf::from(format!("{ARCHIVE}/a.xml")),
            PathBuf::from(format!("{ARCHIVE}/b.xml")),
        ]
    }

    #[test]
    fn selection_parsing() {
        assert_eq!(parse_selection("3,1,3,,2").unwrap(), vec![3, 1, 2]);
        assert_eq!(parse_selection("0,4,0").unwrap(), vec![4]);
        assert!(matches!(
            parse_selection("1, 2"),
            Err(EngineError::InvalidSelection(_))
        ));
        assert!(matches!(
            parse_selection("-1"),
            Err(EngineError::InvalidSelection(_))
        ));
        assert!(matches!(parse_selection(""), Err(EngineError::InvalidSelection(_))));
        assert!(matches!(parse_selection(",,0"), Err(EngineError::EmptySelection)));
    }

    #[tokio::test]
    async fn merge_response_carries_preview_and_stores_snapshot() {
        let (service, state) = service(seeded());
        let output = PathBuf::from(format!("{ARCHIVE}/{MERGED_FILE_NAME}"));

        let response = service.extract_and_merge(&sources(), &output).await;
        assert!(response.success, "{}", response.message);
        assert_eq!(response.total, 2);
        assert_eq!(response.processed_count, 2);
        assert_eq!(
            response.message,
            "Successfully merged 2 of 2 selected properties."
        );

        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.preview.len(), 2);
        let info = snapshot.properties_info.unwrap();
        assert_eq!(info.total_properties, 2);
        assert_eq!(info.archive_name, "01-01-2024_10-00-00");
    }

    #[tokio::test]
    async fn empty_merge_is_a_failed_response() {
        let (service, _) = service(seeded());
        let response = service
            .extract_and_merge(&[], Path::new("/archives/x/properties.xml"))
            .await;
        assert!(!response.success);
        assert!(response.message.contains("No properties selected"));
    }

    #[tokio::test]
    async fn preview_prefers_merged_document() {
        let (service, _) = service(seeded());

        let loose = service.preview_archive(Path::new(ARCHIVE)).await;
        assert!(loose.success);
        assert!(!loose.from_merged);
        assert_eq!(loose.message, "Found 2 valid properties out of 2 XML files.");

        let output = PathBuf::from(format!("{ARCHIVE}/{MERGED_FILE_NAME}"));
        service.extract_and_merge(&sources()[..1], &output).await;

        let merged = service.preview_archive(Path::new(ARCHIVE)).await;
        assert!(merged.from_merged);
        assert_eq!(merged.total, 1);
        assert_eq!(merged.message, "Loaded 1 properties from properties.xml.");
    }

    #[tokio::test]
    async fn preview_rejects_paths_outside_root() {
        let (service, _) = service(seeded());
        let response = service.preview_archive(Path::new("/etc")).await;
        assert!(!response.success);
        assert!(response.message.starts_with("Invalid archive path"));
    }

    #[tokio::test]
    async fn confirm_records_selected_records_only() {
        let (service, state) = service(seeded());
        service.preview_archive(Path::new(ARCHIVE)).await;
        assert!(service.save_selection("2").await.success);

        let response = service
            .confirm_import(ImportStats {
                count: 1,
                imported: 1,
                created: 1,
                ..Default::default()
            })
            .await;
        assert!(response.success);
        assert_eq!(response.recorded, 1);

        let snapshot = state.snapshot().await;
        assert!(snapshot.history.contains_key("B"));
        assert!(!snapshot.history.contains_key("A"));
        assert_eq!(snapshot.last_import_stats.unwrap().created, 1);
    }

    #[tokio::test]
    async fn status_reports_merge_selection_and_stats() {
        let (service, _) = service(seeded());
        let empty = service.status().await;
        assert!(empty.success);
        assert_eq!(empty.message, "No merged properties yet.");
        assert_eq!(empty.archive_root, PathBuf::from(ROOT));
        assert!(empty.media_dir.is_none());

        let output = PathBuf::from(format!("{ARCHIVE}/{MERGED_FILE_NAME}"));
        service.extract_and_merge(&sources(), &output).await;
        service.save_selection("1").await;
        service
            .confirm_import(ImportStats {
                count: 1,
                updated: 1,
                ..Default::default()
            })
            .await;

        let service = service.with_media(
            MediaDownloader::new("/media", std::time::Duration::from_secs(1)).unwrap(),
        );
        let status = service.status().await;
        assert!(status.message.starts_with("2 properties merged into 01-01-2024_10-00-00"));
        assert_eq!(status.selected_count, 1);
        assert_eq!(status.last_import_stats.unwrap().updated, 1);
        assert_eq!(status.media_dir, Some(PathBuf::from("/media")));
    }

    #[tokio::test]
    async fn confirm_without_preview_fails() {
        let (service, _) = service(seeded());
        let response = service.confirm_import(ImportStats::default()).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn regenerate_needs_stored_zip() {
        let (service, _) = service(seeded());
        let response = service.regenerate(Path::new(ARCHIVE)).await;
        assert!(!response.success);
        assert!(response.message.contains("properties.zip"));
    }

    struct FakeTrigger {
        fail: bool,
    }

    #[async_trait]
    impl ImportTrigger for FakeTrigger {
        async fn trigger(&self) -> anyhow::Result<TriggerOutcome> {
            if self.fail {
                anyhow::bail!("trigger URL returned status: 500");
            }
            Ok(TriggerOutcome {
                processing_response: "processing".to_string(),
            })
        }

        fn pipeline_name(&self) -> &'static str {
            "Fake pipeline"
        }
    }

    #[tokio::test]
    async fn trigger_outcomes() {
        let (unconfigured, _) = service(seeded());
        assert!(!unconfigured.trigger_import().await.success);

        let (ok, _) = service(seeded());
        let ok = ok.with_trigger(Arc::new(FakeTrigger { fail: false }));
        let response = ok.trigger_import().await;
        assert!(response.success);
        assert_eq!(response.processing_response, "processing");
        assert_eq!(response.message, "Fake pipeline started.");

        let (failing, _) = service(seeded());
        let failing = failing.with_trigger(Arc::new(FakeTrigger { fail: true }));
        let response = failing.trigger_import().await;
        assert!(!response.success);
        assert!(response.message.contains("500"));
    }
}
