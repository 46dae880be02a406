use crate::engine::merge::file_label;
use crate::stores::ArchiveStore;
use crate::xml::{paths, ListingDocument};
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaReport {
    pub downloaded_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
}

impl MediaReport {
    pub fn message(&self) -> String {
        format!(
            "Downloaded {} images. {} failed.",
            self.downloaded_count, self.failed_count
        )
    }
}

/// Media attachments of one listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPlan {
    pub property_id: String,
    pub urls: Vec<String>,
}

impl MediaPlan {
    /// `None` when the listing has no reference number to file media under
    pub fn from_document(document: &ListingDocument) -> Option<Self> {
        let property_id = document.value(paths::PROPERTY_ID)?;
        Some(Self {
            urls: paths::MEDIA_URL.all(document.root()),
            property_id,
        })
    }
}

/// Keep file names to a portable character set
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() => Some(c),
            '.' | '-' | '_' => Some(c),
            c if c.is_whitespace() => Some('-'),
            _ => None,
        })
        .collect();
    cleaned.trim_start_matches(['.', '-']).to_string()
}

/// Media folder name for a listing, never empty
pub fn property_dir_name(property_id: &str) -> String {
    let name = sanitize_file_name(property_id);
    if name.is_empty() {
        "unnamed-property".to_string()
    } else {
        name
    }
}

/// Local file name for the `index`-th attachment URL
pub fn media_file_name(url: &Url, index: usize) -> String {
    let last_segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let name = sanitize_file_name(last_segment);
    if name.is_empty() {
        format!("image_{index}.jpg")
    } else {
        name
    }
}

/// Downloads listing attachments into `<media_dir>/<property id>/`
pub struct MediaDownloader {
    client: Client,
    media_dir: PathBuf,
}

impl MediaDownloader {
    pub fn new(media_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            media_dir: media_dir.into(),
        })
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    pub async fn download(&self, store: &dyn ArchiveStore, files: &[PathBuf]) -> MediaReport {
        let mut report = MediaReport::default();

        for file in files {
            let plan = match store.read(file).await {
                Ok(bytes) => ListingDocument::parse(&bytes)
                    .ok()
                    .and_then(|doc| MediaPlan::from_document(&doc)),
                Err(err) => {
                    warn!("Unable to read {}: {}", file.display(), err);
                    None
                }
            };
            let Some(plan) = plan else {
                report.failed_count += 1;
                report
                    .errors
                    .push(format!("File {}: no usable listing", file_label(file)));
                continue;
            };

            if plan.urls.is_empty() {
                continue;
            }
            self.download_plan(store, &plan, &mut report).await;
        }

        info!("{}", report.message());
        report
    }

    async fn download_plan(&self, store: &dyn ArchiveStore, plan: &MediaPlan, report: &mut MediaReport) {
        let dir = self.media_dir.join(property_dir_name(&plan.property_id));
        if let Err(err) = store.create_dir_all(&dir).await {
            warn!("Failed to create {}: {}", dir.display(), err);
            report.failed_count += 1;
            report.errors.push(format!(
                "Failed to create media directory for property {}.",
                plan.property_id
            ));
            return;
        }

        for (index, raw_url) in plan.urls.iter().enumerate() {
            let Ok(url) = Url::parse(raw_url) else {
                debug!("Skipping invalid media URL {}", raw_url);
                continue;
            };

            let target = dir.join(media_file_name(&url, index));
            if store.exists(&target).await {
                report.downloaded_count += 1;
                continue;
            }

            match self.fetch(url).await {
                Ok(bytes) => match store.write(&target, &bytes).await {
                    Ok(()) => report.downloaded_count += 1,
                    Err(err) => {
                        report.failed_count += 1;
                        report
                            .errors
                            .push(format!("Failed to save {}: {}", target.display(), err));
                    }
                },
                Err(err) => {
                    report.failed_count += 1;
                    report.errors.push(err);
                }
            }
        }
    }

    async fn fetch(&self, url: Url) -> std::result::Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|_| format!("Failed to download image from {url}"))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(format!("HTTP error {} downloading {}", status.as_u16(), url));
        }

        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|_| format!("Failed to download image from {url}"))
    }
}
