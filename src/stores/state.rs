use super::fs::temp_path;
use super::traits::{HistoryStore, SessionStore};
use crate::error::{EngineError, Result};
use crate::models::{FieldSnapshot, HistoryEntry, ImportStats, PreviewRecord, PropertiesInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Everything persisted between requests
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersistedState {
    pub properties_info: Option<PropertiesInfo>,
    pub preview: Vec<PreviewRecord>,
    pub selection: Vec<usize>,
    pub history: BTreeMap<String, HistoryEntry>,
    pub history_details: BTreeMap<String, FieldSnapshot>,
    pub last_import_stats: Option<ImportStats>,
}

/// JSON-file backed [`HistoryStore`] and [`SessionStore`].
///
/// Without a path it keeps everything in memory, which is what the tests use.
#[derive(Debug)]
pub struct StateStore {
    path: Option<PathBuf>,
    state: Mutex<PersistedState>,
}

impl StateStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(PersistedState::default()),
        }
    }

    /// Load state from `path`, starting empty when the file does not exist yet
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                EngineError::Store(format!("corrupt state file {}: {err}", path.display()))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("No state file at {}, starting fresh", path.display());
                PersistedState::default()
            }
            Err(err) => {
                return Err(EngineError::Store(format!(
                    "unable to read {}: {err}",
                    path.display()
                )))
            }
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    pub async fn snapshot(&self) -> PersistedState {
        self.state.lock().await.clone()
    }

    async fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut PersistedState) + Send,
    {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        apply(&mut next);
        if let Some(path) = &self.path {
            persist(path, &next).await?;
        }
        *state = next;
        Ok(())
    }
}

async fn persist(path: &Path, state: &PersistedState) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(state)
        .map_err(|err| EngineError::Store(format!("unable to encode state: {err}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| EngineError::Store(format!("{}: {err}", parent.display())))?;
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|err| EngineError::Store(format!("{}: {err}", tmp.display())))?;
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(EngineError::Store(format!("{}: {err}", path.display())));
    }

    debug!("Persisted state to {}", path.display());
    Ok(())
}

#[async_trait]
impl HistoryStore for StateStore {
    async fn history(&self) -> Result<BTreeMap<String, HistoryEntry>> {
        Ok(self.state.lock().await.history.clone())
    }

    async fn history_details(&self) -> Result<BTreeMap<String, FieldSnapshot>> {
        Ok(self.state.lock().await.history_details.clone())
    }

    async fn record_import(&self, entries: Vec<(HistoryEntry, FieldSnapshot)>) -> Result<()> {
        self.update(move |state| {
            for (entry, details) in entries {
                state
                    .history_details
                    .insert(entry.property_id.clone(), details);
                state.history.insert(entry.property_id.clone(), entry);
            }
        })
        .await
    }
}

#[async_trait]
impl SessionStore for StateStore {
    async fn properties_info(&self) -> Result<Option<PropertiesInfo>> {
        Ok(self.state.lock().await.properties_info.clone())
    }

    async fn save_properties_info(&self, info: PropertiesInfo) -> Result<()> {
        self.update(move |state| state.properties_info = Some(info)).await
    }

    async fn preview(&self) -> Result<Vec<PreviewRecord>> {
        Ok(self.state.lock().await.preview.clone())
    }

    async fn save_preview(&self, records: Vec<PreviewRecord>) -> Result<()> {
        self.update(move |state| state.preview = records).await
    }

    async fn selection(&self) -> Result<Vec<usize>> {
        Ok(self.state.lock().await.selection.clone())
    }

    async fn save_selection(&self, positions: Vec<usize>) -> Result<()> {
        self.update(move |state| state.selection = positions).await
    }

    async fn last_import_stats(&self) -> Result<Option<ImportStats>> {
        Ok(self.state.lock().await.last_import_stats.clone())
    }

    async fn save_import_stats(&self, stats: ImportStats) -> Result<()> {
        self.update(move |state| state.last_import_stats = Some(stats))
            .await
    }
}
