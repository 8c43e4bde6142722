//! Archive of finished turns, one JSON file per session id

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use cortex_config::paths::safe_filename;

use crate::{MemoryRecord, Result};

/// Snapshot of a finished turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub session_id: String,
    pub original_input: String,
    /// `answer`, `budget_exhausted` or `failed`
    pub outcome: String,
    /// User-visible result text
    pub result: String,
    pub steps: u32,
    pub lifelines_used: u32,
    #[serde(default)]
    pub perception_calls: u32,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    #[serde(default)]
    pub records: Vec<MemoryRecord>,
}

/// Persists turn records to a directory
pub struct TurnStore {
    turns_dir: PathBuf,
}

impl TurnStore {
    pub fn new(turns_dir: impl AsRef<Path>) -> Self {
        let turns_dir = turns_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&turns_dir).ok();
        Self { turns_dir }
    }

    pub fn dir(&self) -> &Path {
        &self.turns_dir
    }

    pub async fn save(&self, record: &TurnRecord) -> Result<()> {
        let path = self.turn_path(&record.session_id);
        let content = serde_json::to_string_pretty(record)?;
        tokio::fs::write(path, content).await?;
        debug!("Archived turn: {}", record.session_id);
        Ok(())
    }

    /// Load an archived turn; `None` when absent or unreadable
    pub async fn load(&self, session_id: &str) -> Option<TurnRecord> {
        let path = self.turn_path(session_id);
        if !path.exists() {
            return None;
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<TurnRecord>(&content) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Failed to parse turn {}: {}", session_id, e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read turn {}: {}", session_id, e);
                None
            }
        }
    }

    pub async fn delete(&self, session_id: &str) -> Result<bool> {
        let path = self.turn_path(session_id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Archived session ids, sorted
    pub async fn list(&self) -> Vec<String> {
        let mut ids = Vec::new();

        if let Ok(mut entries) = tokio::fs::read_dir(&self.turns_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(stripped) = name.strip_suffix(".json") {
                        ids.push(stripped.to_string());
                    }
                }
            }
        }

        ids.sort();
        ids
    }

    fn turn_path(&self, session_id: &str) -> PathBuf {
        self.turns_dir
            .join(format!("{}.json", safe_filename(session_id)))
    }
}
