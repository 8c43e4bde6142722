//! Answers remembered across turns, matched by query similarity

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query: String,
    pub answer: String,
    pub timestamp: DateTime<Local>,
}

/// Persisted list of answered queries
pub struct AnswerHistory {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
}

impl AnswerHistory {
    /// Empty history backed by `path`; nothing is read
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: Vec::new(),
        }
    }

    /// Load from `path`. A missing or corrupt file yields an empty history.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let mut history = Self::new(path);
        if !history.path.exists() {
            return history;
        }

        match tokio::fs::read_to_string(&history.path).await {
            Ok(content) => match serde_json::from_str::<Vec<HistoryEntry>>(&content) {
                Ok(entries) => history.entries = entries,
                Err(e) => warn!("[history] failed to parse {:?}: {}", history.path, e),
            },
            Err(e) => warn!("[history] failed to read {:?}: {}", history.path, e),
        }
        history
    }

    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }

    /// Remember an answer and persist immediately
    pub async fn add(&mut self, query: impl Into<String>, answer: impl Into<String>) -> Result<()> {
        let entry = HistoryEntry {
            query: query.into(),
            answer: answer.into(),
            timestamp: Local::now(),
        };
        debug!("[history] saved: {}", crate::preview(&entry.query, 60));
        self.entries.push(entry);
        self.save().await
    }

    /// Best entry whose similarity to `query` is at least `threshold`
    pub fn search_similar(&self, query: &str, threshold: f64) -> Option<(&HistoryEntry, f64)> {
        let mut best: Option<(&HistoryEntry, f64)> = None;
        for entry in &self.entries {
            let score = similarity(query, &entry.query);
            if score >= threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((entry, score));
            }
        }

        if let Some((entry, score)) = best {
            info!(
                "[history] similar query ({:.0}%): {}",
                score * 100.0,
                crate::preview(&entry.query, 60)
            );
        }
        best
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Token-set (Jaccard) similarity of two queries in `0.0..=1.0`
pub fn similarity(a: &str, b: &str) -> f64 {
    let a_tokens = tokens(a);
    let b_tokens = tokens(b);
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0.0;
    }

    let intersection = a_tokens.intersection(&b_tokens).count() as f64;
    let union = a_tokens.union(&b_tokens).count() as f64;
    intersection / union
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
