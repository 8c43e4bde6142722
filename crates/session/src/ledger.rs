//! Append-only memory ledger

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Which side of a step produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Working input consumed by a step
    Input,
    /// Capability output, terminal answer or fault reason produced by a step
    Output,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Input => write!(f, "input"),
            Role::Output => write!(f, "output"),
        }
    }
}

/// One immutable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub timestamp: DateTime<Local>,
    pub role: Role,
    pub text: String,
}

impl MemoryRecord {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            role,
            text: text.into(),
        }
    }

    pub fn input(text: impl Into<String>) -> Self {
        Self::new(Role::Input, text)
    }

    pub fn output(text: impl Into<String>) -> Self {
        Self::new(Role::Output, text)
    }
}

/// Session-scoped sequence of records. `append` is the only mutator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryLedger {
    records: Vec<MemoryRecord>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: MemoryRecord) {
        trace!(
            "[memory] #{} {}: {}",
            self.records.len() + 1,
            record.role,
            preview(&record.text, 80)
        );
        self.records.push(record);
    }

    /// The last `n` records in insertion order
    pub fn recent(&self, n: usize) -> &[MemoryRecord] {
        &self.records[self.records.len().saturating_sub(n)..]
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<MemoryRecord> {
        self.records
    }
}

/// First `max` characters of `text`, for logs
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
