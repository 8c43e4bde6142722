//! Session-scoped memory and turn archiving
//!
//! The [`MemoryLedger`] is the append-only record of one turn. Finished
//! turns are archived as [`TurnRecord`]s through a [`TurnStore`], and
//! successful answers are remembered across turns by [`AnswerHistory`].

use thiserror::Error;

pub mod history;
pub mod ledger;
pub mod store;

pub use history::{AnswerHistory, HistoryEntry};
pub use ledger::{preview, MemoryLedger, MemoryRecord, Role};
pub use store::{TurnRecord, TurnStore};

/// Archive errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
