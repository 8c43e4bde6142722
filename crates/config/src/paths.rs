//! Well-known filesystem locations

use std::path::{Path, PathBuf};

/// Data directory (~/.cortex), or `.cortex` when no home directory is known
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".cortex"))
        .unwrap_or_else(|| PathBuf::from(".cortex"))
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Archived turns, one JSON file per session id
pub fn turns_dir() -> PathBuf {
    data_dir().join("turns")
}

/// Answer history store
pub fn history_path() -> PathBuf {
    data_dir().join("history.json")
}

/// Ensure directory exists
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}

/// Replace characters that are not safe in file names
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect()
}
