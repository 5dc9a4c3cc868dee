pub mod delete;
pub mod doctor;
pub mod enroll;
pub mod export;
pub mod import;
pub mod list;
pub mod person;
pub mod recognize;
pub mod stats;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

use crate::config::FaceprintConfig;
use crate::db::SqliteDirectory;
use crate::engine::RecognitionEngine;

/// Open the identity directory and the recognition engine for a one-shot command.
fn open_engine(config: &FaceprintConfig) -> Result<(RecognitionEngine, Arc<SqliteDirectory>)> {
    let directory = Arc::new(SqliteDirectory::open(config.resolved_db_path())?);
    let engine = RecognitionEngine::open(config, directory.clone())?;
    Ok((engine, directory))
}

/// Read and parse a JSON input file.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("failed to parse JSON in {}", path.display()))
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
