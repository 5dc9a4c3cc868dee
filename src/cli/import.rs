use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::catalogue::store::FORMAT_VERSION;
use crate::catalogue::EmbeddingRecord;
use crate::config::FaceprintConfig;

/// Import format: matches export output.
#[derive(Debug, Deserialize)]
struct ImportData {
    version: u32,
    records: Vec<EmbeddingRecord>,
}

/// Import records from an export file. Existing keys are replaced in place; new
/// keys are appended in file order. All records are written in one commit.
pub fn import(config: &FaceprintConfig, file: &Path) -> Result<()> {
    let data: ImportData = super::read_json(file)?;
    if data.version != FORMAT_VERSION {
        bail!(
            "unsupported export version {} (expected {FORMAT_VERSION})",
            data.version
        );
    }

    let (engine, _) = super::open_engine(config)?;
    println!("Importing {} record(s)...", data.records.len());
    let summary = engine
        .import_records(data.records)
        .context("import failed, catalogue unchanged")?;

    println!(
        "Import complete: {} inserted, {} replaced",
        summary.inserted, summary.replaced
    );
    Ok(())
}
