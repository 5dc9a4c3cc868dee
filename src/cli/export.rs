use anyhow::Result;
use serde::Serialize;

use crate::catalogue::store::FORMAT_VERSION;
use crate::catalogue::EmbeddingRecord;
use crate::config::FaceprintConfig;

/// Export format: the same document shape as the catalogue file.
#[derive(Debug, Serialize)]
struct ExportData {
    version: u32,
    dimension: Option<usize>,
    records: Vec<EmbeddingRecord>,
}

/// Export every enrolled record as JSON to stdout.
pub fn export(config: &FaceprintConfig) -> Result<()> {
    let (engine, _) = super::open_engine(config)?;
    let snapshot = engine.snapshot();

    let data = ExportData {
        version: FORMAT_VERSION,
        dimension: snapshot.catalogue.dimension(),
        records: snapshot.catalogue.records().to_vec(),
    };

    println!("{}", serde_json::to_string_pretty(&data)?);
    eprintln!("Exported {} record(s)", data.records.len());
    Ok(())
}
