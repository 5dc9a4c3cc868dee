//! CLI `doctor` command: check the catalogue file and the directory database and
//! print a health report.

use anyhow::{Context, Result};

use crate::catalogue::store::EmbeddingStore;
use crate::config::FaceprintConfig;
use crate::db;
use crate::error::EngineError;

/// Run diagnostics and print a health report. Never modifies either file.
pub fn doctor(config: &FaceprintConfig) -> Result<()> {
    let catalogue_path = config.resolved_catalogue_path();
    let db_path = config.resolved_db_path();
    let store = EmbeddingStore::new(&catalogue_path);

    println!("faceprint Health Report");
    println!("=======================");
    println!();
    println!("Catalogue:         {}", catalogue_path.display());
    match store.load() {
        Ok((_, report)) if !report.file_found => {
            println!("Status:            not created yet (empty catalogue)");
        }
        Ok((catalogue, report)) => {
            println!("File size:         {}", super::format_bytes(store.size_bytes()));
            println!("Enrolled faces:    {}", catalogue.len());
            if let Some(d) = catalogue.dimension() {
                println!("Vector dimension:  {d}");
            }
            if report.healed.is_empty() {
                println!("Status:            OK");
            } else {
                println!("Status:            OK, {} record(s) re-normalized in memory", report.healed.len());
                for h in &report.healed {
                    println!("  {} (norm {:.4})", h.identity_key, h.norm);
                }
                println!("  Any write will persist the corrected vectors.");
            }
        }
        Err(EngineError::PersistenceCorruption { reason, .. }) => {
            println!("Status:            CORRUPT ({reason})");
            println!();
            println!("Recovery steps:");
            println!("  1. Restore from a backup: faceprint import backup.json");
            println!("  2. Or set storage.on_corrupt = \"reset\" to move the file aside and start empty");
        }
        Err(e) => return Err(e).context("failed to read catalogue"),
    }
    println!();

    println!("Directory:         {}", db_path.display());
    if !db_path.exists() {
        println!("Status:            not found");
        println!("Run `faceprint person add` or `faceprint serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    let conn = db::open_database(&db_path)
        .context("failed to open directory database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("File size:         {}", super::format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("People:            {} ({} active)", report.people_count, report.active_people);
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
    }

    Ok(())
}
