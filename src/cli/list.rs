use anyhow::Result;

use crate::config::FaceprintConfig;

/// Print every enrolled face, in enrollment order.
pub fn list(config: &FaceprintConfig, json: bool) -> Result<()> {
    let (engine, _) = super::open_engine(config)?;
    let records = engine.records();

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No faces enrolled.");
        return Ok(());
    }

    println!("{:<24} {:<12} {:<24} {:>7}  ENROLLED", "KEY", "OWNER", "NAME", "SAMPLES");
    for r in &records {
        println!(
            "{:<24} {:<12} {:<24} {:>7}  {}",
            r.identity_key, r.owner_id, r.display_name, r.sample_count, r.enrolled_at
        );
    }
    println!("\n{} face(s) enrolled", records.len());
    Ok(())
}
