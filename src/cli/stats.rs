use anyhow::Result;

use crate::config::FaceprintConfig;

/// Display catalogue statistics in the terminal.
pub fn stats(config: &FaceprintConfig) -> Result<()> {
    let (engine, directory) = super::open_engine(config)?;
    let stats = engine.stats();
    let health = directory.health()?;

    println!("Catalogue Statistics");
    println!("{}", "=".repeat(40));
    println!("  Enrolled faces:      {}", stats.identities);
    match stats.dimension {
        Some(d) => println!("  Vector dimension:    {d}"),
        None => println!("  Vector dimension:    (not established)"),
    }
    println!("  Search mode:         {}", stats.search);
    println!("  Match threshold:     {:.2}", stats.match_threshold);
    println!("  Healed on load:      {}", stats.healed_on_load);
    println!();
    println!("Storage:");
    println!("  Catalogue:           {}", stats.catalogue_path);
    println!("  Catalogue size:      {}", super::format_bytes(stats.catalogue_bytes));
    println!();
    println!("Directory:");
    println!("  People:              {}", health.people_count);
    println!("  Active:              {}", health.active_people);

    Ok(())
}
