//! CLI `person` commands: maintain the identity directory.

use anyhow::Result;

use crate::config::FaceprintConfig;
use crate::db::{NewPerson, SqliteDirectory};

/// Add a person, or update an existing one.
pub fn add(config: &FaceprintConfig, person: &NewPerson) -> Result<()> {
    let directory = SqliteDirectory::open(config.resolved_db_path())?;
    directory.upsert_person(person)?;
    println!("Saved {} {} ({})", person.first_name, person.last_name, person.owner_id);
    print_cache_note(config);
    Ok(())
}

/// Mark a person inactive so recognition stops reporting their metadata.
pub fn deactivate(config: &FaceprintConfig, owner_id: &str) -> Result<()> {
    let directory = SqliteDirectory::open(config.resolved_db_path())?;
    if directory.deactivate_person(owner_id)? {
        println!("Deactivated {owner_id}");
        print_cache_note(config);
    } else {
        println!("No person with owner ID {owner_id}");
    }
    Ok(())
}

fn print_cache_note(config: &FaceprintConfig) {
    if config.cache.backend != "none" {
        println!(
            "A running server may serve cached metadata for up to {}s.",
            config.cache.ttl_secs
        );
    }
}
