use anyhow::{bail, Result};

use crate::config::FaceprintConfig;

/// Delete one enrolled face by key, or every face of an owner.
pub fn delete(config: &FaceprintConfig, identity_key: Option<&str>, owner_id: Option<&str>) -> Result<()> {
    let (engine, _) = super::open_engine(config)?;
    match (identity_key, owner_id) {
        (Some(key), None) => {
            if engine.delete(key)? {
                println!("Deleted {key}");
            } else {
                println!("No face enrolled under {key}");
            }
        }
        (None, Some(owner)) => {
            let n = engine.delete_owner(owner)?;
            println!("Deleted {n} face(s) for owner {owner}");
        }
        _ => bail!("provide exactly one of <KEY> or --owner"),
    }
    Ok(())
}
