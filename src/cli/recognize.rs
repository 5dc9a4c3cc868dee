use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::FaceprintConfig;
use crate::embedding::DetectedFace;
use crate::service::{FaceService, ServiceSettings};

/// Recognize one embedding read from a JSON array file and print the decision.
pub async fn recognize(config: &FaceprintConfig, embedding_path: &Path) -> Result<()> {
    let embedding: Vec<f32> = super::read_json(embedding_path)?;
    let (engine, _) = super::open_engine(config)?;
    let service = FaceService::new(Arc::new(engine), ServiceSettings::from(config));

    let decision = service
        .recognize_embedding(DetectedFace::from_embedding(embedding))
        .await
        .context("recognition failed")?;

    if decision.recognized {
        println!(
            "Recognized: {} ({}) confidence {:.4}",
            decision.display_name.as_deref().unwrap_or("?"),
            decision.identity_key.as_deref().unwrap_or("?"),
            decision.match_confidence
        );
        match &decision.person {
            Some(p) => println!("Owner:      {} ({})", p.full_name(), p.owner_id),
            None => println!(
                "Owner:      {} (not in directory or inactive)",
                decision.owner_id.as_deref().unwrap_or("?")
            ),
        }
    } else {
        println!("Not recognized ({:?})", decision.rejection);
    }
    Ok(())
}
