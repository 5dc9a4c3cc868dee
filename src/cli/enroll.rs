use anyhow::{Context, Result};
use std::path::Path;

use crate::config::FaceprintConfig;
use crate::enrollment::EnrollmentRequest;

/// Enroll a face from a JSON file holding an array of per-frame embeddings.
pub fn enroll(
    config: &FaceprintConfig,
    identity_key: &str,
    owner_id: &str,
    display_name: &str,
    samples_path: &Path,
) -> Result<()> {
    let samples: Vec<Vec<f32>> = super::read_json(samples_path)?;
    let (engine, _) = super::open_engine(config)?;

    let request = EnrollmentRequest {
        identity_key: identity_key.to_string(),
        owner_id: owner_id.to_string(),
        display_name: display_name.to_string(),
    };
    let outcome = engine
        .enroll(&request, &samples)
        .with_context(|| format!("failed to enroll {identity_key}"))?;

    println!(
        "Enrolled {} ({:?}) from {} sample(s), {} rejected",
        outcome.identity_key, outcome.kind, outcome.samples_used, outcome.samples_rejected
    );
    if outcome.low_sample_count {
        println!(
            "Warning: fewer than {} samples; consider re-enrolling with more frames.",
            engine.settings().policy.comfort_samples
        );
    }
    Ok(())
}
