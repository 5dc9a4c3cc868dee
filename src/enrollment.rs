//! Enrollment aggregation: many noisy per-frame embeddings in, one unit vector out.
//!
//! Frames whose embedding is empty, non-finite, or ~zero norm are skipped. At least
//! `min_samples` valid frames are required; fewer than `comfort_samples` is accepted
//! with a warning. Valid raw vectors are averaged (sum / count) and the mean is
//! renormalized, so every frame carries equal weight regardless of its magnitude.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::config::EnrollmentConfig;
use crate::embedding;
use crate::error::{EngineError, EngineResult};

/// Sample-count gate for enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentPolicy {
    /// Hard floor; fewer valid samples aborts enrollment.
    pub min_samples: usize,
    /// Soft floor; fewer valid samples logs a warning.
    pub comfort_samples: usize,
    /// Samples beyond this many valid frames are ignored.
    pub max_samples: usize,
}

impl Default for EnrollmentPolicy {
    fn default() -> Self {
        Self {
            min_samples: 5,
            comfort_samples: 10,
            max_samples: 30,
        }
    }
}

impl From<&EnrollmentConfig> for EnrollmentPolicy {
    fn from(config: &EnrollmentConfig) -> Self {
        Self {
            min_samples: config.min_samples,
            comfort_samples: config.comfort_samples,
            max_samples: config.max_samples,
        }
    }
}

/// Who is being enrolled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub identity_key: String,
    pub owner_id: String,
    pub display_name: String,
}

/// The representative vector produced from a batch of samples.
#[derive(Debug, Clone)]
pub struct Aggregate {
    /// Unit-length mean of the accepted samples.
    pub vector: Vec<f32>,
    pub samples_used: usize,
    /// Frames skipped as invalid.
    pub samples_rejected: usize,
    /// Fewer than `comfort_samples` were used.
    pub low_sample_count: bool,
}

/// Aggregate per-frame embeddings into one representative vector.
///
/// `expected_dimension` is the catalogue's established dimension, if any. A sample
/// of a different length means the embeddings come from another model and fails the
/// whole batch with [`EngineError::DimensionMismatch`].
pub fn aggregate(
    samples: &[Vec<f32>],
    policy: &EnrollmentPolicy,
    expected_dimension: Option<usize>,
) -> EngineResult<Aggregate> {
    let dimension = expected_dimension.or_else(|| {
        samples
            .iter()
            .find(|s| !s.is_empty() && is_valid_sample(s))
            .map(|s| s.len())
    });

    let mut sum: Option<Array1<f32>> = None;
    let mut used = 0usize;
    let mut rejected = 0usize;

    for sample in samples {
        if used >= policy.max_samples {
            break;
        }
        if sample.is_empty() || !is_valid_sample(sample) {
            rejected += 1;
            continue;
        }
        if let Some(expected) = dimension {
            if sample.len() != expected {
                return Err(EngineError::DimensionMismatch {
                    expected,
                    actual: sample.len(),
                });
            }
        }

        let view = ArrayView1::from(sample.as_slice());
        match sum.as_mut() {
            Some(acc) => *acc += &view,
            None => sum = Some(view.to_owned()),
        }
        used += 1;
    }

    if used < policy.min_samples {
        tracing::warn!(
            required = policy.min_samples,
            got = used,
            rejected,
            "not enough valid face samples for enrollment"
        );
        return Err(EngineError::InsufficientSamples {
            required: policy.min_samples,
            got: used,
        });
    }

    let low_sample_count = used < policy.comfort_samples;
    if low_sample_count {
        tracing::warn!(
            samples = used,
            comfort = policy.comfort_samples,
            "low number of face samples, enrollment quality may suffer"
        );
    }

    let mut mean = sum.ok_or(EngineError::InsufficientSamples {
        required: policy.min_samples,
        got: 0,
    })?;
    mean /= used as f32;
    let vector = embedding::normalize(&mean.to_vec())?;

    Ok(Aggregate {
        vector,
        samples_used: used,
        samples_rejected: rejected,
        low_sample_count,
    })
}

fn is_valid_sample(sample: &[f32]) -> bool {
    sample.iter().all(|x| x.is_finite()) && embedding::l2_norm(sample) >= embedding::MIN_NORM
}
