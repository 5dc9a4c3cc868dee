//! Vector math over face embeddings and the external detector capability.
//!
//! Every comparison in the crate goes through [`similarity`], so the indexed search
//! and the linear-scan reference produce bit-identical scores for the same inputs.

pub mod detector;

use ndarray::ArrayView1;

use crate::error::{EngineError, EngineResult};

pub use detector::{BoundingBox, DetectedFace, Detector};

/// Norms below this are treated as "no embedding".
pub const MIN_NORM: f32 = 1e-6;

/// Allowed deviation of a stored vector's norm from 1.0 before it is healed on load.
pub const NORM_TOLERANCE: f32 = 0.01;

/// L2 norm of `v`.
///
/// Components are scaled by the largest magnitude before squaring, so finite
/// vectors with very large components keep a finite norm.
pub fn l2_norm(v: &[f32]) -> f32 {
    let view = ArrayView1::from(v);
    let scale = view.fold(0.0f32, |m, x| m.max(x.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return scale;
    }
    let scaled = view.mapv(|x| x / scale);
    scale * scaled.dot(&scaled).sqrt()
}

/// Divide `v` by its L2 norm.
///
/// Fails with [`EngineError::DegenerateVector`] when the norm is ~0 or any component
/// is not finite.
pub fn normalize(v: &[f32]) -> EngineResult<Vec<f32>> {
    if !v.iter().all(|x| x.is_finite()) {
        return Err(EngineError::DegenerateVector);
    }
    let norm = l2_norm(v);
    if !norm.is_finite() || norm < MIN_NORM {
        return Err(EngineError::DegenerateVector);
    }
    Ok(v.iter().map(|x| x / norm).collect())
}

/// Whether `v` already has unit length within [`NORM_TOLERANCE`].
pub fn is_unit(v: &[f32]) -> bool {
    (l2_norm(v) - 1.0).abs() <= NORM_TOLERANCE
}

/// Inner-product similarity of two unit vectors, clamped to `[0, 1]`.
///
/// Clamping absorbs floating-point overshoot past 1.0 and folds anti-correlated
/// faces to zero.
pub fn similarity(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.dot(&b).clamp(0.0, 1.0)
}
