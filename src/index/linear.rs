//! Linear-scan reference search.
//!
//! Scans catalogue records directly with the same scoring and tie-break rules as
//! [`SimilarityIndex::search`](super::SimilarityIndex::search). Used when the
//! index is unavailable or when configured with `search = "linear"`.

use ndarray::ArrayView1;

use super::Match;
use crate::catalogue::Catalogue;
use crate::embedding;
use crate::error::{EngineError, EngineResult};

/// Best match for a unit-normalized `query` by scanning every record in order.
pub fn linear_scan(catalogue: &Catalogue, query: &[f32]) -> EngineResult<Match> {
    if catalogue.is_empty() {
        return Err(EngineError::EmptyIndex);
    }
    if let Some(expected) = catalogue.dimension() {
        if query.len() != expected {
            return Err(EngineError::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }
    }

    let query = ArrayView1::from(query);
    let mut best: Option<(usize, f32)> = None;
    for (position, record) in catalogue.iter().enumerate() {
        let score = embedding::similarity(ArrayView1::from(record.vector.as_slice()), query);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((position, score)),
        }
    }

    let (position, score) = best.ok_or(EngineError::EmptyIndex)?;
    Ok(Match {
        identity_key: catalogue.records()[position].identity_key.clone(),
        score,
        position,
    })
}
