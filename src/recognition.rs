//! Per-face recognition decision.
//!
//! Stateless: normalize the raw embedding, look up the single best match, and accept
//! it iff `score >= threshold`. The second-best candidate is never consulted, and no
//! state is carried between frames.

use serde::Serialize;

use crate::catalogue::Catalogue;
use crate::db::Person;
use crate::embedding::{self, BoundingBox, DetectedFace};
use crate::error::{EngineError, EngineResult};
use crate::index::{linear, SearchStrategy, SimilarityIndex};

/// Why a face was not recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The embedding had ~zero norm; the index was not queried.
    NoEmbedding,
    /// Nothing is enrolled.
    EmptyCatalogue,
    /// The best candidate scored under the threshold.
    BelowThreshold,
}

/// Outcome of recognizing one detected face.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub recognized: bool,
    /// Whether any candidate was found at all, regardless of threshold.
    pub match_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Similarity of the accepted match; 0.0 when rejected.
    pub match_confidence: f32,
    /// Detector confidence for this face.
    pub detection_confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
    /// Directory record for the matched owner, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person: Option<Person>,
}

impl Decision {
    fn rejected(face: &DetectedFace, match_exists: bool, reason: Rejection) -> Self {
        Self {
            recognized: false,
            match_exists,
            identity_key: None,
            owner_id: None,
            display_name: None,
            match_confidence: 0.0,
            detection_confidence: face.confidence,
            bbox: face.bbox,
            rejection: Some(reason),
            person: None,
        }
    }
}

/// Decide whether `face` belongs to an enrolled identity.
///
/// `index` must have been built from `catalogue`. An empty index maps to
/// [`Rejection::EmptyCatalogue`]; a query of the wrong dimension is an error for
/// this request only.
pub fn decide(
    catalogue: &Catalogue,
    index: &SimilarityIndex,
    strategy: SearchStrategy,
    face: &DetectedFace,
    threshold: f32,
) -> EngineResult<Decision> {
    let query = match embedding::normalize(&face.embedding) {
        Ok(q) => q,
        Err(EngineError::DegenerateVector) => {
            return Ok(Decision::rejected(face, false, Rejection::NoEmbedding));
        }
        Err(e) => return Err(e),
    };

    let found = match strategy {
        SearchStrategy::Index => index.search(&query),
        SearchStrategy::Linear => linear::linear_scan(catalogue, &query),
    };
    let best = match found {
        Ok(m) => m,
        Err(EngineError::EmptyIndex) => {
            return Ok(Decision::rejected(face, false, Rejection::EmptyCatalogue));
        }
        Err(e) => return Err(e),
    };

    if best.score < threshold {
        tracing::debug!(
            best = %best.identity_key,
            score = best.score,
            threshold,
            "best candidate below threshold"
        );
        return Ok(Decision::rejected(face, true, Rejection::BelowThreshold));
    }

    let record = catalogue.get(&best.identity_key);
    Ok(Decision {
        recognized: true,
        match_exists: true,
        owner_id: record.map(|r| r.owner_id.clone()),
        display_name: record.map(|r| r.display_name.clone()),
        identity_key: Some(best.identity_key),
        match_confidence: best.score,
        detection_confidence: face.confidence,
        bbox: face.bbox,
        rejection: None,
        person: None,
    })
}
