//! The face detector capability consumed by the service layer.
//!
//! How faces are found and embedded is outside this crate. A host plugs in any
//! implementation of [`Detector`]; embeddings from one model instance are
//! comparable by cosine similarity.

use serde::{Deserialize, Serialize};

/// Pixel-space bounding box `(x1, y1) - (x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// One face reported by a detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f32,
    /// Raw (not necessarily normalized) embedding.
    pub embedding: Vec<f32>,
}

impl DetectedFace {
    /// A face known only by its embedding, e.g. one submitted directly by a client.
    pub fn from_embedding(embedding: Vec<f32>) -> Self {
        Self {
            bbox: None,
            confidence: 1.0,
            embedding,
        }
    }
}

/// Trait for turning an encoded image into detected faces.
///
/// Implementations are synchronous and may be slow; the service layer runs them on
/// a blocking worker under a timeout.
pub trait Detector: Send + Sync {
    /// Detect faces in an encoded image, ordered by the detector's preference
    /// (largest or most confident first).
    fn detect(&self, image: &[u8]) -> anyhow::Result<Vec<DetectedFace>>;
}
