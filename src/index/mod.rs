//! Exact nearest-neighbour search over the catalogue.
//!
//! A [`SimilarityIndex`] is derived state: a row-major matrix of the catalogue's unit
//! vectors plus the row -> identity key mapping, built from one catalogue snapshot.
//! It is never mutated in place. Every catalogue mutation builds a fresh index
//! (O(n·D)) and the engine publishes it with a pointer swap.
//!
//! [`linear::linear_scan`] is the reference definition of best match. Both paths
//! score with [`embedding::similarity`] and break ties by insertion order, so they
//! return identical `(identity_key, score)` pairs for identical inputs.

pub mod linear;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::catalogue::Catalogue;
use crate::embedding;
use crate::error::{EngineError, EngineResult};

/// Best match returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub identity_key: String,
    /// Clamped cosine similarity in `[0, 1]`.
    pub score: f32,
    /// Row (catalogue insertion position) of the match.
    pub position: usize,
}

/// Which search path the decision logic uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Search the prebuilt matrix.
    Index,
    /// Scan catalogue records directly.
    Linear,
}

impl SearchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Linear => "linear",
        }
    }
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "index" => Ok(Self::Index),
            "linear" => Ok(Self::Linear),
            _ => Err(format!("unknown search strategy: {s}")),
        }
    }
}

/// Immutable inner-product index over unit vectors.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    keys: Vec<String>,
    matrix: Array2<f32>,
}

impl SimilarityIndex {
    /// An index with no rows.
    pub fn empty() -> Self {
        Self {
            keys: Vec::new(),
            matrix: Array2::zeros((0, 0)),
        }
    }

    /// Stack every record's vector into one matrix, rows in insertion order.
    pub fn build(catalogue: &Catalogue) -> EngineResult<Self> {
        let dimension = catalogue.dimension().unwrap_or(0);
        let rows = catalogue.len();

        let mut flat = Vec::with_capacity(rows * dimension);
        let mut keys = Vec::with_capacity(rows);
        for record in catalogue.iter() {
            if record.vector.len() != dimension {
                return Err(EngineError::DimensionMismatch {
                    expected: dimension,
                    actual: record.vector.len(),
                });
            }
            flat.extend_from_slice(&record.vector);
            keys.push(record.identity_key.clone());
        }

        let matrix = Array2::from_shape_vec((rows, dimension), flat).map_err(|_| {
            EngineError::DimensionMismatch {
                expected: dimension,
                actual: 0,
            }
        })?;

        tracing::debug!(rows, dimension, "similarity index built");
        Ok(Self { keys, matrix })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.matrix.ncols()
    }

    /// Identity key stored at `row`.
    pub fn key_at(&self, row: usize) -> Option<&str> {
        self.keys.get(row).map(String::as_str)
    }

    /// Best match for a unit-normalized `query`.
    pub fn search(&self, query: &[f32]) -> EngineResult<Match> {
        if self.is_empty() {
            return Err(EngineError::EmptyIndex);
        }
        if query.len() != self.dimension() {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }

        let query = ArrayView1::from(query);
        let mut best: Option<(usize, f32)> = None;
        for (row, vector) in self.matrix.outer_iter().enumerate() {
            let score = embedding::similarity(vector, query);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((row, score)),
            }
        }

        let (position, score) = best.ok_or(EngineError::EmptyIndex)?;
        Ok(Match {
            identity_key: self.keys[position].clone(),
            score,
            position,
        })
    }
}
