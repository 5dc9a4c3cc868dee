//! The embedding catalogue: one representative vector per enrolled identity.
//!
//! [`Catalogue`] is the in-memory ordered mapping `identity_key -> EmbeddingRecord`.
//! Insertion order is the tie-break order for equal similarity scores, and a
//! re-enrolled key keeps its original position. [`store::EmbeddingStore`] persists
//! a catalogue atomically.

pub mod store;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::embedding;
use crate::error::{EngineError, EngineResult};

/// A stored identity. `vector` is unit-length whenever the record is visible to the
/// index or the decision logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub identity_key: String,
    /// Foreign reference into the identity directory (e.g. an employee ID).
    pub owner_id: String,
    pub display_name: String,
    pub vector: Vec<f32>,
    /// UUID v7 assigned at enrollment time.
    pub enrollment_id: String,
    /// RFC 3339 enrollment timestamp.
    pub enrolled_at: String,
    /// Number of per-frame samples that were averaged into `vector`.
    #[serde(default)]
    pub sample_count: usize,
}

/// Identity metadata supplied with a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMetadata {
    pub owner_id: String,
    pub display_name: String,
    #[serde(default)]
    pub sample_count: usize,
}

/// Whether an upsert created a new identity or replaced an existing vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertKind {
    Inserted,
    Replaced,
}

/// Ordered, dimension-checked mapping from identity key to record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalogue {
    records: Vec<EmbeddingRecord>,
    positions: HashMap<String, usize>,
    dimension: Option<usize>,
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Vector dimension fixed by the first insert, if any. It stays fixed after the
    /// last record is deleted so a later enrollment cannot silently switch models.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn get(&self, identity_key: &str) -> Option<&EmbeddingRecord> {
        self.positions
            .get(identity_key)
            .map(|&pos| &self.records[pos])
    }

    pub fn contains(&self, identity_key: &str) -> bool {
        self.positions.contains_key(identity_key)
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &EmbeddingRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    /// Identity keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.records.iter().map(|r| r.identity_key.clone()).collect()
    }

    /// Validate, normalize, and store `vector` under `identity_key`.
    ///
    /// On error the catalogue is unchanged.
    pub fn upsert(
        &mut self,
        identity_key: &str,
        vector: &[f32],
        metadata: IdentityMetadata,
    ) -> EngineResult<UpsertKind> {
        let normalized = self.validate(vector)?;
        self.place(EmbeddingRecord {
            identity_key: identity_key.to_string(),
            owner_id: metadata.owner_id,
            display_name: metadata.display_name,
            vector: normalized,
            enrollment_id: uuid::Uuid::now_v7().to_string(),
            enrolled_at: chrono::Utc::now().to_rfc3339(),
            sample_count: metadata.sample_count,
        })
    }

    /// Store a complete record, keeping its enrollment ID and timestamp. The vector
    /// is validated and normalized like [`Catalogue::upsert`].
    pub fn insert_record(&mut self, mut record: EmbeddingRecord) -> EngineResult<UpsertKind> {
        record.vector = self.validate(&record.vector)?;
        self.place(record)
    }

    fn validate(&self, vector: &[f32]) -> EngineResult<Vec<f32>> {
        if let Some(expected) = self.dimension {
            if vector.len() != expected {
                return Err(EngineError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }
        if vector.is_empty() {
            return Err(EngineError::DegenerateVector);
        }
        embedding::normalize(vector)
    }

    fn place(&mut self, record: EmbeddingRecord) -> EngineResult<UpsertKind> {
        self.dimension.get_or_insert(record.vector.len());
        match self.positions.get(&record.identity_key) {
            Some(&pos) => {
                self.records[pos] = record;
                Ok(UpsertKind::Replaced)
            }
            None => {
                self.positions
                    .insert(record.identity_key.clone(), self.records.len());
                self.records.push(record);
                Ok(UpsertKind::Inserted)
            }
        }
    }

    /// Remove `identity_key`. Returns the removed record, if it existed.
    pub fn remove(&mut self, identity_key: &str) -> Option<EmbeddingRecord> {
        let pos = self.positions.remove(identity_key)?;
        let removed = self.records.remove(pos);
        self.reindex_from(pos);
        Some(removed)
    }

    /// Remove every record belonging to `owner_id`. Returns the removed keys.
    pub fn remove_owner(&mut self, owner_id: &str) -> Vec<String> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| r.owner_id == owner_id);
        self.records = kept;
        self.positions.clear();
        self.reindex_from(0);
        removed.into_iter().map(|r| r.identity_key).collect()
    }

    /// Append an already-validated record, used when loading from disk.
    /// Returns `false` if the key is already present.
    pub(crate) fn push_loaded(&mut self, record: EmbeddingRecord) -> bool {
        if self.positions.contains_key(&record.identity_key) {
            return false;
        }
        self.dimension.get_or_insert(record.vector.len());
        self.positions
            .insert(record.identity_key.clone(), self.records.len());
        self.records.push(record);
        true
    }

    pub(crate) fn set_dimension(&mut self, dimension: Option<usize>) {
        self.dimension = dimension;
    }

    fn reindex_from(&mut self, start: usize) {
        for (pos, record) in self.records.iter().enumerate().skip(start) {
            self.positions.insert(record.identity_key.clone(), pos);
        }
    }
}
