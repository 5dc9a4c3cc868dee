//! The recognition engine: catalogue, index, persistence, and metadata cache behind
//! one handle.
//!
//! Readers take an `Arc<Snapshot>` under a short read lock and work on it without
//! further locking. Writers are serialized by `writer` within the process and by the
//! catalogue's file lock across processes. Each mutation re-reads the file, applies
//! the change, builds the index, persists, and only then publishes the new snapshot.
//! A failed write leaves the published snapshot and the file on disk untouched.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::cache::{self, CacheStats, IdentitySource, MetadataCache};
use crate::catalogue::store::{EmbeddingStore, FileStamp, LoadReport};
use crate::catalogue::{Catalogue, EmbeddingRecord, IdentityMetadata, UpsertKind};
use crate::config::FaceprintConfig;
use crate::db::Person;
use crate::embedding::DetectedFace;
use crate::enrollment::{self, EnrollmentPolicy, EnrollmentRequest};
use crate::error::{EngineError, EngineResult};
use crate::index::{SearchStrategy, SimilarityIndex};
use crate::recognition::{self, Decision};

/// Decision and enrollment parameters.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub match_threshold: f32,
    pub strategy: SearchStrategy,
    pub policy: EnrollmentPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            match_threshold: 0.6,
            strategy: SearchStrategy::Index,
            policy: EnrollmentPolicy::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &FaceprintConfig) -> Result<Self> {
        Ok(Self {
            match_threshold: config.recognition.match_threshold,
            strategy: config.search_strategy()?,
            policy: EnrollmentPolicy::from(&config.enrollment),
        })
    }
}

/// An immutable view of the catalogue and the index built from it.
#[derive(Debug)]
pub struct Snapshot {
    pub catalogue: Catalogue,
    pub index: SimilarityIndex,
    /// Incremented on every published write.
    pub generation: u64,
}

/// Result of a successful enrollment.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollOutcome {
    pub identity_key: String,
    pub kind: UpsertKind,
    pub samples_used: usize,
    pub samples_rejected: usize,
    pub low_sample_count: bool,
    pub generation: u64,
}

/// Listing entry without the vector.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub identity_key: String,
    pub owner_id: String,
    pub display_name: String,
    pub enrollment_id: String,
    pub enrolled_at: String,
    pub sample_count: usize,
}

impl From<&EmbeddingRecord> for RecordSummary {
    fn from(r: &EmbeddingRecord) -> Self {
        Self {
            identity_key: r.identity_key.clone(),
            owner_id: r.owner_id.clone(),
            display_name: r.display_name.clone(),
            enrollment_id: r.enrollment_id.clone(),
            enrolled_at: r.enrolled_at.clone(),
            sample_count: r.sample_count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogueStats {
    pub identities: usize,
    pub dimension: Option<usize>,
    pub generation: u64,
    pub catalogue_path: String,
    pub catalogue_bytes: u64,
    /// Records re-normalized during the last load.
    pub healed_on_load: usize,
    pub search: SearchStrategy,
    pub match_threshold: f32,
    pub cache: CacheStats,
}

/// Counts from a bulk import.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub replaced: usize,
}

pub struct RecognitionEngine {
    store: EmbeddingStore,
    snapshot: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
    /// The file as of the last load or save by this engine.
    disk_stamp: Mutex<Option<FileStamp>>,
    cache: MetadataCache,
    settings: EngineSettings,
    healed_on_load: AtomicUsize,
}

impl RecognitionEngine {
    /// Open the engine described by `config`, loading the persisted catalogue.
    ///
    /// With `storage.on_corrupt = "reset"` an unreadable catalogue is moved aside and
    /// the engine starts empty; otherwise corruption fails the open.
    pub fn open(config: &FaceprintConfig, source: Arc<dyn IdentitySource>) -> Result<Self> {
        let settings = EngineSettings::from_config(config)?;
        let backend = cache::create_backend(&config.cache)?;
        let cache = MetadataCache::new(backend, source, Duration::from_secs(config.cache.ttl_secs));
        let store = EmbeddingStore::new(config.resolved_catalogue_path());

        let mut stamp = store.stamp();
        let (catalogue, report) = match store.load() {
            Ok(loaded) => loaded,
            Err(e @ EngineError::PersistenceCorruption { .. })
                if config.storage.on_corrupt == "reset" =>
            {
                let moved = store
                    .quarantine()
                    .context("failed to quarantine corrupt catalogue")?;
                tracing::error!(
                    error = %e,
                    quarantined = %moved.display(),
                    "catalogue is corrupt, starting with an empty catalogue"
                );
                stamp = None;
                (Catalogue::new(), LoadReport::default())
            }
            Err(e) => {
                return Err(e).context("failed to load catalogue (set storage.on_corrupt = \"reset\" to start empty)")
            }
        };

        Self::from_loaded(store, stamp, catalogue, report, cache, settings)
            .context("failed to build similarity index")
    }

    /// Build an engine from explicit parts. Corruption is always an error here.
    pub fn with_parts(
        store: EmbeddingStore,
        cache: MetadataCache,
        settings: EngineSettings,
    ) -> EngineResult<Self> {
        let stamp = store.stamp();
        let (catalogue, report) = store.load()?;
        Self::from_loaded(store, stamp, catalogue, report, cache, settings)
    }

    fn from_loaded(
        store: EmbeddingStore,
        stamp: Option<FileStamp>,
        catalogue: Catalogue,
        report: LoadReport,
        cache: MetadataCache,
        settings: EngineSettings,
    ) -> EngineResult<Self> {
        let index = SimilarityIndex::build(&catalogue)?;
        tracing::info!(
            path = %store.path().display(),
            identities = catalogue.len(),
            healed = report.healed.len(),
            search = %settings.strategy,
            "recognition engine ready"
        );
        Ok(Self {
            store,
            snapshot: RwLock::new(Arc::new(Snapshot {
                catalogue,
                index,
                generation: 0,
            })),
            writer: Mutex::new(()),
            disk_stamp: Mutex::new(stamp),
            cache,
            settings,
            healed_on_load: AtomicUsize::new(report.healed.len()),
        })
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Aggregate `samples` and store the result under `request.identity_key`.
    pub fn enroll(
        &self,
        request: &EnrollmentRequest,
        samples: &[Vec<f32>],
    ) -> EngineResult<EnrollOutcome> {
        let policy = self.settings.policy;
        let ((aggregate, kind), generation) = self.commit(|catalogue| {
            let aggregate = enrollment::aggregate(samples, &policy, catalogue.dimension())?;
            let kind = catalogue.upsert(
                &request.identity_key,
                &aggregate.vector,
                IdentityMetadata {
                    owner_id: request.owner_id.clone(),
                    display_name: request.display_name.clone(),
                    sample_count: aggregate.samples_used,
                },
            )?;
            Ok(((aggregate, kind), true))
        })?;

        tracing::info!(
            identity_key = %request.identity_key,
            owner_id = %request.owner_id,
            samples = aggregate.samples_used,
            kind = ?kind,
            "identity enrolled"
        );
        Ok(EnrollOutcome {
            identity_key: request.identity_key.clone(),
            kind,
            samples_used: aggregate.samples_used,
            samples_rejected: aggregate.samples_rejected,
            low_sample_count: aggregate.low_sample_count,
            generation,
        })
    }

    /// Store an already-aggregated vector.
    pub fn upsert(
        &self,
        identity_key: &str,
        vector: &[f32],
        metadata: IdentityMetadata,
    ) -> EngineResult<UpsertKind> {
        let (kind, _) = self.commit(|catalogue| {
            let kind = catalogue.upsert(identity_key, vector, metadata)?;
            Ok((kind, true))
        })?;
        tracing::debug!(identity_key, kind = ?kind, "vector upserted");
        Ok(kind)
    }

    /// Upsert many records in a single write. Each record keeps its enrollment ID,
    /// timestamp, and sample count; vectors are validated and normalized.
    pub fn import_records(&self, records: Vec<EmbeddingRecord>) -> EngineResult<ImportSummary> {
        let (summary, _) = self.commit(|catalogue| {
            let mut summary = ImportSummary::default();
            for record in records {
                let kind = catalogue.insert_record(record)?;
                match kind {
                    UpsertKind::Inserted => summary.inserted += 1,
                    UpsertKind::Replaced => summary.replaced += 1,
                }
            }
            let changed = summary.inserted + summary.replaced > 0;
            Ok((summary, changed))
        })?;
        tracing::info!(
            inserted = summary.inserted,
            replaced = summary.replaced,
            "records imported"
        );
        Ok(summary)
    }

    /// Remove one identity. Returns `false` if it was not enrolled.
    pub fn delete(&self, identity_key: &str) -> EngineResult<bool> {
        let (removed, _) = self.commit(|catalogue| {
            let removed = catalogue.remove(identity_key).is_some();
            Ok((removed, removed))
        })?;
        if removed {
            tracing::info!(identity_key, "identity deleted");
        }
        Ok(removed)
    }

    /// Remove every identity enrolled for `owner_id`. Returns how many were removed.
    pub fn delete_owner(&self, owner_id: &str) -> EngineResult<usize> {
        let (removed, _) = self.commit(|catalogue| {
            let keys = catalogue.remove_owner(owner_id);
            let changed = !keys.is_empty();
            Ok((keys, changed))
        })?;
        if !removed.is_empty() {
            tracing::info!(owner_id, keys = ?removed, "owner's identities deleted");
        }
        Ok(removed.len())
    }

    /// Decide on one face without touching the metadata cache.
    pub fn decide(&self, face: &DetectedFace) -> EngineResult<Decision> {
        let snapshot = self.snapshot();
        self.decide_in(&snapshot, face)
    }

    /// Decide on one face and attach directory metadata for a match.
    pub fn recognize(&self, face: &DetectedFace) -> EngineResult<Decision> {
        let mut decision = self.decide(face)?;
        self.attach_person(&mut decision);
        Ok(decision)
    }

    /// Recognize several faces against the same snapshot. Each face succeeds or
    /// fails on its own.
    pub fn recognize_batch(&self, faces: &[DetectedFace]) -> Vec<EngineResult<Decision>> {
        let mut results = self.decide_batch(faces);
        for decision in results.iter_mut().flatten() {
            self.attach_person(decision);
        }
        results
    }

    /// Decide several faces against the same snapshot, without metadata.
    pub fn decide_batch(&self, faces: &[DetectedFace]) -> Vec<EngineResult<Decision>> {
        let snapshot = self.snapshot();
        faces
            .iter()
            .map(|face| self.decide_in(&snapshot, face))
            .collect()
    }

    /// Metadata for `owner_id`, read through the cache. Source failures are logged
    /// and reported as `None`.
    pub fn person(&self, owner_id: &str) -> Option<Person> {
        match self.cache.get(owner_id) {
            Ok(person) => person,
            Err(e) => {
                tracing::warn!(owner_id, error = %e, "identity metadata lookup failed");
                None
            }
        }
    }

    pub fn list(&self) -> Vec<String> {
        self.snapshot().catalogue.keys()
    }

    pub fn records(&self) -> Vec<RecordSummary> {
        self.snapshot()
            .catalogue
            .iter()
            .map(RecordSummary::from)
            .collect()
    }

    pub fn get(&self, identity_key: &str) -> Option<EmbeddingRecord> {
        self.snapshot().catalogue.get(identity_key).cloned()
    }

    pub fn stats(&self) -> CatalogueStats {
        let snapshot = self.snapshot();
        CatalogueStats {
            identities: snapshot.catalogue.len(),
            dimension: snapshot.catalogue.dimension(),
            generation: snapshot.generation,
            catalogue_path: self.store.path().display().to_string(),
            catalogue_bytes: self.store.size_bytes(),
            healed_on_load: self.healed_on_load.load(Ordering::Relaxed),
            search: self.settings.strategy,
            match_threshold: self.settings.match_threshold,
            cache: self.cache.stats(),
        }
    }

    /// Re-read the persisted catalogue and publish it. On error the current
    /// snapshot stays published.
    pub fn reload(&self) -> EngineResult<usize> {
        let _guard = self.writer.lock();
        let stamp = self.store.stamp();
        let (catalogue, report) = self.store.load()?;
        let index = SimilarityIndex::build(&catalogue)?;
        let count = catalogue.len();
        let generation = self.snapshot().generation + 1;
        self.healed_on_load
            .store(report.healed.len(), Ordering::Relaxed);
        *self.snapshot.write() = Arc::new(Snapshot {
            catalogue,
            index,
            generation,
        });
        *self.disk_stamp.lock() = stamp;
        tracing::info!(identities = count, generation, "catalogue reloaded");
        Ok(count)
    }

    /// Reload if the catalogue file changed since this engine last loaded or wrote
    /// it, e.g. after a CLI command committed from another process. Returns whether
    /// a reload happened.
    pub fn refresh_if_changed(&self) -> EngineResult<bool> {
        let on_disk = self.store.stamp();
        if on_disk == *self.disk_stamp.lock() {
            return Ok(false);
        }
        tracing::debug!("catalogue file changed on disk");
        self.reload()?;
        Ok(true)
    }

    fn decide_in(&self, snapshot: &Snapshot, face: &DetectedFace) -> EngineResult<Decision> {
        recognition::decide(
            &snapshot.catalogue,
            &snapshot.index,
            self.settings.strategy,
            face,
            self.settings.match_threshold,
        )
    }

    fn attach_person(&self, decision: &mut Decision) {
        if let (true, Some(owner_id)) = (decision.recognized, decision.owner_id.as_deref()) {
            decision.person = self.person(owner_id);
        }
    }

    /// Apply `mutate` to the persisted catalogue and publish the result. The closure
    /// returns its value and whether the catalogue changed; unchanged catalogues are
    /// neither saved nor republished. Returns the value and the resulting generation.
    ///
    /// The file is re-read under the write lock, so commits from other processes
    /// sharing the catalogue are kept rather than overwritten.
    fn commit<T>(
        &self,
        mutate: impl FnOnce(&mut Catalogue) -> EngineResult<(T, bool)>,
    ) -> EngineResult<(T, u64)> {
        let _guard = self.writer.lock();
        let _file_lock = self.store.lock()?;
        let current = self.snapshot();
        let (mut next, _) = self.store.load()?;
        let (value, changed) = mutate(&mut next)?;
        if !changed {
            return Ok((value, current.generation));
        }

        let index = SimilarityIndex::build(&next)?;
        self.store.save(&next)?;
        *self.disk_stamp.lock() = self.store.stamp();
        let generation = current.generation + 1;
        *self.snapshot.write() = Arc::new(Snapshot {
            catalogue: next,
            index,
            generation,
        });
        Ok((value, generation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoopCache;
    use crate::db::{NewPerson, SqliteDirectory};

    fn engine_at(dir: &std::path::Path) -> (RecognitionEngine, Arc<SqliteDirectory>) {
        let directory = Arc::new(SqliteDirectory::new(
            crate::db::open_memory_database().unwrap(),
        ));
        let cache = MetadataCache::new(
            Arc::new(NoopCache),
            directory.clone(),
            Duration::from_secs(60),
        );
        let engine = RecognitionEngine::with_parts(
            EmbeddingStore::new(dir.join("embeddings.json")),
            cache,
            EngineSettings::default(),
        )
        .unwrap();
        (engine, directory)
    }

    fn request(key: &str, owner: &str) -> EnrollmentRequest {
        EnrollmentRequest {
            identity_key: key.into(),
            owner_id: owner.into(),
            display_name: key.to_uppercase(),
        }
    }

    #[test]
    fn enroll_publishes_new_generation() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = engine_at(tmp.path());
        assert_eq!(engine.snapshot().generation, 0);

        let out = engine
            .enroll(&request("alice", "E1"), &vec![vec![1.0, 0.0, 0.0]; 6])
            .unwrap();
        assert_eq!(out.kind, UpsertKind::Inserted);
        assert_eq!(out.generation, 1);
        assert!(out.low_sample_count);
        assert_eq!(engine.list(), vec!["alice".to_string()]);
        assert_eq!(engine.get("alice").unwrap().sample_count, 6);
    }

    #[test]
    fn failed_enroll_changes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = engine_at(tmp.path());
        let err = engine
            .enroll(&request("alice", "E1"), &vec![vec![1.0, 0.0]; 2])
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientSamples { .. }));
        assert_eq!(engine.snapshot().generation, 0);
        assert!(!tmp.path().join("embeddings.json").exists());
    }

    #[test]
    fn missing_delete_does_not_bump_generation() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = engine_at(tmp.path());
        assert!(!engine.delete("nobody").unwrap());
        assert_eq!(engine.snapshot().generation, 0);
    }

    #[test]
    fn recognize_attaches_active_person() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, directory) = engine_at(tmp.path());
        directory
            .upsert_person(&NewPerson {
                owner_id: "E1".into(),
                first_name: "Alice".into(),
                last_name: "Liddell".into(),
                ..Default::default()
            })
            .unwrap();
        engine
            .upsert(
                "alice",
                &[0.0, 1.0],
                IdentityMetadata {
                    owner_id: "E1".into(),
                    display_name: "Alice".into(),
                    sample_count: 10,
                },
            )
            .unwrap();

        let face = DetectedFace::from_embedding(vec![0.0, 3.0]);
        let decision = engine.recognize(&face).unwrap();
        assert!(decision.recognized);
        assert_eq!(decision.person.unwrap().full_name(), "Alice Liddell");

        // decide never consults the directory
        assert!(engine.decide(&face).unwrap().person.is_none());

        directory.deactivate_person("E1").unwrap();
        let decision = engine.recognize(&face).unwrap();
        assert!(decision.recognized);
        assert!(decision.person.is_none());
    }

    #[test]
    fn batch_reports_errors_per_face() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = engine_at(tmp.path());
        engine
            .upsert(
                "alice",
                &[1.0, 0.0],
                IdentityMetadata {
                    owner_id: "E1".into(),
                    display_name: "Alice".into(),
                    sample_count: 5,
                },
            )
            .unwrap();

        let results = engine.recognize_batch(&[
            DetectedFace::from_embedding(vec![1.0, 0.0]),
            DetectedFace::from_embedding(vec![1.0, 0.0, 0.0]),
        ]);
        assert!(results[0].as_ref().unwrap().recognized);
        assert!(matches!(
            results[1],
            Err(EngineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn delete_owner_removes_all_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = engine_at(tmp.path());
        for (key, owner, v) in [
            ("a1", "E1", [1.0f32, 0.0]),
            ("b1", "E2", [0.0, 1.0]),
            ("a2", "E1", [0.7, 0.7]),
        ] {
            engine
                .upsert(
                    key,
                    &v,
                    IdentityMetadata {
                        owner_id: owner.into(),
                        display_name: key.into(),
                        sample_count: 5,
                    },
                )
                .unwrap();
        }
        assert_eq!(engine.delete_owner("E1").unwrap(), 2);
        assert_eq!(engine.list(), vec!["b1".to_string()]);
        assert_eq!(engine.stats().identities, 1);
    }

    #[test]
    fn published_snapshot_matches_file_after_write() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = engine_at(tmp.path());
        engine
            .enroll(&request("alice", "E1"), &vec![vec![0.0, 2.0, 0.0]; 5])
            .unwrap();

        let (on_disk, _) = EmbeddingStore::new(tmp.path().join("embeddings.json"))
            .load()
            .unwrap();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.catalogue, on_disk);
        assert_eq!(snapshot.index.len(), on_disk.len());
        // the engine's own write is not mistaken for an external one
        assert!(!engine.refresh_if_changed().unwrap());
        assert_eq!(engine.snapshot().generation, 1);
    }
}
