#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use faceprint::cache::{MemoryCache, MetadataCache};
use faceprint::catalogue::store::EmbeddingStore;
use faceprint::catalogue::IdentityMetadata;
use faceprint::db::{self, NewPerson, SqliteDirectory};
use faceprint::engine::{EngineSettings, RecognitionEngine};
use faceprint::enrollment::EnrollmentRequest;
use tempfile::TempDir;

pub const DIM: usize = 128;

/// Deterministic unit embedding with a spike at position `seed`.
/// Distinct seeds are orthogonal.
pub fn spike_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[seed % DIM] = 1.0;
    v
}

/// A raw (unnormalized) sample close to `base`: scaled, with small deterministic
/// noise spread over a few dimensions.
pub fn noisy_sample(base: &[f32], n: usize) -> Vec<f32> {
    let mut v: Vec<f32> = base.iter().map(|x| x * (1.0 + n as f32 * 0.1)).collect();
    for i in 0..3 {
        let pos = (n * 7 + i * 31 + 1) % v.len();
        v[pos] += 0.01 * (i as f32 + 1.0);
    }
    v
}

/// `count` noisy samples around `base`.
pub fn samples_around(base: &[f32], count: usize) -> Vec<Vec<f32>> {
    (0..count).map(|n| noisy_sample(base, n)).collect()
}

/// Unit vector with cosine `cos` to spike 0, tilted toward spike `other`.
pub fn at_cosine(cos: f32, other: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[0] = cos;
    v[other % DIM] = (1.0 - cos * cos).sqrt();
    v
}

pub fn meta(owner_id: &str, display_name: &str) -> IdentityMetadata {
    IdentityMetadata {
        owner_id: owner_id.into(),
        display_name: display_name.into(),
        sample_count: 10,
    }
}

pub fn request(key: &str, owner_id: &str, display_name: &str) -> EnrollmentRequest {
    EnrollmentRequest {
        identity_key: key.into(),
        owner_id: owner_id.into(),
        display_name: display_name.into(),
    }
}

pub fn person(owner_id: &str, first: &str, last: &str) -> NewPerson {
    NewPerson {
        owner_id: owner_id.into(),
        first_name: first.into(),
        last_name: last.into(),
        ..Default::default()
    }
}

/// An engine over a catalogue file in a temp dir and an in-memory directory.
pub struct TestEngine {
    pub tmp: TempDir,
    pub engine: Arc<RecognitionEngine>,
    pub directory: Arc<SqliteDirectory>,
}

impl TestEngine {
    pub fn catalogue_path(&self) -> PathBuf {
        catalogue_path(&self.tmp)
    }

    /// Open a second engine over the same catalogue file.
    pub fn reopen(&self) -> RecognitionEngine {
        open_engine(&self.tmp, self.directory.clone(), EngineSettings::default())
    }
}

pub fn catalogue_path(tmp: &TempDir) -> PathBuf {
    tmp.path().join("embeddings.json")
}

pub fn open_engine(
    tmp: &TempDir,
    directory: Arc<SqliteDirectory>,
    settings: EngineSettings,
) -> RecognitionEngine {
    let cache = MetadataCache::new(
        Arc::new(MemoryCache::new()),
        directory,
        Duration::from_secs(300),
    );
    RecognitionEngine::with_parts(EmbeddingStore::new(catalogue_path(tmp)), cache, settings)
        .unwrap()
}

pub fn test_engine() -> TestEngine {
    test_engine_with(EngineSettings::default())
}

pub fn test_engine_with(settings: EngineSettings) -> TestEngine {
    let tmp = TempDir::new().unwrap();
    let directory = Arc::new(SqliteDirectory::new(db::open_memory_database().unwrap()));
    let engine = Arc::new(open_engine(&tmp, directory.clone(), settings));
    TestEngine {
        tmp,
        engine,
        directory,
    }
}
