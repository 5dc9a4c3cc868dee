//! Durable, atomic persistence for the catalogue.
//!
//! The catalogue is one JSON document. [`EmbeddingStore::save`] writes a uniquely
//! named staging file in the same directory, fsyncs it, and renames it over the
//! target, so a concurrent reader sees either the old or the new file in full.
//! [`EmbeddingStore::load`] re-checks every vector norm and heals drifted records in
//! memory.
//!
//! Several processes may share one catalogue (a server and CLI invocations).
//! Writers hold [`EmbeddingStore::lock`], an exclusive advisory lock on
//! `<name>.lock`, across load-modify-save.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::{Catalogue, EmbeddingRecord};
use crate::embedding;
use crate::error::{EngineError, EngineResult};

/// On-disk format version written by this binary.
pub const FORMAT_VERSION: u32 = 1;

/// Tracing target for normalization-healing events.
pub const HEAL_TARGET: &str = "faceprint::heal";

#[derive(Serialize)]
struct CatalogueFileRef<'a> {
    version: u32,
    dimension: Option<usize>,
    records: &'a [EmbeddingRecord],
}

#[derive(Deserialize)]
struct CatalogueFile {
    version: u32,
    dimension: Option<usize>,
    records: Vec<EmbeddingRecord>,
}

/// A record whose stored norm drifted from 1.0 and was re-normalized on load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealedRecord {
    pub identity_key: String,
    pub norm: f32,
}

/// What happened while loading the catalogue.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub records: usize,
    /// `false` when no catalogue file existed and an empty catalogue was created.
    pub file_found: bool,
    pub healed: Vec<HealedRecord>,
}

/// Identity of the catalogue file as last observed. Every save renames a fresh file
/// into place, so a write by any process changes the stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
    inode: u64,
}

/// Exclusive cross-process write lock on a catalogue. Released on drop.
#[derive(Debug)]
pub struct WriteLock {
    file: File,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::debug!(error = %e, "failed to release catalogue lock");
        }
    }
}

/// File-backed catalogue persistence.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    path: PathBuf,
}

impl EmbeddingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current stamp of the catalogue file, `None` if it does not exist.
    pub fn stamp(&self) -> Option<FileStamp> {
        let meta = fs::metadata(&self.path).ok()?;
        Some(FileStamp {
            len: meta.len(),
            modified: meta.modified().ok(),
            inode: inode(&meta),
        })
    }

    /// Block until this process holds the catalogue's write lock.
    pub fn lock(&self) -> EngineResult<WriteLock> {
        self.create_parent()?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.sibling("lock"))?;
        fs2::FileExt::lock_exclusive(&file)?;
        Ok(WriteLock { file })
    }

    /// Size of the persisted catalogue in bytes, 0 if it does not exist yet.
    pub fn size_bytes(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Load the catalogue. A missing file yields an empty catalogue.
    ///
    /// Malformed content is [`EngineError::PersistenceCorruption`]; it is never
    /// silently replaced by an empty catalogue.
    pub fn load(&self) -> EngineResult<(Catalogue, LoadReport)> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no catalogue file, starting empty");
                return Ok((Catalogue::new(), LoadReport::default()));
            }
            Err(e) => return Err(e.into()),
        };

        let file: CatalogueFile =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;
        if file.version != FORMAT_VERSION {
            return Err(self.corrupt(format!("unsupported format version {}", file.version)));
        }

        let dimension = file
            .dimension
            .or_else(|| file.records.first().map(|r| r.vector.len()));

        let mut catalogue = Catalogue::new();
        catalogue.set_dimension(dimension);
        let mut report = LoadReport {
            records: 0,
            file_found: true,
            healed: Vec::new(),
        };

        for mut record in file.records {
            if Some(record.vector.len()) != dimension || record.vector.is_empty() {
                return Err(self.corrupt(format!(
                    "record {} has {} components, catalogue dimension is {:?}",
                    record.identity_key,
                    record.vector.len(),
                    dimension
                )));
            }

            if !embedding::is_unit(&record.vector) {
                let norm = embedding::l2_norm(&record.vector);
                record.vector = embedding::normalize(&record.vector).map_err(|_| {
                    self.corrupt(format!(
                        "record {} has a degenerate vector (norm {norm})",
                        record.identity_key
                    ))
                })?;
                tracing::warn!(
                    target: HEAL_TARGET,
                    identity_key = %record.identity_key,
                    norm,
                    "stored embedding was not unit length, re-normalized in memory"
                );
                report.healed.push(HealedRecord {
                    identity_key: record.identity_key.clone(),
                    norm,
                });
            }

            let key = record.identity_key.clone();
            if !catalogue.push_loaded(record) {
                return Err(self.corrupt(format!("duplicate identity key {key}")));
            }
        }

        report.records = catalogue.len();
        tracing::debug!(
            path = %self.path.display(),
            records = report.records,
            healed = report.healed.len(),
            "catalogue loaded"
        );
        Ok((catalogue, report))
    }

    /// Persist `catalogue` by writing a staging file and renaming it into place.
    /// A failed save removes its staging file and leaves the target untouched.
    pub fn save(&self, catalogue: &Catalogue) -> EngineResult<()> {
        self.create_parent()?;

        let doc = CatalogueFileRef {
            version: FORMAT_VERSION,
            dimension: catalogue.dimension(),
            records: catalogue.records(),
        };

        let mut staging = tempfile::Builder::new()
            .prefix(&format!(".{}.", self.file_name()))
            .suffix(".tmp")
            .tempfile_in(self.directory())?;
        {
            let mut writer = BufWriter::new(staging.as_file_mut());
            serde_json::to_writer(&mut writer, &doc)?;
            writer.flush()?;
        }
        staging.as_file().sync_all()?;
        staging.persist(&self.path).map_err(|e| e.error)?;

        sync_parent_directory(&self.path);
        tracing::debug!(
            path = %self.path.display(),
            records = catalogue.len(),
            "catalogue saved"
        );
        Ok(())
    }

    /// Move a corrupt catalogue aside so a fresh one can be written.
    /// Returns the quarantine path.
    pub fn quarantine(&self) -> EngineResult<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
        let target = self.sibling(&format!("corrupt-{stamp}"));
        fs::rename(&self.path, &target)?;
        Ok(target)
    }

    fn create_parent(&self) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "catalogue".into())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        self.path
            .with_file_name(format!("{}.{suffix}", self.file_name()))
    }

    fn corrupt(&self, reason: String) -> EngineError {
        EngineError::PersistenceCorruption {
            path: self.path.clone(),
            reason,
        }
    }
}

#[cfg(unix)]
fn sync_parent_directory(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = File::open(parent).and_then(|d| d.sync_all()) {
            tracing::debug!(error = %e, "failed to fsync catalogue directory");
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_directory(_path: &Path) {}

#[cfg(unix)]
fn inode(meta: &fs::Metadata) -> u64 {
    std::os::unix::fs::MetadataExt::ino(meta)
}

#[cfg(not(unix))]
fn inode(_meta: &fs::Metadata) -> u64 {
    0
}
