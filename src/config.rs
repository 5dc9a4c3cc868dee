use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::index::SearchStrategy;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FaceprintConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub recognition: RecognitionConfig,
    pub enrollment: EnrollmentConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub catalogue_path: String,
    pub db_path: String,
    /// What to do when the persisted catalogue cannot be decoded:
    /// `"refuse"` fails startup, `"reset"` quarantines the file and starts empty.
    pub on_corrupt: String,
    /// How often a running server checks the catalogue file for writes made by
    /// other processes (e.g. the CLI). 0 disables the check.
    pub reload_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RecognitionConfig {
    pub match_threshold: f32,
    pub min_detection_confidence: f32,
    pub max_faces_per_frame: usize,
    pub search: String,
    pub detector_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EnrollmentConfig {
    pub min_samples: usize,
    pub comfort_samples: usize,
    pub max_samples: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: String,
    pub ttl_secs: u64,
    pub fetch_timeout_ms: u64,
}

impl Default for FaceprintConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            recognition: RecognitionConfig::default(),
            enrollment: EnrollmentConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_faceprint_dir();
        Self {
            catalogue_path: dir.join("embeddings.json").to_string_lossy().into_owned(),
            db_path: dir.join("directory.db").to_string_lossy().into_owned(),
            on_corrupt: "refuse".into(),
            reload_interval_secs: 5,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.6,
            min_detection_confidence: 0.65,
            max_faces_per_frame: 1,
            search: "index".into(),
            detector_timeout_ms: 5000,
        }
    }
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            comfort_samples: 10,
            max_samples: 30,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: "memory".into(),
            ttl_secs: 300,
            fetch_timeout_ms: 2000,
        }
    }
}

/// Returns `~/.faceprint/`, or `./.faceprint/` when no home directory is known.
pub fn default_faceprint_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".faceprint")
}

/// Returns the default config file path: `~/.faceprint/config.toml`
pub fn default_config_path() -> PathBuf {
    default_faceprint_dir().join("config.toml")
}

impl FaceprintConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            FaceprintConfig::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (FACEPRINT_CATALOGUE, FACEPRINT_DB,
    /// FACEPRINT_LOG_LEVEL, FACEPRINT_MATCH_THRESHOLD).
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("FACEPRINT_CATALOGUE") {
            self.storage.catalogue_path = val;
        }
        if let Ok(val) = std::env::var("FACEPRINT_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("FACEPRINT_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("FACEPRINT_MATCH_THRESHOLD") {
            self.recognition.match_threshold = val
                .parse()
                .with_context(|| format!("FACEPRINT_MATCH_THRESHOLD is not a number: {val}"))?;
        }
        Ok(())
    }

    /// Reject settings the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        let t = self.recognition.match_threshold;
        if !(0.0..=1.0).contains(&t) {
            bail!("recognition.match_threshold must be within [0, 1], got {t}");
        }
        let d = self.recognition.min_detection_confidence;
        if !(0.0..=1.0).contains(&d) {
            bail!("recognition.min_detection_confidence must be within [0, 1], got {d}");
        }
        self.search_strategy()?;

        let e = &self.enrollment;
        if e.min_samples == 0 {
            bail!("enrollment.min_samples must be at least 1");
        }
        if e.comfort_samples < e.min_samples {
            bail!("enrollment.comfort_samples must be >= min_samples");
        }
        if e.max_samples < e.min_samples {
            bail!("enrollment.max_samples must be >= min_samples");
        }

        match self.storage.on_corrupt.as_str() {
            "refuse" | "reset" => {}
            other => bail!("unknown storage.on_corrupt policy: {other}. Supported: refuse, reset"),
        }
        match self.cache.backend.as_str() {
            "memory" | "none" => {}
            other => bail!("unknown cache backend: {other}. Supported: memory, none"),
        }
        match self.server.transport.as_str() {
            "stdio" | "http" => {}
            other => bail!("unknown transport: {other}. Supported: stdio, http"),
        }
        Ok(())
    }

    pub fn search_strategy(&self) -> Result<SearchStrategy> {
        self.recognition
            .search
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
    }

    /// Resolve the catalogue path, expanding `~` if needed.
    pub fn resolved_catalogue_path(&self) -> PathBuf {
        expand_tilde(&self.storage.catalogue_path)
    }

    /// Resolve the directory database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = FaceprintConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.transport, "stdio");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.recognition.match_threshold, 0.6);
        assert_eq!(config.enrollment.min_samples, 5);
        assert_eq!(config.enrollment.comfort_samples, 10);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.storage.on_corrupt, "refuse");
        assert_eq!(config.storage.reload_interval_secs, 5);
        assert!(config.storage.catalogue_path.ends_with("embeddings.json"));
        assert_eq!(config.search_strategy().unwrap(), SearchStrategy::Index);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
catalogue_path = "/tmp/faces.json"

[recognition]
match_threshold = 0.72
search = "linear"

[enrollment]
min_samples = 8
comfort_samples = 12
"#;
        let config: FaceprintConfig = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.catalogue_path, "/tmp/faces.json");
        assert_eq!(config.recognition.match_threshold, 0.72);
        assert_eq!(config.search_strategy().unwrap(), SearchStrategy::Linear);
        assert_eq!(config.enrollment.min_samples, 8);
        // defaults still apply for unset fields
        assert_eq!(config.enrollment.max_samples, 30);
        assert_eq!(config.cache.backend, "memory");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = FaceprintConfig::default();
        config.recognition.match_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = FaceprintConfig::default();
        config.enrollment.comfort_samples = 2;
        assert!(config.validate().is_err());

        let mut config = FaceprintConfig::default();
        config.recognition.search = "faiss".into();
        assert!(config.validate().is_err());

        let mut config = FaceprintConfig::default();
        config.storage.on_corrupt = "ignore".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = FaceprintConfig::default();
        std::env::set_var("FACEPRINT_CATALOGUE", "/tmp/override.json");
        std::env::set_var("FACEPRINT_DB", "/tmp/override.db");
        std::env::set_var("FACEPRINT_LOG_LEVEL", "trace");
        std::env::set_var("FACEPRINT_MATCH_THRESHOLD", "0.55");

        config.apply_env_overrides().unwrap();

        assert_eq!(config.storage.catalogue_path, "/tmp/override.json");
        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.recognition.match_threshold, 0.55);

        // Clean up
        std::env::remove_var("FACEPRINT_CATALOGUE");
        std::env::remove_var("FACEPRINT_DB");
        std::env::remove_var("FACEPRINT_LOG_LEVEL");
        std::env::remove_var("FACEPRINT_MATCH_THRESHOLD");
    }
}
