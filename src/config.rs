//! Application configuration
//!
//! Loaded from and persisted to a JSON file inside the data directory.
//! All tuning knobs for face clustering and library indexing live here so
//! deployments can adjust thresholds without rebuilding.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Config schema version
    pub version: u32,

    /// Data directory path
    pub data_dir: PathBuf,

    /// Logging level
    pub log_level: String,

    /// Indexing configuration
    pub index: IndexConfig,

    /// Face clustering configuration
    pub faces: FaceConfig,
}

/// Tuning knobs for the library indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum size in bytes for files accepted by the indexer, 0 means unlimited
    pub originals_limit: i64,

    /// Directory where generated thumbnails are written
    pub thumb_path: PathBuf,

    /// Whether unsupported media is converted before indexing
    pub convert: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            originals_limit: 1000 * 1024 * 1024,
            thumb_path: PathBuf::from("thumbnails"),
            convert: true,
        }
    }
}

/// Thresholds that gate face cluster creation and matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceConfig {
    /// Minimum pixel size for a detected face to seed a new cluster
    pub cluster_min_size: i32,

    /// Minimum detection score for a face to seed a new cluster
    pub cluster_min_score: i32,

    /// Maximum embedding distance for a marker to match a cluster
    pub match_dist: f64,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            cluster_min_size: 160,
            cluster_min_score: 15,
            match_dist: 0.46,
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific data directory
    pub fn load_from(data_dir: &PathBuf) -> Result<Self> {
        let config_path = data_dir.join("facegraph.json");

        if config_path.exists() {
            info!("Loading config from {:?}", config_path);
            let json = fs::read_to_string(&config_path)?;
            let config: AppConfig = serde_json::from_str(&json)?;
            Ok(config)
        } else {
            warn!("No config found, creating default at {:?}", config_path);
            let config = Self::default_with_dir(data_dir.clone());
            config.save()?;
            Ok(config)
        }
    }

    /// Load or create configuration
    pub fn load_or_create(data_dir: &PathBuf) -> Result<Self> {
        Self::load_from(data_dir).or_else(|_| {
            let config = Self::default_with_dir(data_dir.clone());
            config.save()?;
            Ok(config)
        })
    }

    /// Create default configuration with specific data directory
    pub fn default_with_dir(data_dir: PathBuf) -> Self {
        Self {
            version: 1,
            data_dir,
            log_level: "info".to_string(),
            index: IndexConfig::default(),
            faces: FaceConfig::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;

        let config_path = self.data_dir.join("facegraph.json");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, json)?;
        info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Path of the database file inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("facegraph.db")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::default_with_dir(PathBuf::from("."))
    }
}
