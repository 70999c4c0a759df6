//! Configuration module for the content pipeline engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DM_` and use double
//! underscores to separate nested levels:
//! - `DM_CLUSTERING__MAX_ITERATIONS=50` sets `clustering.max_iterations`
//! - `DM_QUEUE__THROTTLE_MS=500` sets `queue.throttle_ms`
//! - `DM_SEARCH__SIMILARITY_THRESHOLD=0.7` sets `search.similarity_threshold`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::queue::QueueOptions;
use crate::vector::PipelineOptions;

/// Workspace marker directory.
const WORKSPACE_DIR: &str = ".draftmill";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .draftmill is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Embedding vector settings
    #[serde(default)]
    pub vector: VectorConfig,

    /// Full clustering run settings
    #[serde(default)]
    pub clustering: ClusteringConfig,

    /// Similarity search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Job queue scheduler settings
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VectorConfig {
    /// Embedding dimension; must match the deployed embedding model
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Path to the centroid set blob
    #[serde(default = "default_centroid_path")]
    pub centroid_path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClusteringConfig {
    /// Corpus entries per derived cluster (K policy)
    #[serde(default = "default_vectors_per_cluster")]
    pub vectors_per_cluster: usize,

    /// Iteration cap for a full run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Wall-clock budget for a full run, in seconds
    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: u64,

    /// Seed for k-means++ initialization
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Nearest clusters drawn per query
    #[serde(default = "default_candidate_clusters")]
    pub candidate_clusters: usize,

    /// Results at or below this cosine similarity are discarded
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Default result limit for the CLI
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueueConfig {
    /// Job bodies dispatched per scheduler cycle
    #[serde(default = "default_max_jobs_per_cycle")]
    pub max_jobs_per_cycle: usize,

    /// Sleep between job bodies within a cycle, in milliseconds
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Cycle lock TTL, in seconds
    #[serde(default = "default_cycle_lock_ttl_secs")]
    pub cycle_lock_ttl_secs: u64,

    /// Per-job lock TTL, in seconds
    #[serde(default = "default_job_lock_ttl_secs")]
    pub job_lock_ttl_secs: u64,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_false() -> bool {
    false
}
fn default_dimension() -> usize {
    crate::vector::EMBEDDING_DIMENSION_1536
}
fn default_centroid_path() -> PathBuf {
    PathBuf::from(".draftmill/centroids.bin")
}
fn default_vectors_per_cluster() -> usize {
    100
}
fn default_max_iterations() -> usize {
    100
}
fn default_time_budget_secs() -> u64 {
    30
}
fn default_seed() -> u64 {
    42
}
fn default_candidate_clusters() -> usize {
    3
}
fn default_similarity_threshold() -> f32 {
    0.8
}
fn default_search_limit() -> usize {
    5
}
fn default_max_jobs_per_cycle() -> usize {
    5
}
fn default_throttle_ms() -> u64 {
    2000
}
fn default_cycle_lock_ttl_secs() -> u64 {
    300
}
fn default_job_lock_ttl_secs() -> u64 {
    120
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            debug: false,
            vector: VectorConfig::default(),
            clustering: ClusteringConfig::default(),
            search: SearchConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            centroid_path: default_centroid_path(),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            vectors_per_cluster: default_vectors_per_cluster(),
            max_iterations: default_max_iterations(),
            time_budget_secs: default_time_budget_secs(),
            seed: default_seed(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            candidate_clusters: default_candidate_clusters(),
            similarity_threshold: default_similarity_threshold(),
            default_limit: default_search_limit(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_jobs_per_cycle: default_max_jobs_per_cycle(),
            throttle_ms: default_throttle_ms(),
            cycle_lock_ttl_secs: default_cycle_lock_ttl_secs(),
            job_lock_ttl_secs: default_job_lock_ttl_secs(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(WORKSPACE_DIR).join("settings.toml"));

        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Layer in environment variables with DM_ prefix
            // Double underscore (__) separates nested levels
            .merge(Env::prefixed("DM_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("DM_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the workspace settings file by walking ancestors for .draftmill
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(WORKSPACE_DIR);
            if config_dir.exists() && config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Get the workspace root directory (where .draftmill is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(WORKSPACE_DIR);
            if config_dir.exists() && config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Initialize the workspace directory and settings file.
    ///
    /// Returns the settings path. Refuses to overwrite an existing file
    /// unless `force` is set.
    pub fn init_workspace(force: bool) -> Result<PathBuf, String> {
        let dir = PathBuf::from(WORKSPACE_DIR);
        let path = dir.join("settings.toml");

        if path.exists() && !force {
            return Err(format!(
                "{} already exists. Use --force to overwrite it.",
                path.display()
            ));
        }

        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("Cannot create {}: {e}", dir.display()))?;

        let defaults = Settings::default();
        let content = toml::to_string_pretty(&defaults)
            .map_err(|e| format!("Cannot serialize default settings: {e}"))?;
        std::fs::write(&path, content)
            .map_err(|e| format!("Cannot write {}: {e}", path.display()))?;

        Ok(path)
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(WORKSPACE_DIR).join("settings.toml"));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'draftmill init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Pipeline tuning derived from these settings.
    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            vectors_per_cluster: self.clustering.vectors_per_cluster,
            max_iterations: self.clustering.max_iterations,
            time_budget: Duration::from_secs(self.clustering.time_budget_secs),
            seed: self.clustering.seed,
            candidate_clusters: self.search.candidate_clusters,
            similarity_threshold: self.search.similarity_threshold,
        }
    }

    /// Scheduler tuning derived from these settings.
    #[must_use]
    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            throttle: Duration::from_millis(self.queue.throttle_ms),
            cycle_lock_ttl: Duration::from_secs(self.queue.cycle_lock_ttl_secs),
            job_lock_ttl: Duration::from_secs(self.queue.job_lock_ttl_secs),
        }
    }
}
