//! # Engine Configuration
//!
//! Settings for the scene core: logging, hierarchy policy, culling and GPU
//! storage. Every struct has sensible defaults so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Config, ConfigError};

/// What happens to a transform's children when its entity is destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildPolicy {
    /// Children become roots and keep living
    Orphan,
    /// Children's entities are destroyed along with the parent
    Cascade,
}

impl Default for ChildPolicy {
    fn default() -> Self {
        Self::Cascade
    }
}

/// Scene behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Policy applied to children of destroyed transforms
    pub child_policy: ChildPolicy,
    /// Minimum number of modified transforms before recompute goes parallel
    pub parallel_transform_threshold: usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            child_policy: ChildPolicy::default(),
            parallel_transform_threshold: 256,
        }
    }
}

/// Frustum culling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingConfig {
    /// Number of batches the instance range is split into
    pub batch_count: usize,
    /// Worker threads for the culling pool (0 = available parallelism)
    pub worker_threads: usize,
    /// Bounded wait for all batches of one run, in milliseconds
    pub batch_timeout_ms: u64,
    /// Use the worker pool; false selects the single-threaded path
    pub multithreaded: bool,
}

impl CullingConfig {
    /// Timeout as a duration
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Resolve `worker_threads`, substituting the machine's parallelism for 0
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4)
        }
    }
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            batch_count: 64,
            worker_threads: 0,
            batch_timeout_ms: 100,
            multithreaded: true,
        }
    }
}

/// GPU storage handler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Elements reserved when a storage buffer is first created
    pub initial_capacity: usize,
    /// Required byte alignment of every element offset
    pub alignment: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
            alignment: 16,
        }
    }
}

/// # Engine Configuration
///
/// Top-level configuration handed to the scene and renderer constructors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,
    /// Scene settings
    pub scene: SceneConfig,
    /// Culling settings
    pub culling: CullingConfig,
    /// Storage settings
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            scene: SceneConfig::default(),
            culling: CullingConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the child policy
    pub fn with_child_policy(mut self, policy: ChildPolicy) -> Self {
        self.scene.child_policy = policy;
        self
    }

    /// Enable or disable the parallel culling path
    pub fn with_multithreaded_culling(mut self, enabled: bool) -> Self {
        self.culling.multithreaded = enabled;
        self
    }

    /// Set the number of culling worker threads
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.culling.worker_threads = threads;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for EngineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.culling.batch_count == 0 {
            return Err(ConfigError::Invalid("culling.batch_count must be at least 1".to_string()));
        }
        if self.culling.batch_timeout_ms == 0 {
            return Err(ConfigError::Invalid("culling.batch_timeout_ms must be positive".to_string()));
        }
        if self.storage.initial_capacity == 0 {
            return Err(ConfigError::Invalid("storage.initial_capacity must be at least 1".to_string()));
        }
        if !self.storage.alignment.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "storage.alignment must be a power of two, got {}",
                self.storage.alignment
            )));
        }
        Ok(())
    }
}
