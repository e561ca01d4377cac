//! Octree build and streaming configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Default largest brick edge in voxels
pub const DEFAULT_MAX_BRICK_SIZE: u32 = 256;

/// Where evicted brick data is kept between reloads
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackingStoreKind {
    /// One anonymous temporary file per brick, removed when closed
    #[default]
    TempFile,
    /// Plain heap buffer per brick
    Memory,
    /// LZ4-compressed heap buffer per brick
    Compressed,
}

/// Policy deciding whether an internal node is detailed enough to render
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum LodConfig {
    /// Always descend to the leaves
    #[default]
    LeafOnly,
    /// Stop descending once the brick is far enough away.
    /// Each level above the leaves doubles the required distance.
    Distance { base_distance: f32 },
}

/// Full octree configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// Largest brick edge in voxels; regions above this are subdivided
    pub max_brick_size: u32,
    /// Backing store used for evicted bricks
    pub backing_store: BackingStoreKind,
    /// Cap on bytes written to backing stores, in megabytes. None = unbounded.
    pub storage_budget_mb: Option<usize>,
    /// Level of detail policy
    pub lod: LodConfig,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_brick_size: DEFAULT_MAX_BRICK_SIZE,
            backing_store: BackingStoreKind::TempFile,
            storage_budget_mb: None,
            lod: LodConfig::LeafOnly,
        }
    }
}

impl OctreeConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: OctreeConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values the partitioner cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_brick_size < 2 {
            return Err(Error::Config(format!(
                "max_brick_size must be at least 2, got {}",
                self.max_brick_size
            )));
        }
        if let LodConfig::Distance { base_distance } = self.lod {
            if !(base_distance > 0.0) {
                return Err(Error::Config(format!(
                    "lod base_distance must be positive, got {}",
                    base_distance
                )));
            }
        }
        Ok(())
    }

    /// Storage budget in bytes
    pub fn storage_budget_bytes(&self) -> Option<usize> {
        self.storage_budget_mb.map(|mb| mb * 1024 * 1024)
    }
}
