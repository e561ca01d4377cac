//! Volume brick octree
//!
//! A large volume is split into an 8-ary tree of overlapping bricks. Leaves
//! hold min/max bricks synthesized from the raw voxels, internal nodes hold
//! down-sampled combinations of their children. Every brick is flushed to a
//! backing store right after it is built, and the tree starts cold: bricks
//! are only brought back onto the device by [`VolumeBrickOctree::update_frustum`].

pub mod path;
pub mod partition;
pub mod node;
pub mod lod;
pub mod stats;
mod build;
mod traversal;

pub use path::{NodePath, octant_pattern};
pub use node::VolumeNode;
pub use lod::{DistanceLod, LeafOnly, LodPolicy, LodQuery};
pub use stats::OctreeStats;
pub use build::normalized_voxel_scale;
pub use traversal::RenderedBrick;

use std::time::Instant;

use crate::core::camera::Camera;
use crate::core::config::OctreeConfig;
use crate::core::error::Error;
use crate::core::types::{Mat4, Result, UVec3};
use crate::gpu::BrickDevice;
use crate::storage::{BackingStores, StorageBudget, StoreProvider};
use crate::volume::VolumeSource;
use build::Builder;
use partition::{Ownership, Region};

/// Streamed brick tree over one volume
pub struct VolumeBrickOctree<D: BrickDevice> {
    device: D,
    root: VolumeNode<D::Texture>,
    lod: Box<dyn LodPolicy>,
    volume_size: UVec3,
}

impl<D: BrickDevice> VolumeBrickOctree<D> {
    /// Build the whole tree with backing stores described by `config`
    pub fn build<S: VolumeSource>(source: &S, device: D, config: &OctreeConfig) -> Result<Self> {
        let budget = StorageBudget::new(config.storage_budget_bytes());
        let mut stores = BackingStores::new(config.backing_store, budget);
        Self::build_with_stores(source, device, config, &mut stores)
    }

    /// Build the whole tree, creating backing stores through `stores`.
    ///
    /// Construction is bottom-up and synchronous. Any failure aborts the
    /// build and drops everything built so far.
    pub fn build_with_stores<S: VolumeSource>(
        source: &S,
        device: D,
        config: &OctreeConfig,
        stores: &mut dyn StoreProvider,
    ) -> Result<Self> {
        config.validate()?;
        let format = source.format();
        if !device.supports(format.bit_depth) {
            return Err(Error::UnsupportedFormat(format!(
                "device has no brick programs for {:?} volumes",
                format.bit_depth
            )));
        }

        let start = Instant::now();
        let volume_size = source.size();
        let region = Region::new(UVec3::ZERO, volume_size);
        let mut builder = Builder {
            source,
            device: &device,
            stores,
            max_brick_size: config.max_brick_size,
            voxel_scale: normalized_voxel_scale(volume_size, source.cell_size()),
            bit_depth: format.bit_depth,
        };
        let mut root = builder.build_node(NodePath::root(), region, Ownership::of(region))?;
        root.evict_subtree();

        let octree = Self {
            device,
            root,
            lod: lod::policy_from_config(&config.lod),
            volume_size,
        };
        log::info!(
            "Built brick octree for {:?} volume in {:.2?}: {}",
            volume_size,
            start.elapsed(),
            octree.stats()
        );
        Ok(octree)
    }

    /// Walk the tree against the camera frustum, loading visible bricks at
    /// the detail the LOD policy asks for and evicting everything else.
    ///
    /// Returns true if anything visible is resident.
    pub fn update_frustum(&mut self, camera: &Camera, world: &Mat4) -> bool {
        traversal::update_frustum(&mut self.root, &self.device, self.lod.as_ref(), camera, world)
    }

    /// Resident bricks to draw, never an ancestor together with a descendant
    pub fn rendered_bricks(&self, camera: &Camera, world: &Mat4) -> Vec<RenderedBrick<'_, D::Texture>> {
        let mut out = Vec::new();
        traversal::collect_rendered(&self.root, camera, world, &mut out);
        out
    }

    /// Drop every resident brick
    pub fn evict_all(&mut self) {
        self.root.evict_subtree();
    }

    pub fn set_lod_policy(&mut self, lod: Box<dyn LodPolicy>) {
        self.lod = lod;
    }

    pub fn root(&self) -> &VolumeNode<D::Texture> {
        &self.root
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn volume_size(&self) -> UVec3 {
        self.volume_size
    }

    pub fn stats(&self) -> OctreeStats {
        OctreeStats::collect(&self.root)
    }
}
