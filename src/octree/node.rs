//! Octree node owning one brick and its backing store

use crate::core::error::Error;
use crate::core::types::{Mat4, Result, UVec3, Vec3, volume_of};
use crate::gpu::{BrickDevice, BrickTexture};
use crate::storage::{BackingStore, StoreProvider};
use crate::volume::BitDepth;
use super::partition::Region;
use super::path::NodePath;

/// One node of a [`VolumeBrickOctree`](super::VolumeBrickOctree).
///
/// `T` is the brick texture type of the device the tree was built on.
pub struct VolumeNode<T> {
    pub(crate) path: NodePath,
    pub(crate) region: Region,
    pub(crate) texture_size: UVec3,
    pub(crate) level: u32,
    pub(crate) max_level: u32,
    pub(crate) voxel_scale: Vec3,
    pub(crate) min_tex_bound: Vec3,
    pub(crate) max_tex_bound: Vec3,
    pub(crate) bit_depth: BitDepth,
    pub(crate) children: Option<Box<[VolumeNode<T>; 8]>>,
    pub(crate) brick: Option<T>,
    pub(crate) store: Option<Box<dyn BackingStore>>,
    pub(crate) has_resident_data: bool,
    pub(crate) reload_failed: bool,
}

impl<T: BrickTexture> VolumeNode<T> {
    /// Node without children, brick or store
    pub(crate) fn new(path: NodePath, region: Region, voxel_scale: Vec3, bit_depth: BitDepth) -> Self {
        let level = path.level();
        Self {
            path,
            region,
            texture_size: region.size,
            level,
            max_level: level,
            voxel_scale,
            min_tex_bound: Vec3::ZERO,
            max_tex_bound: Vec3::ONE,
            bit_depth,
            children: None,
            brick: None,
            store: None,
            has_resident_data: false,
            reload_failed: false,
        }
    }

    // --- Accessors ---

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// Origin of the node's region within the volume, in voxels
    pub fn position_offset(&self) -> UVec3 {
        self.region.offset
    }

    /// Extent of the node's region, in voxels
    pub fn original_size(&self) -> UVec3 {
        self.region.size
    }

    /// Extent of the node's brick, in texels
    pub fn texture_size(&self) -> UVec3 {
        self.texture_size
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// World-space size of one voxel
    pub fn voxel_scale(&self) -> Vec3 {
        self.voxel_scale
    }

    pub fn min_tex_bound(&self) -> Vec3 {
        self.min_tex_bound
    }

    pub fn max_tex_bound(&self) -> Vec3 {
        self.max_tex_bound
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn children(&self) -> Option<&[VolumeNode<T>; 8]> {
        self.children.as_deref()
    }

    /// Resident brick, if loaded
    pub fn brick(&self) -> Option<&T> {
        self.brick.as_ref()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.brick.is_some()
    }

    /// True if this node or any descendant holds a brick
    pub fn has_resident_data(&self) -> bool {
        self.has_resident_data
    }

    /// True once a reload failed; cleared by the next successful reload
    pub fn reload_failed(&self) -> bool {
        self.reload_failed
    }

    /// Logical bytes in the backing store, 0 when there is none
    pub fn store_size(&self) -> usize {
        self.store.as_ref().map_or(0, |s| s.size())
    }

    /// Bytes the backing store occupies
    pub fn stored_bytes(&self) -> usize {
        self.store.as_ref().map_or(0, |s| s.stored_bytes())
    }

    /// Children in octant order, empty for leaves
    pub fn iter_children(&self) -> impl Iterator<Item = &VolumeNode<T>> {
        self.children.iter().flat_map(|c| c.iter())
    }

    fn any_child_resident(&self) -> bool {
        self.iter_children().any(|c| c.has_resident_data)
    }

    pub(crate) fn refresh_residency(&mut self) {
        self.has_resident_data = self.brick.is_some() || self.any_child_resident();
    }

    // --- Streaming ---

    /// Drop this node's brick. The backing store is untouched.
    pub fn evict(&mut self) {
        if self.brick.take().is_some() {
            log::trace!("Evicted brick {}", self.path);
        }
        self.refresh_residency();
    }

    /// Drop the bricks of this node and all descendants
    pub fn evict_subtree(&mut self) {
        if !self.has_resident_data {
            return;
        }
        self.evict_children();
        self.brick = None;
        self.has_resident_data = false;
        log::trace!("Evicted subtree {}", self.path);
    }

    /// Drop the bricks of all descendants, keeping this node's own
    pub fn evict_children(&mut self) {
        if let Some(children) = self.children.as_mut() {
            for child in children.iter_mut() {
                child.evict_subtree();
            }
        }
        self.refresh_residency();
    }

    /// Bring the brick back from the backing store.
    ///
    /// No-op when already loaded or when there is nothing stored.
    pub fn reload<D>(&mut self, device: &D) -> Result<()>
    where
        D: BrickDevice<Texture = T>,
    {
        if self.brick.is_some() {
            return Ok(());
        }
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        if store.size() == 0 {
            return Ok(());
        }

        let texels = store.read()?;
        let brick = device.upload_brick(self.texture_size, self.bit_depth, &texels)?;
        self.brick = Some(brick);
        self.has_resident_data = true;
        self.reload_failed = false;
        log::trace!("Reloaded brick {} ({} bytes)", self.path, texels.len());
        Ok(())
    }

    /// Copy the freshly built brick into a new backing store, then replace it
    /// with a reloaded one.
    pub fn flush_to_backing_store<D>(&mut self, device: &D, stores: &mut dyn StoreProvider) -> Result<()>
    where
        D: BrickDevice<Texture = T>,
    {
        if volume_of(self.texture_size) == 0 {
            self.brick = None;
            self.store = None;
            self.refresh_residency();
            return Ok(());
        }

        let brick = self
            .brick
            .take()
            .ok_or_else(|| Error::Streaming(format!("node {} has no brick to flush", self.path)))?;
        let texels = device.download_brick(&brick)?;
        drop(brick);

        self.store = Some(stores.store(&self.path, &texels)?);
        self.reload(device)
    }

    /// Load the brick for rendering, logging a failure once per node
    pub(crate) fn ensure_loaded<D>(&mut self, device: &D) -> bool
    where
        D: BrickDevice<Texture = T>,
    {
        match self.reload(device) {
            Ok(()) => self.brick.is_some(),
            Err(e) => {
                if !self.reload_failed {
                    log::warn!("Failed to reload brick {}: {}", self.path, e);
                    self.reload_failed = true;
                }
                false
            }
        }
    }

    /// Model matrix mapping the unit cube onto the owned part of the brick
    pub fn local_world(&self, world: &Mat4) -> Mat4 {
        let extent = self.region.size.as_vec3();
        let origin = self.region.offset.as_vec3() + self.min_tex_bound * extent;
        let size = extent * (self.max_tex_bound - self.min_tex_bound);
        *world
            * Mat4::from_scale(self.voxel_scale)
            * Mat4::from_translation(origin)
            * Mat4::from_scale(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{CpuBrickDevice, Texel, texel};
    use crate::storage::{BackingStores, StorageBudget};
    use crate::core::config::BackingStoreKind;

    fn leaf_with_brick(device: &CpuBrickDevice, size: UVec3) -> VolumeNode<crate::gpu::CpuBrick> {
        let texels: Vec<Texel> = (0..volume_of(size) as u32).map(|i| Texel::new(i, i / 2, i + 1)).collect();
        let bytes = texel::encode_brick(BitDepth::U16, &texels);
        let mut node = VolumeNode::new(
            NodePath::root(),
            Region::new(UVec3::ZERO, size),
            Vec3::ONE,
            BitDepth::U16,
        );
        node.brick = Some(device.upload_brick(size, BitDepth::U16, &bytes).unwrap());
        node.has_resident_data = true;
        node
    }

    #[test]
    fn test_flush_then_evict_and_reload() {
        let device = CpuBrickDevice::new();
        let mut stores = BackingStores::new(BackingStoreKind::Memory, StorageBudget::unbounded());
        let mut node = leaf_with_brick(&device, UVec3::new(3, 2, 2));
        let before = device.download_brick(node.brick().unwrap()).unwrap();

        node.flush_to_backing_store(&device, &mut stores).unwrap();
        assert!(node.is_loaded());
        assert_eq!(node.store_size(), before.len());

        node.evict();
        node.evict();
        assert!(!node.is_loaded());
        assert!(!node.has_resident_data());
        assert_eq!(node.store_size(), before.len());

        node.reload(&device).unwrap();
        node.reload(&device).unwrap();
        assert!(node.has_resident_data());
        assert_eq!(device.download_brick(node.brick().unwrap()).unwrap(), before);
    }

    #[test]
    fn test_empty_node_never_stores() {
        let device = CpuBrickDevice::new();
        let mut stores = BackingStores::new(BackingStoreKind::Memory, StorageBudget::unbounded());
        let mut node: VolumeNode<crate::gpu::CpuBrick> =
            VolumeNode::new(NodePath::root(), Region::new(UVec3::ZERO, UVec3::new(4, 0, 4)), Vec3::ONE, BitDepth::U8);

        node.flush_to_backing_store(&device, &mut stores).unwrap();
        node.reload(&device).unwrap();
        assert!(node.is_empty());
        assert!(!node.is_loaded());
        assert_eq!(node.store_size(), 0);
        assert_eq!(stores.stored_bytes(), 0);
    }

    #[test]
    fn test_flush_without_brick_fails() {
        let device = CpuBrickDevice::new();
        let mut stores = BackingStores::new(BackingStoreKind::Memory, StorageBudget::unbounded());
        let mut node: VolumeNode<crate::gpu::CpuBrick> =
            VolumeNode::new(NodePath::root(), Region::new(UVec3::ZERO, UVec3::splat(2)), Vec3::ONE, BitDepth::U8);
        assert!(matches!(node.flush_to_backing_store(&device, &mut stores), Err(Error::Streaming(_))));
    }

    #[test]
    fn test_local_world_maps_unit_cube_to_owned_box() {
        let device = CpuBrickDevice::new();
        let mut node = leaf_with_brick(&device, UVec3::new(4, 4, 4));
        node.region.offset = UVec3::new(10, 0, 0);
        node.min_tex_bound = Vec3::new(0.125, 0.0, 0.0);
        node.max_tex_bound = Vec3::new(1.0, 0.875, 1.0);
        node.voxel_scale = Vec3::splat(0.5);

        let m = node.local_world(&Mat4::IDENTITY);
        let lo = m.transform_point3(Vec3::ZERO);
        let hi = m.transform_point3(Vec3::ONE);
        assert!((lo - Vec3::new(5.25, 0.0, 0.0)).length() < 1e-5);
        assert!((hi - Vec3::new(7.0, 1.75, 2.0)).length() < 1e-5);
    }
}
