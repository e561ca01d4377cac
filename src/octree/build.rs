//! Bottom-up construction of the brick tree

use crate::core::error::Error;
use crate::core::types::{Result, UVec3, Vec3};
use crate::gpu::{BrickDevice, ChildBrick};
use crate::storage::StoreProvider;
use crate::volume::{BitDepth, VolumeSource};
use super::node::VolumeNode;
use super::partition::{self, Ownership, Region};
use super::path::{NodePath, octant_pattern};

/// World size of one voxel, scaled so the longest side of the volume is 1
pub fn normalized_voxel_scale(size: UVec3, cell_size: Vec3) -> Vec3 {
    let extent = (size.as_vec3() * cell_size).max_element();
    if extent > 0.0 { cell_size / extent } else { Vec3::ONE }
}

/// Recursive builder shared by every node of one tree
pub(crate) struct Builder<'a, S, D> {
    pub source: &'a S,
    pub device: &'a D,
    pub stores: &'a mut dyn StoreProvider,
    pub max_brick_size: u32,
    pub voxel_scale: Vec3,
    pub bit_depth: BitDepth,
}

impl<S, D> Builder<'_, S, D>
where
    S: VolumeSource,
    D: BrickDevice,
{
    /// Build the node at `path` and everything below it.
    ///
    /// On return the node's brick is flushed and resident, its children's
    /// bricks are evicted.
    pub fn build_node(&mut self, path: NodePath, region: Region, owned: Ownership) -> Result<VolumeNode<D::Texture>> {
        let mut node = VolumeNode::new(path, region, self.voxel_scale, self.bit_depth);
        if region.is_empty() {
            return Ok(node);
        }

        let (min_tex_bound, max_tex_bound) = partition::tex_bounds(owned, region);
        node.min_tex_bound = min_tex_bound;
        node.max_tex_bound = max_tex_bound;

        match partition::subdivide(region.size, self.max_brick_size)? {
            None => {
                let (brick, _) = self.source.create_min_max_texture(self.device, region.offset, region.size)?;
                node.brick = Some(brick);
                log::debug!("Leaf {} at {:?} size {:?}", node.path, region.offset, region.size);
            }
            Some(sub) => {
                let mut children = Vec::with_capacity(8);
                for i in 0..8 {
                    let pattern = octant_pattern(i);
                    let child_region = partition::child_region(region, &sub, pattern);
                    let child_owned = partition::child_ownership(region, owned, &sub, pattern);
                    children.push(self.build_node(node.path.child(i), child_region, child_owned)?);
                }
                let children: Box<[VolumeNode<D::Texture>; 8]> = children
                    .into_boxed_slice()
                    .try_into()
                    .map_err(|_| Error::Streaming(format!("node {} needs eight children", node.path)))?;

                let child_sizes: [UVec3; 8] = std::array::from_fn(|i| children[i].texture_size);
                node.texture_size = partition::parent_texture_size(&child_sizes);
                node.max_level = children.iter().map(|c| c.max_level).max().unwrap_or(node.level);

                let low_size = children[0].texture_size;
                let mut placed = Vec::with_capacity(8);
                for (i, child) in children.iter().enumerate() {
                    if child.store_size() == 0 {
                        continue;
                    }
                    let texture = child.brick.as_ref().ok_or_else(|| {
                        Error::Streaming(format!("child {} not resident during combine", child.path))
                    })?;
                    placed.push(ChildBrick { texture, shift: partition::child_shift(low_size, octant_pattern(i)) });
                }
                node.brick = Some(self.device.combine_children(node.texture_size, self.bit_depth, &placed)?);
                log::debug!(
                    "Combined {} children into {} ({:?} texels, {} levels)",
                    placed.len(),
                    node.path,
                    node.texture_size,
                    sub.levels
                );
                node.children = Some(children);
            }
        }

        node.flush_to_backing_store(self.device, &mut *self.stores)?;
        node.evict_children();
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_voxel_scale() {
        let scale = normalized_voxel_scale(UVec3::new(100, 50, 20), Vec3::new(1.0, 1.0, 2.0));
        assert!((scale - Vec3::new(0.01, 0.01, 0.02)).length() < 1e-6);
        assert_eq!(normalized_voxel_scale(UVec3::ZERO, Vec3::ONE), Vec3::ONE);
    }
}
