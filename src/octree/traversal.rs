//! Frustum-driven residency updates and render list collection

use crate::core::camera::Camera;
use crate::core::types::Mat4;
use crate::gpu::{BrickDevice, BrickTexture};
use crate::math::Aabb;
use super::lod::{LodPolicy, LodQuery};
use super::node::VolumeNode;

/// A resident brick ready to be drawn
pub struct RenderedBrick<'a, T> {
    pub node: &'a VolumeNode<T>,
    /// Maps the unit cube onto the brick in world space
    pub local_world: Mat4,
    /// Signed view distance to the nearest corner
    pub distance: f32,
}

impl<T> RenderedBrick<'_, T> {
    pub fn texture(&self) -> Option<&T> {
        self.node.brick.as_ref()
    }
}

/// Update residency of `node` and its subtree for one frame.
///
/// Returns true if the subtree has something visible and loaded.
pub(crate) fn update_frustum<D: BrickDevice>(
    node: &mut VolumeNode<D::Texture>,
    device: &D,
    lod: &dyn LodPolicy,
    camera: &Camera,
    world: &Mat4,
) -> bool {
    if node.store.is_none() {
        return false;
    }

    let local_world = node.local_world(world);
    if !camera.frustum_in(&local_world).intersects_aabb(&Aabb::UNIT) {
        node.evict_subtree();
        return false;
    }

    if node.is_leaf() {
        return node.ensure_loaded(device);
    }

    let query = LodQuery {
        level: node.level,
        max_level: node.max_level,
        distance: Aabb::UNIT.signed_view_distance(&(camera.view_matrix() * local_world)),
        texture_size: node.texture_size,
    };

    if lod.is_correct_lod(&query) {
        // Children stay resident until the coarser brick is actually loaded
        if node.brick.is_some() || node.ensure_loaded(device) {
            node.evict_children();
        } else {
            node.refresh_residency();
        }
        return node.has_resident_data;
    }

    node.evict();
    let mut any_visible = false;
    if let Some(children) = node.children.as_mut() {
        for child in children.iter_mut() {
            any_visible |= update_frustum(child, device, lod, camera, world);
        }
    }
    node.refresh_residency();
    any_visible
}

/// Append the shallowest resident bricks of the subtree to `out`
pub(crate) fn collect_rendered<'a, T: BrickTexture>(
    node: &'a VolumeNode<T>,
    camera: &Camera,
    world: &Mat4,
    out: &mut Vec<RenderedBrick<'a, T>>,
) {
    if !node.has_resident_data || node.store_size() == 0 {
        return;
    }

    let local_world = node.local_world(world);
    if node.brick.is_some() {
        let distance = Aabb::UNIT.signed_view_distance(&(camera.view_matrix() * local_world));
        out.push(RenderedBrick { node, local_world, distance });
        return;
    }

    if let Some(children) = node.children.as_ref() {
        for child in children.iter() {
            collect_rendered(child, camera, world, out);
        }
    }
}
