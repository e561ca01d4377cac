//! Axis-aligned bounding box

use crate::core::types::{Mat4, Vec3};

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// The `[0,1]^3` box every brick is tested as in its local space
    pub const UNIT: Aabb = Aabb { min: Vec3::ZERO, max: Vec3::ONE };

    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// The eight corners, bit 0 = x, bit 1 = y, bit 2 = z
    pub fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| Vec3::new(
            if i & 1 != 0 { self.max.x } else { self.min.x },
            if i & 2 != 0 { self.max.y } else { self.min.y },
            if i & 4 != 0 { self.max.z } else { self.min.z },
        ))
    }

    /// Signed distance along the view direction to the nearest corner.
    ///
    /// `model_view` maps box space to camera space (camera looks down -Z).
    /// Negative when part of the box lies behind the camera.
    pub fn signed_view_distance(&self, model_view: &Mat4) -> f32 {
        self.corners()
            .iter()
            .map(|&c| -model_view.transform_point3(c).z)
            .fold(f32::INFINITY, f32::min)
    }
}
