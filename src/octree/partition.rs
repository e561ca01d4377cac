//! Subdivision of a voxel region into overlapping octants
//!
//! A region larger than the brick size is split into eight children that
//! share an overlap band on every split axis. Overlap is one voxel directly
//! above the bricks and doubles with every level further up, so siblings
//! always share exactly one texel at their own resolution.
//!
//! Coverage of a node with `k` levels below it follows
//! `C(0) = max_brick_size`, `C(k) = 2 * C(k - 1) - 2^(k - 1)`.

use glam::DVec3;

use crate::core::error::Error;
use crate::core::types::{Result, UVec3, Vec3, has_zero_extent};

/// How an internal node splits its region
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subdivision {
    /// Halvings of the largest axis until it fits one brick
    pub levels: u32,
    /// Voxels shared by the low and high child on each split axis
    pub overlap: u32,
    /// Extent of a full child
    pub child_size_base: u32,
}

/// Voxel region of one node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub offset: UVec3,
    pub size: UVec3,
}

impl Region {
    pub fn new(offset: UVec3, size: UVec3) -> Self {
        Self { offset, size }
    }

    pub fn is_empty(&self) -> bool {
        has_zero_extent(self.size)
    }
}

/// Part of a node's region it is responsible for, in voxels.
///
/// Sibling regions overlap; ownership splits every overlap band in the
/// middle, so the ownership boxes of all leaves tile the root. A box whose
/// max lies below its min owns nothing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ownership {
    pub min: DVec3,
    pub max: DVec3,
}

impl Ownership {
    /// Whole region, for the root
    pub fn of(region: Region) -> Self {
        Self {
            min: region.offset.as_dvec3(),
            max: (region.offset + region.size).as_dvec3(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.max.cmple(self.min).any()
    }

    /// Owned volume in voxels (0 when empty)
    pub fn volume(&self) -> f64 {
        (self.max - self.min).max(DVec3::ZERO).element_product()
    }
}

/// Work out how to split a region, or None when it fits one brick
pub fn subdivide(size: UVec3, max_brick_size: u32) -> Result<Option<Subdivision>> {
    let largest = size.max_element() as u64;
    if largest <= max_brick_size as u64 {
        return Ok(None);
    }

    let mut coverage = max_brick_size as u64;
    let mut levels = 1u32;
    loop {
        let overlap = 1u64 << (levels - 1);
        let next = 2 * coverage - overlap;
        if next <= coverage {
            return Err(Error::Config(format!(
                "brick size {} cannot cover a region of {:?}",
                max_brick_size, size
            )));
        }
        if next >= largest {
            return Ok(Some(Subdivision {
                levels,
                overlap: overlap as u32,
                child_size_base: coverage as u32,
            }));
        }
        coverage = next;
        levels += 1;
    }
}

/// True when the high child along an axis of extent `size` is non-empty
fn has_high_child(size: u32, sub: &Subdivision) -> bool {
    sub.child_size_base != sub.overlap && size > sub.child_size_base
}

/// Region of the child with octant bits `pattern`
pub fn child_region(parent: Region, sub: &Subdivision, pattern: UVec3) -> Region {
    let step = sub.child_size_base - sub.overlap;
    let local = pattern * step;
    let mut size = parent.size.saturating_sub(local).min(UVec3::splat(sub.child_size_base));
    for axis in 0..3 {
        if pattern[axis] == 1 && !has_high_child(parent.size[axis], sub) {
            size[axis] = 0;
        }
    }
    Region::new(parent.offset + local, size)
}

/// Ownership of the child with octant bits `pattern`
pub fn child_ownership(parent: Region, owned: Ownership, sub: &Subdivision, pattern: UVec3) -> Ownership {
    let mut child = owned;
    for axis in 0..3 {
        if !has_high_child(parent.size[axis], sub) {
            continue;
        }
        let split = parent.offset[axis] as f64 + sub.child_size_base as f64 - sub.overlap as f64 * 0.5;
        if pattern[axis] == 1 {
            child.min[axis] = owned.min[axis].max(split);
        } else {
            child.max[axis] = owned.max[axis].min(split);
        }
    }
    child
}

/// Texture-coordinate bounds `(min, max)` of the owned part of a brick
pub fn tex_bounds(owned: Ownership, region: Region) -> (Vec3, Vec3) {
    if region.is_empty() {
        return (Vec3::ZERO, Vec3::ONE);
    }
    let offset = region.offset.as_dvec3();
    let size = region.size.as_dvec3();
    let min = ((owned.min - offset) / size).clamp(DVec3::ZERO, DVec3::ONE);
    let max = ((owned.max - offset) / size).clamp(min, DVec3::ONE);
    (min.as_vec3(), max.as_vec3())
}

/// Parent brick extent from its children's brick extents (octant order).
///
/// Per axis: half the low child plus half the opposing high child, each
/// rounded up.
pub fn parent_texture_size(children: &[UVec3; 8]) -> UVec3 {
    let low = children[0];
    let high = UVec3::new(children[1].x, children[2].y, children[4].z);
    low.map(|s| s.div_ceil(2)) + high.map(|s| s.div_ceil(2))
}

/// Offset of a child's down-sampled texels inside the parent brick
pub fn child_shift(low_texture_size: UVec3, pattern: UVec3) -> UVec3 {
    pattern * low_texture_size.map(|s| s.div_ceil(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::path::octant_pattern;

    #[test]
    fn test_fits_one_brick() {
        assert_eq!(subdivide(UVec3::splat(200), 256).unwrap(), None);
        assert_eq!(subdivide(UVec3::new(256, 1, 1), 256).unwrap(), None);
    }

    #[test]
    fn test_single_level_split() {
        let sub = subdivide(UVec3::splat(300), 256).unwrap().unwrap();
        assert_eq!(sub, Subdivision { levels: 1, overlap: 1, child_size_base: 256 });

        let root = Region::new(UVec3::ZERO, UVec3::splat(300));
        let low = child_region(root, &sub, UVec3::ZERO);
        let high = child_region(root, &sub, UVec3::ONE);
        assert_eq!(low, Region::new(UVec3::ZERO, UVec3::splat(256)));
        assert_eq!(high, Region::new(UVec3::splat(255), UVec3::splat(45)));
    }

    #[test]
    fn test_multi_level_split() {
        // C(1) = 511, C(2) = 1020
        let sub = subdivide(UVec3::new(600, 10, 10), 256).unwrap().unwrap();
        assert_eq!(sub, Subdivision { levels: 2, overlap: 2, child_size_base: 511 });
        let sub = subdivide(UVec3::new(1020, 1, 1), 256).unwrap().unwrap();
        assert_eq!(sub.levels, 2);
        let sub = subdivide(UVec3::new(1021, 1, 1), 256).unwrap().unwrap();
        assert_eq!(sub.levels, 3);
        assert_eq!(sub.overlap, 4);
    }

    #[test]
    fn test_brick_size_too_small() {
        // Coverage of 2-voxel bricks stops growing at 4
        assert!(subdivide(UVec3::splat(4), 2).unwrap().is_some());
        assert!(matches!(subdivide(UVec3::splat(5), 2), Err(Error::Config(_))));
    }

    #[test]
    fn test_thin_axis_children_are_empty() {
        let root = Region::new(UVec3::ZERO, UVec3::new(300, 100, 300));
        let sub = subdivide(root.size, 256).unwrap().unwrap();

        let y_high = child_region(root, &sub, UVec3::Y);
        assert!(y_high.is_empty());
        let x_high = child_region(root, &sub, UVec3::X);
        assert_eq!(x_high.size, UVec3::new(45, 100, 256));
    }

    #[test]
    fn test_ownership_splits_overlap() {
        let root = Region::new(UVec3::ZERO, UVec3::new(300, 100, 300));
        let owned = Ownership::of(root);
        let sub = subdivide(root.size, 256).unwrap().unwrap();

        let low = child_ownership(root, owned, &sub, UVec3::ZERO);
        assert_eq!(low.min, DVec3::ZERO);
        // No y neighbour, so y keeps the full extent
        assert_eq!(low.max, DVec3::new(255.5, 100.0, 255.5));

        let high_region = child_region(root, &sub, UVec3::X);
        let high = child_ownership(root, owned, &sub, UVec3::X);
        assert_eq!(high.min, DVec3::new(255.5, 0.0, 0.0));
        assert_eq!(high.max, DVec3::new(300.0, 100.0, 255.5));

        let (min, max) = tex_bounds(high, high_region);
        assert!((min.x - 0.5 / 45.0).abs() < 1e-6);
        assert_eq!(max.x, 1.0);
        assert_eq!(max.y, 1.0);
        assert!((max.z - (1.0 - 0.5 / 256.0)).abs() < 1e-6);
        assert_eq!(tex_bounds(Ownership::of(root), root), (Vec3::ZERO, Vec3::ONE));
    }

    #[test]
    fn test_empty_ownership() {
        let owned = Ownership { min: DVec3::new(4.0, 0.0, 0.0), max: DVec3::new(3.5, 2.0, 2.0) };
        assert!(owned.is_empty());
        assert_eq!(owned.volume(), 0.0);

        let region = Region::new(UVec3::ZERO, UVec3::splat(4));
        let (min, max) = tex_bounds(owned, region);
        assert_eq!(min.x, 1.0);
        assert_eq!(max.x, 1.0);
    }

    #[test]
    fn test_parent_texture_size_and_shift() {
        let mut children = [UVec3::ZERO; 8];
        for (i, child) in children.iter_mut().enumerate() {
            let p = octant_pattern(i);
            *child = UVec3::splat(256) * (UVec3::ONE - p) + UVec3::splat(45) * p;
        }
        assert_eq!(parent_texture_size(&children), UVec3::splat(151));
        assert_eq!(child_shift(children[0], UVec3::new(1, 0, 1)), UVec3::new(128, 0, 128));

        // Missing high child on an axis contributes nothing
        children[2] = UVec3::new(256, 0, 256);
        assert_eq!(parent_texture_size(&children).y, 128);
    }

    /// Owned boxes of all non-empty leaves
    fn owned_leaves(region: Region, owned: Ownership, max_brick_size: u32, out: &mut Vec<Ownership>) {
        if region.is_empty() {
            return;
        }
        let full = Ownership::of(region);
        assert!(owned.is_empty() || (owned.min.cmpge(full.min).all() && owned.max.cmple(full.max).all()));

        match subdivide(region.size, max_brick_size).unwrap() {
            None => out.push(owned),
            Some(sub) => {
                for i in 0..8 {
                    let p = octant_pattern(i);
                    let child = child_region(region, &sub, p);
                    let child_owned = child_ownership(region, owned, &sub, p);
                    owned_leaves(child, child_owned, max_brick_size, out);
                }
            }
        }
    }

    fn assert_tiles(size: UVec3, max_brick_size: u32) {
        let root = Region::new(UVec3::ZERO, size);
        let mut leaves = Vec::new();
        owned_leaves(root, Ownership::of(root), max_brick_size, &mut leaves);

        let total: f64 = leaves.iter().map(Ownership::volume).sum();
        let expected = size.x as f64 * size.y as f64 * size.z as f64;
        assert!((total - expected).abs() < 1e-6, "{} != {} for {:?}", total, expected, size);

        let leaves: Vec<_> = leaves.into_iter().filter(|o| !o.is_empty()).collect();
        for (i, a) in leaves.iter().enumerate() {
            for b in &leaves[i + 1..] {
                let overlaps = a.max.min(b.max).cmpgt(a.min.max(b.min)).all();
                assert!(!overlaps, "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_leaves_tile_the_root() {
        assert_tiles(UVec3::splat(300), 256);
        assert_tiles(UVec3::new(100, 37, 64), 16);
        assert_tiles(UVec3::new(130, 3, 45), 8);
        assert_tiles(UVec3::new(17, 17, 17), 16);
    }
}
