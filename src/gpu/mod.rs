//! GPU brick synthesis
//!
//! Everything the octree asks of the GPU goes through [`BrickDevice`]:
//! - min/max bricks synthesized from raw voxels (leaves)
//! - down-sampled bricks combined from eight children (internal nodes)
//! - upload of stored texels with min/max mip pyramid regeneration (reload)
//! - readback of level 0 texels (flush to backing store)
//!
//! [`WgpuBrickDevice`] runs WGSL compute kernels; [`CpuBrickDevice`] is a
//! reference backend producing identical texels without a GPU.

pub mod texel;
pub mod cpu;
pub mod context;
pub mod wgpu_device;

pub use texel::Texel;
pub use cpu::{CpuBrick, CpuBrickDevice};
pub use context::GpuContext;
pub use wgpu_device::{BrickPrograms, GpuBrick, WgpuBrickDevice};

use crate::core::types::{Result, UVec3, volume_of};
use crate::volume::{BitDepth, TEXEL_CHANNELS};

/// Local workgroup edge of every brick kernel (8x8x8)
pub const WORKGROUP_SIZE: u32 = 8;

/// Workgroups needed to cover `size` threads per axis
pub fn workgroup_count(size: UVec3) -> UVec3 {
    size.map(|s| s.div_ceil(WORKGROUP_SIZE))
}

/// Number of mip levels for a brick of `size`
pub fn mip_level_count(size: UVec3) -> u32 {
    let max = size.max_element().max(1);
    32 - max.leading_zeros()
}

/// Extent of mip `level` of a brick of `size`
pub fn mip_size(size: UVec3, level: u32) -> UVec3 {
    (size >> level).max(UVec3::ONE)
}

/// Byte size of level 0 of a brick
pub fn brick_byte_size(size: UVec3, bit_depth: BitDepth) -> usize {
    volume_of(size) as usize * (bit_depth.bytes() * TEXEL_CHANNELS) as usize
}

/// Raw voxel buffer handed to leaf synthesis
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawRegion {
    /// Brick extent to produce
    pub size: UVec3,
    /// Valid voxels in the buffer (at least `size` unless the volume ends)
    pub data: UVec3,
    /// Row pitch of the buffer
    pub padded: UVec3,
}

/// A child brick placed inside its parent during a combine pass
pub struct ChildBrick<'a, T> {
    pub texture: &'a T,
    /// Offset of the child's down-sampled texels inside the parent brick
    pub shift: UVec3,
}

/// A brick texture resident on some device
pub trait BrickTexture {
    /// Level 0 extent in texels
    fn size(&self) -> UVec3;

    fn bit_depth(&self) -> BitDepth;

    fn mip_level_count(&self) -> u32;

    /// Bytes occupied by level 0
    fn byte_size(&self) -> usize {
        brick_byte_size(self.size(), self.bit_depth())
    }
}

/// Device able to create, combine, upload and read back bricks
pub trait BrickDevice {
    type Texture: BrickTexture;

    /// Whether a program family exists for this component width
    fn supports(&self, bit_depth: BitDepth) -> bool;

    /// Synthesize a leaf brick from raw voxel values
    fn min_max_from_raw(&self, values: &[u32], region: RawRegion, bit_depth: BitDepth) -> Result<Self::Texture>;

    /// Down-sample up to eight children into one parent brick of `parent_size`.
    /// Returns after the GPU has finished.
    fn combine_children(
        &self,
        parent_size: UVec3,
        bit_depth: BitDepth,
        children: &[ChildBrick<'_, Self::Texture>],
    ) -> Result<Self::Texture>;

    /// Allocate a brick from level 0 texels and rebuild its min/max mips
    fn upload_brick(&self, size: UVec3, bit_depth: BitDepth, texels: &[u8]) -> Result<Self::Texture>;

    /// Read level 0 texels back to the CPU
    fn download_brick(&self, texture: &Self::Texture) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroup_count() {
        assert_eq!(workgroup_count(UVec3::new(256, 45, 8)), UVec3::new(32, 6, 1));
        assert_eq!(workgroup_count(UVec3::new(1, 9, 16)), UVec3::new(1, 2, 2));
    }

    #[test]
    fn test_mip_levels() {
        assert_eq!(mip_level_count(UVec3::new(256, 256, 256)), 9);
        assert_eq!(mip_level_count(UVec3::new(200, 3, 1)), 8);
        assert_eq!(mip_level_count(UVec3::ONE), 1);
        assert_eq!(mip_size(UVec3::new(200, 3, 1), 2), UVec3::new(50, 1, 1));
    }

    #[test]
    fn test_brick_byte_size() {
        assert_eq!(brick_byte_size(UVec3::new(2, 2, 2), BitDepth::U16), 64);
    }
}
