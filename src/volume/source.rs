//! Voxel data sources the octree is built from

use crate::core::error::Error;
use crate::core::types::{Result, UVec3, Vec3, volume_of};
use crate::gpu::{BrickDevice, RawRegion};
use super::format::{TextureDescriptor, VoxelFormat};

/// A volume that can hand out sub-regions of its voxels
pub trait VolumeSource {
    /// Total extent in voxels
    fn size(&self) -> UVec3;

    /// World-space size of one voxel (slice thickness)
    fn cell_size(&self) -> Vec3;

    /// Storage format of the voxels
    fn format(&self) -> VoxelFormat;

    /// Copy the voxels of `[pos, pos + data_size)` into `out`, laid out with
    /// the row pitch of `padded_size` (x fastest). Padding past `data_size`
    /// is zero-filled. Values are rescaled per [`VoxelFormat::scale`].
    fn fill_raw(&self, out: &mut [u32], pos: UVec3, data_size: UVec3, padded_size: UVec3) -> Result<()>;

    /// Read the region `[pos, pos + size)` and synthesize its min/max brick.
    ///
    /// One extra voxel is read past the high faces (where the volume has
    /// one) so min/max bounds cover the trilinear footprint at brick edges.
    fn create_min_max_texture<D: BrickDevice>(
        &self,
        device: &D,
        pos: UVec3,
        size: UVec3,
    ) -> Result<(D::Texture, TextureDescriptor)> {
        let format = self.format();
        if !device.supports(format.bit_depth) {
            return Err(Error::UnsupportedFormat(format!(
                "no min/max program for {:?} volumes",
                format.bit_depth
            )));
        }

        let padded = size + UVec3::ONE;
        let data = (self.size() - pos).min(padded);
        let mut values = vec![0u32; volume_of(padded) as usize];
        self.fill_raw(&mut values, pos, data, padded)?;

        let region = RawRegion { size, data, padded };
        let texture = device.min_max_from_raw(&values, region, format.bit_depth)?;
        Ok((texture, TextureDescriptor::for_depth(format.bit_depth)))
    }
}

/// Check that a requested region fits both the volume and the output buffer
pub(crate) fn check_region(
    volume_size: UVec3,
    out_len: usize,
    pos: UVec3,
    data_size: UVec3,
    padded_size: UVec3,
) -> Result<()> {
    let end = pos + data_size;
    if end.cmpgt(volume_size).any() {
        return Err(Error::Volume(format!(
            "region {:?}+{:?} exceeds volume {:?}",
            pos, data_size, volume_size
        )));
    }
    if data_size.cmpgt(padded_size).any() {
        return Err(Error::Volume(format!(
            "data size {:?} larger than padded size {:?}",
            data_size, padded_size
        )));
    }
    if (out_len as u64) < volume_of(padded_size) {
        return Err(Error::Volume(format!(
            "output buffer holds {} values, {} needed",
            out_len,
            volume_of(padded_size)
        )));
    }
    Ok(())
}
