//! Raw voxel files on disk

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::core::error::Error;
use crate::core::types::{Result, UVec3, Vec3, volume_of};
use super::dat::VolumeDescriptor;
use super::format::VoxelFormat;
use super::source::{VolumeSource, check_region};

/// Volume read row by row from a raw file
#[derive(Debug)]
pub struct RawVolume {
    file: File,
    size: UVec3,
    cell_size: Vec3,
    format: VoxelFormat,
}

impl RawVolume {
    /// Open the raw file named by a `.dat` descriptor
    pub fn open(descriptor_path: &Path) -> Result<Self> {
        let desc = VolumeDescriptor::load(descriptor_path)?;
        Self::from_descriptor(&desc)
    }

    pub fn from_descriptor(desc: &VolumeDescriptor) -> Result<Self> {
        let file = File::open(&desc.raw_path)?;
        let expected = volume_of(desc.resolution) * desc.format.bytes_per_voxel() as u64;
        let actual = file.metadata()?.len();
        if actual < expected {
            return Err(Error::Volume(format!(
                "{} holds {} bytes, {:?} voxels need {}",
                desc.raw_path.display(),
                actual,
                desc.resolution,
                expected
            )));
        }

        log::info!(
            "Opened raw volume {} ({}x{}x{}, {:?})",
            desc.raw_path.display(),
            desc.resolution.x,
            desc.resolution.y,
            desc.resolution.z,
            desc.format.bit_depth
        );

        Ok(Self {
            file,
            size: desc.resolution,
            cell_size: desc.slice_thickness,
            format: desc.format,
        })
    }
}

impl VolumeSource for RawVolume {
    fn size(&self) -> UVec3 {
        self.size
    }

    fn cell_size(&self) -> Vec3 {
        self.cell_size
    }

    fn format(&self) -> VoxelFormat {
        self.format
    }

    fn fill_raw(&self, out: &mut [u32], pos: UVec3, data_size: UVec3, padded_size: UVec3) -> Result<()> {
        check_region(self.size, out.len(), pos, data_size, padded_size)?;
        out[..volume_of(padded_size) as usize].fill(0);

        let bpv = self.format.bytes_per_voxel();
        let mut row = vec![0u8; data_size.x as usize * bpv];
        let mut file = &self.file;

        for z in 0..data_size.z {
            for y in 0..data_size.y {
                let p = pos + UVec3::new(0, y, z);
                let voxel = p.x as u64 + self.size.x as u64 * (p.y as u64 + self.size.y as u64 * p.z as u64);
                file.seek(SeekFrom::Start(voxel * bpv as u64))?;
                file.read_exact(&mut row)?;

                let dst = (padded_size.x * (y + padded_size.y * z)) as usize;
                for (x, bytes) in row.chunks_exact(bpv).enumerate() {
                    out[dst + x] = self.format.decode(bytes);
                }
            }
        }
        Ok(())
    }
}
