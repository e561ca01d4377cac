//! In-memory voxel grids

use rayon::prelude::*;

use crate::core::error::Error;
use crate::core::types::{Result, UVec3, Vec3, volume_of};
use super::format::{BitDepth, VoxelFormat};
use super::source::{VolumeSource, check_region};

/// Dense voxel grid held in memory, x fastest
#[derive(Clone, Debug)]
pub struct MemoryVolume {
    size: UVec3,
    cell_size: Vec3,
    format: VoxelFormat,
    values: Vec<u32>,
}

impl MemoryVolume {
    /// Wrap existing values. Values above the format's range are rejected.
    pub fn new(size: UVec3, format: VoxelFormat, values: Vec<u32>) -> Result<Self> {
        if values.len() as u64 != volume_of(size) {
            return Err(Error::Volume(format!(
                "{} values supplied for a {:?} volume",
                values.len(),
                size
            )));
        }
        let max = format.bit_depth.max_value();
        if values.iter().any(|&v| v > max) {
            return Err(Error::Volume(format!("value above {} in {:?} volume", max, format.bit_depth)));
        }
        Ok(Self { size, cell_size: Vec3::ONE, format, values })
    }

    /// Fill a volume from a function of the voxel coordinate
    pub fn from_fn(size: UVec3, bit_depth: BitDepth, f: impl Fn(UVec3) -> u32 + Sync) -> Self {
        let max = bit_depth.max_value();
        let slice = (size.x * size.y) as usize;
        let mut values = vec![0u32; volume_of(size) as usize];
        if slice > 0 {
            values.par_chunks_mut(slice).enumerate().for_each(|(z, plane)| {
                for (i, v) in plane.iter_mut().enumerate() {
                    let x = i as u32 % size.x;
                    let y = i as u32 / size.x;
                    *v = f(UVec3::new(x, y, z as u32)).min(max);
                }
            });
        }
        Self { size, cell_size: Vec3::ONE, format: VoxelFormat::new(bit_depth), values }
    }

    /// Solid sphere centered in the volume, densest at the center
    pub fn sphere(size: UVec3, bit_depth: BitDepth) -> Self {
        let center = size.as_vec3() * 0.5;
        let radius = size.min_element() as f32 * 0.45;
        let peak = bit_depth.max_value() as f32;
        Self::from_fn(size, bit_depth, |p| {
            let d = (p.as_vec3() + Vec3::splat(0.5)).distance(center) / radius;
            if d < 1.0 { ((1.0 - d) * peak) as u32 } else { 0 }
        })
    }

    /// Builder-style slice thickness
    pub fn with_cell_size(mut self, cell_size: Vec3) -> Self {
        self.cell_size = cell_size;
        self
    }

    /// Value at a voxel coordinate
    pub fn get(&self, p: UVec3) -> u32 {
        self.values[self.index(p)]
    }

    fn index(&self, p: UVec3) -> usize {
        (p.x as u64 + self.size.x as u64 * (p.y as u64 + self.size.y as u64 * p.z as u64)) as usize
    }
}

impl VolumeSource for MemoryVolume {
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

        for z in 0..data_size.z {
            for y in 0..data_size.y {
                let src = self.index(pos + UVec3::new(0, y, z));
                let dst = (padded_size.x * (y + padded_size.y * z)) as usize;
                let row = data_size.x as usize;
                out[dst..dst + row].copy_from_slice(&self.values[src..src + row]);
            }
        }
        Ok(())
    }
}
