//! Reference brick backend running on the CPU

use std::cell::Cell;

use rayon::prelude::*;

use crate::core::error::Error;
use crate::core::types::{Result, UVec3, volume_of};
use crate::volume::BitDepth;
use super::texel::{self, Texel, texel_index};
use super::{BrickDevice, BrickTexture, ChildBrick, RawRegion, brick_byte_size, mip_level_count, mip_size, workgroup_count};

/// Brick held in host memory with its full mip chain
#[derive(Clone, Debug)]
pub struct CpuBrick {
    size: UVec3,
    bit_depth: BitDepth,
    levels: Vec<Vec<Texel>>,
}

impl CpuBrick {
    /// Texels of one mip level
    pub fn level(&self, level: u32) -> &[Texel] {
        &self.levels[level as usize]
    }

    /// Texel of level 0
    pub fn texel(&self, p: UVec3) -> Texel {
        self.levels[0][texel_index(p, self.size)]
    }
}

impl BrickTexture for CpuBrick {
    fn size(&self) -> UVec3 {
        self.size
    }

    fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    fn mip_level_count(&self) -> u32 {
        self.levels.len() as u32
    }
}

/// CPU implementation of [`BrickDevice`].
///
/// Counts work the way a GPU profiler would, so callers can check how many
/// dispatches and uploads a traversal caused.
#[derive(Debug)]
pub struct CpuBrickDevice {
    supported: Vec<BitDepth>,
    dispatches: Cell<u64>,
    uploads: Cell<u64>,
    downloads: Cell<u64>,
}

impl CpuBrickDevice {
    /// Device supporting every bit depth
    pub fn new() -> Self {
        Self::with_depths(&BitDepth::ALL)
    }

    /// Device with program families only for the given depths
    pub fn with_depths(depths: &[BitDepth]) -> Self {
        Self {
            supported: depths.to_vec(),
            dispatches: Cell::new(0),
            uploads: Cell::new(0),
            downloads: Cell::new(0),
        }
    }

    /// Compute dispatches recorded so far
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches.get()
    }

    pub fn upload_count(&self) -> u64 {
        self.uploads.get()
    }

    pub fn download_count(&self) -> u64 {
        self.downloads.get()
    }

    fn require(&self, bit_depth: BitDepth) -> Result<()> {
        if self.supports(bit_depth) {
            Ok(())
        } else {
            Err(Error::UnsupportedFormat(format!("no brick program family for {:?}", bit_depth)))
        }
    }

    fn record_dispatch(&self, threads: UVec3) {
        let groups = workgroup_count(threads);
        self.dispatches.set(self.dispatches.get() + 1);
        log::trace!("cpu dispatch {}x{}x{} groups", groups.x, groups.y, groups.z);
    }

    fn with_mips(size: UVec3, bit_depth: BitDepth, base: Vec<Texel>) -> CpuBrick {
        let count = mip_level_count(size);
        let mut levels = Vec::with_capacity(count as usize);
        levels.push(base);
        for level in 1..count {
            let src_size = mip_size(size, level - 1);
            let dst_size = mip_size(size, level);
            let src = &levels[level as usize - 1];
            let dst = build_level(dst_size, |g| texel::downsample_texel(src, src_size, g));
            levels.push(dst);
        }
        CpuBrick { size, bit_depth, levels }
    }
}

impl Default for CpuBrickDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn build_level(size: UVec3, f: impl Fn(UVec3) -> Texel + Sync) -> Vec<Texel> {
    let slice = (size.x * size.y) as usize;
    let mut out = vec![Texel::default(); volume_of(size) as usize];
    if slice > 0 {
        out.par_chunks_mut(slice).enumerate().for_each(|(z, plane)| {
            for (i, t) in plane.iter_mut().enumerate() {
                let p = UVec3::new(i as u32 % size.x, i as u32 / size.x, z as u32);
                *t = f(p);
            }
        });
    }
    out
}

impl BrickDevice for CpuBrickDevice {
    type Texture = CpuBrick;

    fn supports(&self, bit_depth: BitDepth) -> bool {
        self.supported.contains(&bit_depth)
    }

    fn min_max_from_raw(&self, values: &[u32], region: RawRegion, bit_depth: BitDepth) -> Result<CpuBrick> {
        self.require(bit_depth)?;
        if (values.len() as u64) < volume_of(region.padded) {
            return Err(Error::Gpu(format!(
                "raw buffer of {} values smaller than {:?}",
                values.len(),
                region.padded
            )));
        }
        self.record_dispatch(region.size);
        let base = build_level(region.size, |p| texel::leaf_texel(values, p, region.data, region.padded));
        Ok(Self::with_mips(region.size, bit_depth, base))
    }

    fn combine_children(
        &self,
        parent_size: UVec3,
        bit_depth: BitDepth,
        children: &[ChildBrick<'_, CpuBrick>],
    ) -> Result<CpuBrick> {
        self.require(bit_depth)?;
        let mut base = vec![Texel::default(); volume_of(parent_size) as usize];

        for child in children {
            let src = child.texture;
            if src.bit_depth != bit_depth {
                return Err(Error::Gpu(format!(
                    "child brick is {:?}, parent is {:?}",
                    src.bit_depth, bit_depth
                )));
            }
            self.record_dispatch(src.size);
            let half = src.size.map(|s| s.div_ceil(2));
            for z in 0..half.z {
                for y in 0..half.y {
                    for x in 0..half.x {
                        let g = UVec3::new(x, y, z);
                        let dst = child.shift + g;
                        if dst.cmplt(parent_size).all() {
                            base[texel_index(dst, parent_size)] =
                                texel::downsample_texel(&src.levels[0], src.size, g);
                        }
                    }
                }
            }
        }

        Ok(Self::with_mips(parent_size, bit_depth, base))
    }

    fn upload_brick(&self, size: UVec3, bit_depth: BitDepth, texels: &[u8]) -> Result<CpuBrick> {
        self.require(bit_depth)?;
        let expected = brick_byte_size(size, bit_depth);
        if texels.len() != expected {
            return Err(Error::Gpu(format!(
                "upload of {} bytes into a {:?} brick needing {}",
                texels.len(),
                size,
                expected
            )));
        }
        self.uploads.set(self.uploads.get() + 1);
        let base = texel::decode_brick(bit_depth, texels);
        Ok(Self::with_mips(size, bit_depth, base))
    }

    fn download_brick(&self, texture: &CpuBrick) -> Result<Vec<u8>> {
        self.downloads.set(self.downloads.get() + 1);
        Ok(texel::encode_brick(texture.bit_depth, &texture.levels[0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_region(size: UVec3) -> RawRegion {
        RawRegion { size, data: size, padded: size }
    }

    #[test]
    fn test_min_max_from_raw() {
        let device = CpuBrickDevice::new();
        let size = UVec3::new(2, 2, 1);
        let brick = device.min_max_from_raw(&[1, 2, 3, 4], raw_region(size), BitDepth::U8).unwrap();

        assert_eq!(brick.texel(UVec3::ZERO), Texel::new(1, 1, 4));
        assert_eq!(brick.texel(UVec3::new(1, 1, 0)), Texel::new(4, 4, 4));
        assert_eq!(brick.mip_level_count(), 2);
        assert_eq!(brick.level(1)[0].min, 1);
        assert_eq!(brick.level(1)[0].max, 4);
        assert_eq!(device.dispatch_count(), 1);
    }

    #[test]
    fn test_unsupported_depth() {
        let device = CpuBrickDevice::with_depths(&[BitDepth::U8]);
        let result = device.min_max_from_raw(&[0; 8], raw_region(UVec3::splat(2)), BitDepth::U16);
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_upload_download_roundtrip() {
        let device = CpuBrickDevice::new();
        let size = UVec3::new(3, 2, 2);
        let texels: Vec<Texel> = (0..12).map(|i| Texel::new(i * 100, i, i * 1000)).collect();
        let bytes = texel::encode_brick(BitDepth::U32, &texels);

        let brick = device.upload_brick(size, BitDepth::U32, &bytes).unwrap();
        assert_eq!(brick.mip_level_count(), 2);
        assert_eq!(device.download_brick(&brick).unwrap(), bytes);
    }

    #[test]
    fn test_upload_rejects_wrong_length() {
        let device = CpuBrickDevice::new();
        assert!(device.upload_brick(UVec3::splat(2), BitDepth::U8, &[0; 31]).is_err());
    }

    #[test]
    fn test_combine_places_children_at_shift() {
        let device = CpuBrickDevice::new();
        let low = device
            .upload_brick(UVec3::new(2, 1, 1), BitDepth::U8, &texel::encode_brick(BitDepth::U8, &[Texel::new(2, 1, 3), Texel::new(4, 2, 9)]))
            .unwrap();
        let high = device
            .upload_brick(UVec3::new(1, 1, 1), BitDepth::U8, &texel::encode_brick(BitDepth::U8, &[Texel::new(50, 40, 60)]))
            .unwrap();

        let children = [
            ChildBrick { texture: &low, shift: UVec3::ZERO },
            ChildBrick { texture: &high, shift: UVec3::new(1, 0, 0) },
        ];
        let parent = device.combine_children(UVec3::new(2, 1, 1), BitDepth::U8, &children).unwrap();

        assert_eq!(parent.texel(UVec3::ZERO), Texel::new(3, 1, 9));
        assert_eq!(parent.texel(UVec3::new(1, 0, 0)), Texel::new(50, 40, 60));
        assert_eq!(device.dispatch_count(), 2);
    }
}
