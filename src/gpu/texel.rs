//! Brick texel encoding and the min/max reductions shared by all backends

use crate::core::types::UVec3;
use crate::volume::BitDepth;

/// One brick cell: representative value plus the min/max of its footprint.
/// Stored as RGBA with alpha unused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Texel {
    pub value: u32,
    pub min: u32,
    pub max: u32,
}

impl Texel {
    pub fn new(value: u32, min: u32, max: u32) -> Self {
        Self { value, min, max }
    }

    /// Append the little-endian RGBA encoding
    pub fn encode(&self, bit_depth: BitDepth, out: &mut Vec<u8>) {
        for channel in [self.value, self.min, self.max, 0] {
            match bit_depth {
                BitDepth::U8 => out.push(channel as u8),
                BitDepth::U16 => out.extend_from_slice(&(channel as u16).to_le_bytes()),
                BitDepth::U32 => out.extend_from_slice(&channel.to_le_bytes()),
            }
        }
    }

    /// Decode one texel from its RGBA bytes
    pub fn decode(bit_depth: BitDepth, bytes: &[u8]) -> Self {
        let channel = |i: usize| -> u32 {
            match bit_depth {
                BitDepth::U8 => bytes[i] as u32,
                BitDepth::U16 => u16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]) as u32,
                BitDepth::U32 => u32::from_le_bytes([
                    bytes[4 * i],
                    bytes[4 * i + 1],
                    bytes[4 * i + 2],
                    bytes[4 * i + 3],
                ]),
            }
        };
        Self { value: channel(0), min: channel(1), max: channel(2) }
    }

    /// Combine a 2x2x2 footprint: average value, min of mins, max of maxes.
    ///
    /// The average is floor(sum / 8) computed without 64-bit math so the
    /// WGSL kernel matches bit for bit.
    pub fn reduce(samples: &[Texel; 8]) -> Self {
        let mut high = 0u32;
        let mut low = 0u32;
        let mut min = u32::MAX;
        let mut max = 0u32;
        for s in samples {
            high += s.value >> 3;
            low += s.value & 7;
            min = min.min(s.min);
            max = max.max(s.max);
        }
        Self { value: high + (low >> 3), min, max }
    }
}

/// Linear index of a texel, x fastest
pub fn texel_index(p: UVec3, size: UVec3) -> usize {
    (p.x as u64 + size.x as u64 * (p.y as u64 + size.y as u64 * p.z as u64)) as usize
}

/// Decode a whole brick
pub fn decode_brick(bit_depth: BitDepth, bytes: &[u8]) -> Vec<Texel> {
    let stride = (bit_depth.bytes() * 4) as usize;
    bytes.chunks_exact(stride).map(|b| Texel::decode(bit_depth, b)).collect()
}

/// Encode a whole brick
pub fn encode_brick(bit_depth: BitDepth, texels: &[Texel]) -> Vec<u8> {
    let mut out = Vec::with_capacity(texels.len() * (bit_depth.bytes() * 4) as usize);
    for t in texels {
        t.encode(bit_depth, &mut out);
    }
    out
}

/// Leaf texel: the voxel value with min/max over its trilinear footprint
/// (`p` and `p + 1` per axis, clamped to the valid data).
pub fn leaf_texel(values: &[u32], p: UVec3, data: UVec3, padded: UVec3) -> Texel {
    let last = data.saturating_sub(UVec3::ONE);
    let value = values[texel_index(p, padded)];
    let mut min = value;
    let mut max = value;
    for i in 1..8u32 {
        let offset = UVec3::new(i & 1, (i >> 1) & 1, (i >> 2) & 1);
        let q = (p + offset).min(last);
        let v = values[texel_index(q, padded)];
        min = min.min(v);
        max = max.max(v);
    }
    Texel { value, min, max }
}

/// Down-sampled texel `g` of a source brick of `src_size`
pub fn downsample_texel(src: &[Texel], src_size: UVec3, g: UVec3) -> Texel {
    let last = src_size - UVec3::ONE;
    let samples: [Texel; 8] = std::array::from_fn(|i| {
        let i = i as u32;
        let offset = UVec3::new(i & 1, (i >> 1) & 1, (i >> 2) & 1);
        let q = (g * 2 + offset).min(last);
        src[texel_index(q, src_size)]
    });
    Texel::reduce(&samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let texel = Texel::new(1000, 10, 60000);
        let mut bytes = Vec::new();
        texel.encode(BitDepth::U16, &mut bytes);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[6..], &[0, 0]);
        assert_eq!(Texel::decode(BitDepth::U16, &bytes), texel);
    }

    #[test]
    fn test_reduce() {
        let mut samples = [Texel::new(8, 8, 8); 8];
        samples[3] = Texel::new(16, 2, 30);
        let reduced = Texel::reduce(&samples);
        assert_eq!(reduced, Texel::new(9, 2, 30));
    }

    #[test]
    fn test_reduce_large_values_do_not_overflow() {
        let samples = [Texel::new(u32::MAX, u32::MAX, u32::MAX); 8];
        assert_eq!(Texel::reduce(&samples).value, u32::MAX);
    }

    #[test]
    fn test_leaf_texel_clamps_to_data() {
        // 2x1x1 volume with padding to 3x2x2
        let padded = UVec3::new(3, 2, 2);
        let mut values = vec![0u32; 12];
        values[0] = 5;
        values[1] = 9;
        let data = UVec3::new(2, 1, 1);

        assert_eq!(leaf_texel(&values, UVec3::ZERO, data, padded), Texel::new(5, 5, 9));
        // Last voxel only sees itself, not the zero padding
        assert_eq!(leaf_texel(&values, UVec3::new(1, 0, 0), data, padded), Texel::new(9, 9, 9));
    }

    #[test]
    fn test_downsample_odd_edge() {
        let src_size = UVec3::new(3, 1, 1);
        let src = vec![Texel::new(1, 1, 1), Texel::new(3, 3, 3), Texel::new(7, 7, 7)];
        // Texel 1 covers source x = 2 only (clamped)
        assert_eq!(downsample_texel(&src, src_size, UVec3::new(1, 0, 0)), Texel::new(7, 7, 7));
        assert_eq!(downsample_texel(&src, src_size, UVec3::ZERO).min, 1);
    }
}
