//! Voxel and brick texel formats

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Channels per brick texel: value, min, max, unused
pub const TEXEL_CHANNELS: u32 = 4;

/// Unsigned component width shared by source voxels and brick texels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitDepth {
    U8,
    U16,
    U32,
}

impl BitDepth {
    /// All supported widths, narrowest first
    pub const ALL: [BitDepth; 3] = [BitDepth::U8, BitDepth::U16, BitDepth::U32];

    /// Map a component width in bits to a supported depth
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            8 => Ok(BitDepth::U8),
            16 => Ok(BitDepth::U16),
            32 => Ok(BitDepth::U32),
            other => Err(Error::UnsupportedFormat(format!(
                "{}-bit components have no min/max program",
                other
            ))),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            BitDepth::U8 => 8,
            BitDepth::U16 => 16,
            BitDepth::U32 => 32,
        }
    }

    /// Bytes per component
    pub fn bytes(self) -> u32 {
        self.bits() / 8
    }

    /// Largest representable component value
    pub fn max_value(self) -> u32 {
        match self {
            BitDepth::U8 => u8::MAX as u32,
            BitDepth::U16 => u16::MAX as u32,
            BitDepth::U32 => u32::MAX,
        }
    }

    /// RGBA unsigned storage format holding one brick texel
    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            BitDepth::U8 => wgpu::TextureFormat::Rgba8Uint,
            BitDepth::U16 => wgpu::TextureFormat::Rgba16Uint,
            BitDepth::U32 => wgpu::TextureFormat::Rgba32Uint,
        }
    }

    /// WGSL spelling of [`Self::texture_format`]
    pub fn wgsl_format(self) -> &'static str {
        match self {
            BitDepth::U8 => "rgba8uint",
            BitDepth::U16 => "rgba16uint",
            BitDepth::U32 => "rgba32uint",
        }
    }
}

/// Layout of voxels in a source file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelFormat {
    /// Storage width of one voxel
    pub bit_depth: BitDepth,
    /// Multiplier applied on read, e.g. 16 for 12-bit data stored in 16 bits
    pub scale: u32,
}

impl VoxelFormat {
    pub fn new(bit_depth: BitDepth) -> Self {
        Self { bit_depth, scale: 1 }
    }

    /// 12-bit samples stored in 16-bit words, expanded to the full range
    pub fn twelve_bit() -> Self {
        Self { bit_depth: BitDepth::U16, scale: 16 }
    }

    /// Bytes per voxel in the source file
    pub fn bytes_per_voxel(&self) -> usize {
        self.bit_depth.bytes() as usize
    }

    /// Decode one little-endian voxel and apply the rescale
    pub fn decode(&self, bytes: &[u8]) -> u32 {
        let raw = match self.bit_depth {
            BitDepth::U8 => bytes[0] as u32,
            BitDepth::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
            BitDepth::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        };
        raw.saturating_mul(self.scale).min(self.bit_depth.max_value())
    }
}

/// Description of a brick texture as handed back by min/max synthesis
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub bytes_per_pixel: u32,
    pub bit_depth: BitDepth,
    pub format: wgpu::TextureFormat,
}

impl TextureDescriptor {
    pub fn for_depth(bit_depth: BitDepth) -> Self {
        Self {
            bytes_per_pixel: bit_depth.bytes() * TEXEL_CHANNELS,
            bit_depth,
            format: bit_depth.texture_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bits() {
        assert_eq!(BitDepth::from_bits(8).unwrap(), BitDepth::U8);
        assert_eq!(BitDepth::from_bits(16).unwrap(), BitDepth::U16);
        assert_eq!(BitDepth::from_bits(32).unwrap(), BitDepth::U32);
        assert!(matches!(BitDepth::from_bits(12), Err(Error::UnsupportedFormat(_))));
        assert!(BitDepth::from_bits(64).is_err());
    }

    #[test]
    fn test_decode_twelve_bit() {
        let format = VoxelFormat::twelve_bit();
        assert_eq!(format.decode(&4095u16.to_le_bytes()), 4095 * 16);
        assert_eq!(format.decode(&1u16.to_le_bytes()), 16);
    }

    #[test]
    fn test_decode_saturates() {
        let format = VoxelFormat { bit_depth: BitDepth::U8, scale: 4 };
        assert_eq!(format.decode(&[200]), 255);
    }

    #[test]
    fn test_texture_descriptor() {
        let desc = TextureDescriptor::for_depth(BitDepth::U16);
        assert_eq!(desc.bytes_per_pixel, 8);
        assert_eq!(desc.format, wgpu::TextureFormat::Rgba16Uint);
    }
}
