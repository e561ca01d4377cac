//! Voxel data sources: formats, descriptors, raw files and in-memory grids

pub mod format;
pub mod dat;
pub mod source;
pub mod raw;
pub mod memory;

pub use format::{BitDepth, VoxelFormat, TextureDescriptor, TEXEL_CHANNELS};
pub use dat::VolumeDescriptor;
pub use source::VolumeSource;
pub use raw::RawVolume;
pub use memory::MemoryVolume;
