//! Core type aliases and re-exports

pub use glam::{
    Vec3, Vec4,
    Mat4,
    Quat,
    UVec3,
};

/// Standard Result type for the crate
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;

/// Product of the three components, widened so large volumes do not overflow
pub fn volume_of(size: UVec3) -> u64 {
    size.x as u64 * size.y as u64 * size.z as u64
}

/// True if any component is zero
pub fn has_zero_extent(size: UVec3) -> bool {
    size.x == 0 || size.y == 0 || size.z == 0
}
