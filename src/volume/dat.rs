//! `.dat` volume descriptors
//!
//! A descriptor is a small text file next to the raw voxel file:
//!
//! ```text
//! ObjectFileName: head.raw
//! Resolution:     256 256 113
//! SliceThickness: 1.0 1.0 2.0
//! Format:         USHORT_12
//! ```

use std::path::{Path, PathBuf};

use crate::core::error::Error;
use crate::core::types::{Result, UVec3, Vec3};
use super::format::{BitDepth, VoxelFormat};

/// Parsed `.dat` descriptor
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeDescriptor {
    /// Raw file, resolved relative to the descriptor's directory
    pub raw_path: PathBuf,
    pub resolution: UVec3,
    pub slice_thickness: Vec3,
    pub format: VoxelFormat,
}

impl VolumeDescriptor {
    /// Read and parse a descriptor file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, base)
    }

    /// Parse descriptor text; relative raw paths are joined onto `base_dir`
    pub fn parse(text: &str, base_dir: &Path) -> Result<Self> {
        let mut raw_path = None;
        let mut resolution = None;
        let mut slice_thickness = Vec3::ONE;
        let mut format = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(Error::Volume(format!("malformed descriptor line: {}", line)));
            };
            let value = value.trim();
            match key.trim() {
                "ObjectFileName" => raw_path = Some(base_dir.join(value)),
                "Resolution" => {
                    let [x, y, z] = parse_triple::<u32>(value, "Resolution")?;
                    resolution = Some(UVec3::new(x, y, z));
                }
                "SliceThickness" => {
                    let [x, y, z] = parse_triple::<f32>(value, "SliceThickness")?;
                    slice_thickness = Vec3::new(x, y, z);
                }
                "Format" => format = Some(parse_format(value)?),
                other => log::debug!("Ignoring descriptor key {}", other),
            }
        }

        let raw_path = raw_path.ok_or_else(|| Error::Volume("descriptor has no ObjectFileName".into()))?;
        let resolution = resolution.ok_or_else(|| Error::Volume("descriptor has no Resolution".into()))?;
        let format = format.ok_or_else(|| Error::Volume("descriptor has no Format".into()))?;

        Ok(Self { raw_path, resolution, slice_thickness, format })
    }
}

fn parse_triple<T: std::str::FromStr>(value: &str, key: &str) -> Result<[T; 3]> {
    let parts: Vec<T> = value
        .split_whitespace()
        .map(|s| s.parse::<T>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::Volume(format!("{} has a non-numeric component: {}", key, value)))?;
    <[T; 3]>::try_from(parts)
        .map_err(|_| Error::Volume(format!("{} needs three components: {}", key, value)))
}

fn parse_format(value: &str) -> Result<VoxelFormat> {
    match value {
        "UCHAR" => Ok(VoxelFormat::new(BitDepth::U8)),
        "USHORT" => Ok(VoxelFormat::new(BitDepth::U16)),
        "USHORT_12" => Ok(VoxelFormat::twelve_bit()),
        "UINT" => Ok(VoxelFormat::new(BitDepth::U32)),
        other => Err(Error::UnsupportedFormat(format!("volume format {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEAD: &str = "ObjectFileName: head.raw\n\
                        Resolution: 256 256 113\n\
                        SliceThickness: 1.0 1.0 2.0\n\
                        Format: USHORT_12\n";

    #[test]
    fn test_parse() {
        let desc = VolumeDescriptor::parse(HEAD, Path::new("/data")).unwrap();
        assert_eq!(desc.raw_path, PathBuf::from("/data/head.raw"));
        assert_eq!(desc.resolution, UVec3::new(256, 256, 113));
        assert_eq!(desc.slice_thickness, Vec3::new(1.0, 1.0, 2.0));
        assert_eq!(desc.format, VoxelFormat::twelve_bit());
    }

    #[test]
    fn test_thickness_defaults_to_one() {
        let text = "ObjectFileName: a.raw\nResolution: 2 2 2\nFormat: UCHAR\n";
        let desc = VolumeDescriptor::parse(text, Path::new(".")).unwrap();
        assert_eq!(desc.slice_thickness, Vec3::ONE);
    }

    #[test]
    fn test_float_is_unsupported() {
        let text = "ObjectFileName: a.raw\nResolution: 2 2 2\nFormat: FLOAT\n";
        let err = VolumeDescriptor::parse(text, Path::new(".")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_resolution() {
        let text = "ObjectFileName: a.raw\nFormat: UCHAR\n";
        assert!(VolumeDescriptor::parse(text, Path::new(".")).is_err());
    }

    #[test]
    fn test_bad_triple() {
        let text = "ObjectFileName: a.raw\nResolution: 2 2\nFormat: UCHAR\n";
        assert!(VolumeDescriptor::parse(text, Path::new(".")).is_err());
    }
}
